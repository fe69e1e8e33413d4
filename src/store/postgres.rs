use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{CredentialStore, StoreResult, StoreTx};
use crate::models::{Credential, CredentialKind, NewCredential};

const COLUMNS: &str =
    "id, owner_id, hashed_secret, metadata, created_at, last_used_at, expires_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn credential_from_row<M: DeserializeOwned>(row: &PgRow) -> Result<Credential<M>, sqlx::Error> {
    let Json(metadata): Json<M> = row.try_get("metadata")?;
    Ok(Credential {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        metadata,
        hashed_secret: row.try_get("hashed_secret")?,
        created_at: row.try_get("created_at")?,
        last_used_at: row.try_get("last_used_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

#[async_trait]
impl<K: CredentialKind> CredentialStore<K> for PgStore {
    type Tx = PgStoreTx<K>;

    async fn begin(&self) -> StoreResult<PgStoreTx<K>> {
        let tx = self.pool.begin().await?;
        Ok(PgStoreTx {
            tx,
            _kind: PhantomData,
        })
    }

    async fn get(&self, owner_id: i64, id: i64) -> StoreResult<Option<Credential<K::Metadata>>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE id = $1 AND owner_id = $2",
            K::TABLE
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(credential_from_row).transpose()?)
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Credential<K::Metadata>>> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = $1", K::TABLE);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(credential_from_row).transpose()?)
    }

    async fn list(&self, owner_id: i64) -> StoreResult<Vec<Credential<K::Metadata>>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE owner_id = $1 ORDER BY created_at DESC, id DESC",
            K::TABLE
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(credential_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_all(&self) -> StoreResult<Vec<Credential<K::Metadata>>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} ORDER BY created_at DESC, id DESC",
            K::TABLE
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(credential_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn delete(&self, owner_id: i64, id: i64) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1 AND owner_id = $2", K::TABLE);
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_id(&self, id: i64) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", K::TABLE);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_used_by_id(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        let sql = format!(
            "UPDATE {} SET last_used_at = GREATEST(COALESCE(last_used_at, $2), $2) WHERE id = $1",
            K::TABLE
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// A read-committed PostgreSQL transaction. Rolled back on drop unless
/// committed.
pub struct PgStoreTx<K> {
    tx: Transaction<'static, Postgres>,
    _kind: PhantomData<fn() -> K>,
}

#[async_trait]
impl<K: CredentialKind> StoreTx<K> for PgStoreTx<K> {
    async fn insert(
        &mut self,
        new: NewCredential<K::Metadata>,
    ) -> StoreResult<Credential<K::Metadata>> {
        let sql = format!(
            r#"INSERT INTO {} (owner_id, hashed_secret, metadata, expires_at)
               VALUES ($1, $2, $3, $4)
               RETURNING {COLUMNS}"#,
            K::TABLE
        );
        let row = sqlx::query(&sql)
            .bind(new.owner_id)
            .bind(&new.hashed_secret)
            .bind(Json(&new.metadata))
            .bind(new.expires_at)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(credential_from_row(&row)?)
    }

    async fn get(
        &mut self,
        owner_id: i64,
        id: i64,
    ) -> StoreResult<Option<Credential<K::Metadata>>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE id = $1 AND owner_id = $2",
            K::TABLE
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(credential_from_row).transpose()?)
    }

    async fn touch_last_used(
        &mut self,
        id: i64,
        at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<bool> {
        // The predicate is re-evaluated under the row lock the UPDATE takes,
        // so concurrent validations write at most once per window.
        let sql = format!(
            r#"UPDATE {} SET last_used_at = $2
               WHERE id = $1 AND (last_used_at IS NULL OR last_used_at < $3)"#,
            K::TABLE
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(at)
            .bind(stale_before)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
