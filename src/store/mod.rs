//! Credential persistence.
//!
//! [`CredentialStore`] is implemented by [`postgres::PgStore`] for
//! deployments and by [`memory::MemoryStore`] for tests and local runs.
//! Reads and writes that must observe one consistent row go through a
//! [`StoreTx`]; dropping a transaction without committing discards it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Credential, CredentialKind, NewCredential};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore<K: CredentialKind>: Send + Sync {
    type Tx: StoreTx<K>;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Owner-scoped lookup.
    async fn get(&self, owner_id: i64, id: i64) -> StoreResult<Option<Credential<K::Metadata>>>;

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Credential<K::Metadata>>>;

    /// Newest first.
    async fn list(&self, owner_id: i64) -> StoreResult<Vec<Credential<K::Metadata>>>;

    /// Newest first, across every owner.
    async fn list_all(&self) -> StoreResult<Vec<Credential<K::Metadata>>>;

    /// Returns whether a row was removed.
    async fn delete(&self, owner_id: i64, id: i64) -> StoreResult<bool>;

    async fn delete_by_id(&self, id: i64) -> StoreResult<bool>;

    /// Set `last_used_at` to `at` unless it already holds a later value.
    /// Returns whether the row exists.
    async fn touch_last_used_by_id(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool>;
}

#[async_trait]
pub trait StoreTx<K: CredentialKind>: Send {
    /// Insert a record. The store assigns `id` and `created_at`.
    async fn insert(
        &mut self,
        new: NewCredential<K::Metadata>,
    ) -> StoreResult<Credential<K::Metadata>>;

    async fn get(&mut self, owner_id: i64, id: i64)
        -> StoreResult<Option<Credential<K::Metadata>>>;

    /// Write `last_used_at = at` only if it is unset or older than
    /// `stale_before`. Returns whether the write happened.
    async fn touch_last_used(
        &mut self,
        id: i64,
        at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn commit(self) -> StoreResult<()>;
}
