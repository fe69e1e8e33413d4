//! Credential lifecycle: issue, list, fetch, delete, validate.
//!
//! One engine serves every [`CredentialKind`]. Owner-scoped operations live
//! on [`CredentialManager`]; unscoped administrative operations live on the
//! separate [`CredentialAdmin`] handle returned by
//! [`CredentialManager::admin`], so the scoping is visible in the types.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use tokio::sync::OnceCell;
use zeroize::Zeroizing;

use crate::errors::CredentialError;
use crate::models::{
    last_used_cutoff, stored_now, ApiKeys, Credential, CredentialKind, McpTokens, NewCredential,
};
use crate::secret::{Hasher, SecretGenerator};
use crate::store::{CredentialStore, StoreTx};
use crate::token::{format_token, TokenError, TokenParts};

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

pub type ApiKeyManager<S> = CredentialManager<ApiKeys, S>;
pub type McpTokenManager<S> = CredentialManager<McpTokens, S>;

/// Result of a successful create. `token` is the only copy of the plaintext
/// secret; it is wiped when dropped.
pub struct IssuedCredential<M> {
    pub credential: Credential<M>,
    pub token: Zeroizing<String>,
}

impl<M: fmt::Debug> fmt::Debug for IssuedCredential<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("credential", &self.credential)
            .field("token", &"<redacted>")
            .finish()
    }
}

pub struct CredentialManager<K: CredentialKind, S> {
    store: S,
    generator: SecretGenerator,
    hasher: Hasher,
    deadline: Duration,
    // Verified against when no record matches, so unknown ids cost the same
    // as wrong secrets.
    decoy_hash: OnceCell<String>,
    _kind: PhantomData<fn() -> K>,
}

impl<K, S> CredentialManager<K, S>
where
    K: CredentialKind,
    S: CredentialStore<K>,
{
    pub fn new(store: S, hasher: Hasher) -> Self {
        Self {
            store,
            generator: SecretGenerator::new(),
            hasher,
            deadline: DEFAULT_OPERATION_TIMEOUT,
            decoy_hash: OnceCell::new(),
            _kind: PhantomData,
        }
    }

    /// Upper bound on each operation. An operation that runs past it is
    /// abandoned and its open transaction rolled back.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn admin(&self) -> CredentialAdmin<'_, K, S> {
        CredentialAdmin { manager: self }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, CredentialError>
    where
        F: Future<Output = Result<T, CredentialError>>,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(CredentialError::Unavailable(format!(
                "{} {} exceeded deadline of {:?}",
                K::LABEL,
                op,
                self.deadline
            ))),
        }
    }

    /// Issue a credential for `owner_id`.
    ///
    /// The record is committed before the token is returned, since the token
    /// embeds the store-assigned id.
    pub async fn create(
        &self,
        owner_id: i64,
        request: K::Request,
    ) -> Result<IssuedCredential<K::Metadata>, CredentialError> {
        self.bounded("create", self.create_inner(owner_id, request)).await
    }

    async fn create_inner(
        &self,
        owner_id: i64,
        request: K::Request,
    ) -> Result<IssuedCredential<K::Metadata>, CredentialError> {
        let owner = u64::try_from(owner_id)
            .map_err(|_| CredentialError::Validation("owner id must not be negative".into()))?;
        let issuance = K::prepare(request)?;

        let secret = self
            .generator
            .generate()
            .map_err(|e| CredentialError::Unavailable(format!("entropy source failed: {e}")))?;
        let hashed_secret = self.hasher.hash_blocking(secret.clone()).await?;

        let mut tx = self.store.begin().await?;
        let credential = tx
            .insert(NewCredential {
                owner_id,
                hashed_secret,
                metadata: issuance.metadata,
                expires_at: issuance.expires_at,
            })
            .await?;
        let id = u64::try_from(credential.id).map_err(|_| {
            CredentialError::Unavailable(format!("store assigned invalid id {}", credential.id))
        })?;
        let token = Zeroizing::new(format_token(K::PREFIX, owner, id, &secret));
        tx.commit().await?;

        tracing::info!(
            kind = K::LABEL,
            credential_id = credential.id,
            owner_id,
            "credential issued"
        );
        Ok(IssuedCredential { credential, token })
    }

    /// Owner's credentials, newest first.
    pub async fn list(
        &self,
        owner_id: i64,
    ) -> Result<Vec<Credential<K::Metadata>>, CredentialError> {
        self.bounded("list", async {
            Ok::<_, CredentialError>(self.store.list(owner_id).await?)
        })
        .await
    }

    pub async fn get(
        &self,
        owner_id: i64,
        id: i64,
    ) -> Result<Credential<K::Metadata>, CredentialError> {
        self.bounded("get", async {
            self.store
                .get(owner_id, id)
                .await?
                .ok_or(CredentialError::NotFound)
        })
        .await
    }

    /// Delete an owner's credential.
    ///
    /// When nothing matched, API keys report `NotFound` while MCP tokens
    /// succeed; see [`CredentialKind::DELETE_MISSING_IS_ERROR`].
    pub async fn delete(&self, owner_id: i64, id: i64) -> Result<(), CredentialError> {
        self.bounded("delete", async {
            let removed = self.store.delete(owner_id, id).await?;
            finish_delete::<K>(removed, id)
        })
        .await
    }

    /// Authenticate a presented token and return its record.
    ///
    /// Unknown credentials and wrong secrets both yield
    /// [`CredentialError::InvalidCredential`]; the distinction is only logged.
    pub async fn validate(
        &self,
        token: &str,
    ) -> Result<Credential<K::Metadata>, CredentialError> {
        self.bounded("validate", self.validate_inner(token)).await
    }

    async fn validate_inner(
        &self,
        token: &str,
    ) -> Result<Credential<K::Metadata>, CredentialError> {
        let parts = TokenParts::parse_for(token, K::PREFIX).map_err(|e| {
            let reason = match e {
                TokenError::Malformed => "malformed_token",
                TokenError::WrongPrefix { .. } => "wrong_prefix",
            };
            tracing::debug!(kind = K::LABEL, reason, "credential rejected");
            CredentialError::from(e)
        })?;
        let candidate = Zeroizing::new(parts.secret.to_string());

        let (Ok(owner_id), Ok(id)) = (
            i64::try_from(parts.owner_id),
            i64::try_from(parts.credential_id),
        ) else {
            self.burn_decoy(candidate).await?;
            return Err(self.reject(parts.credential_id, "unknown_credential"));
        };

        let mut tx = self.store.begin().await?;

        let Some(mut credential) = tx.get(owner_id, id).await? else {
            self.burn_decoy(candidate).await?;
            return Err(self.reject(parts.credential_id, "unknown_credential"));
        };

        let matches = self
            .hasher
            .verify_blocking(credential.hashed_secret.clone(), candidate)
            .await?;
        if !matches {
            return Err(self.reject(parts.credential_id, "secret_mismatch"));
        }

        let now = stored_now();
        if credential.is_expired(now) {
            tracing::debug!(
                kind = K::LABEL,
                credential_id = id,
                reason = "expired",
                "credential rejected"
            );
            return Err(CredentialError::Expired);
        }

        if credential.last_used_is_stale(now)
            && tx.touch_last_used(id, now, last_used_cutoff(now)).await?
        {
            credential.last_used_at = Some(now);
        }
        tx.commit().await?;

        Ok(credential)
    }

    fn reject(&self, credential_id: u64, reason: &'static str) -> CredentialError {
        tracing::debug!(kind = K::LABEL, credential_id, reason, "credential rejected");
        CredentialError::InvalidCredential
    }

    async fn burn_decoy(&self, candidate: Zeroizing<String>) -> Result<(), CredentialError> {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| async {
                let secret = self.generator.generate().map_err(|e| {
                    CredentialError::Unavailable(format!("entropy source failed: {e}"))
                })?;
                Ok::<_, CredentialError>(self.hasher.hash_blocking(secret).await?)
            })
            .await?;
        self.hasher.verify_blocking(decoy.clone(), candidate).await?;
        Ok(())
    }
}

fn finish_delete<K: CredentialKind>(removed: bool, id: i64) -> Result<(), CredentialError> {
    if removed {
        tracing::info!(kind = K::LABEL, credential_id = id, "credential deleted");
        Ok(())
    } else if K::DELETE_MISSING_IS_ERROR {
        Err(CredentialError::NotFound)
    } else {
        Ok(())
    }
}

/// Administrative view over every owner's credentials.
pub struct CredentialAdmin<'a, K: CredentialKind, S> {
    manager: &'a CredentialManager<K, S>,
}

impl<K, S> CredentialAdmin<'_, K, S>
where
    K: CredentialKind,
    S: CredentialStore<K>,
{
    /// All credentials, newest first.
    pub async fn list(&self) -> Result<Vec<Credential<K::Metadata>>, CredentialError> {
        let store = &self.manager.store;
        self.manager
            .bounded("admin list", async {
                Ok::<_, CredentialError>(store.list_all().await?)
            })
            .await
    }

    pub async fn get(&self, id: i64) -> Result<Credential<K::Metadata>, CredentialError> {
        let store = &self.manager.store;
        self.manager
            .bounded("admin get", async {
                store.get_by_id(id).await?.ok_or(CredentialError::NotFound)
            })
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), CredentialError> {
        let store = &self.manager.store;
        self.manager
            .bounded("admin delete", async {
                let removed = store.delete_by_id(id).await?;
                finish_delete::<K>(removed, id)
            })
            .await
    }

    /// Record a use now, regardless of the validation throttle.
    pub async fn touch_last_used(&self, id: i64) -> Result<(), CredentialError> {
        let store = &self.manager.store;
        self.manager
            .bounded("admin touch", async {
                if store.touch_last_used_by_id(id, stored_now()).await? {
                    Ok(())
                } else {
                    Err(CredentialError::NotFound)
                }
            })
            .await
    }
}
