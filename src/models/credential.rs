use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

/// Minimum spacing between two `last_used_at` writes for one credential.
pub const LAST_USED_THROTTLE: Duration = Duration::from_secs(60);

/// Current time at the precision the store keeps (PostgreSQL `timestamptz`
/// holds microseconds), so a returned timestamp equals the one read back later.
pub fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// `at` minus the throttle window: a `last_used_at` older than this is stale.
pub fn last_used_cutoff(at: DateTime<Utc>) -> DateTime<Utc> {
    at - chrono::Duration::seconds(LAST_USED_THROTTLE.as_secs() as i64)
}

/// A stored API key or MCP token. `M` is the kind-specific metadata.
///
/// `hashed_secret` is never serialized; the plaintext secret is not part of
/// the record at all.
#[derive(Clone, Serialize)]
pub struct Credential<M> {
    pub id: i64,
    pub owner_id: i64,
    #[serde(flatten)]
    pub metadata: M,
    #[serde(skip_serializing)]
    pub hashed_secret: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl<M: fmt::Debug> fmt::Debug for Credential<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("metadata", &self.metadata)
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl<M> Credential<M> {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// Whether a successful validation at `now` should write `last_used_at`.
    pub fn last_used_is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_used_at {
            None => true,
            Some(at) => at < last_used_cutoff(now),
        }
    }
}

/// Input to the store's insert. The id and `created_at` are assigned by the store.
#[derive(Clone)]
pub struct NewCredential<M> {
    pub owner_id: i64,
    pub hashed_secret: String,
    pub metadata: M,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The validated, kind-specific part of a creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct Issuance<M> {
    pub metadata: M,
    pub expires_at: Option<DateTime<Utc>>,
}
