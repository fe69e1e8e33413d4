//! Workload scoping for API keys.
//!
//! Checked by the caller after a successful validation, once per workload
//! the request addresses.

use crate::models::{ApiKeyMetadata, Credential, WILDCARD_WORKLOAD};

/// Whether `authorized` grants access to `workload_id`.
///
/// Matches the literal wildcard `"*"` or the exact id. No prefix or glob
/// matching.
pub fn authorizes(authorized: &[String], workload_id: &str) -> bool {
    authorized
        .iter()
        .any(|id| id == WILDCARD_WORKLOAD || id == workload_id)
}

impl Credential<ApiKeyMetadata> {
    pub fn authorizes(&self, workload_id: &str) -> bool {
        authorizes(&self.metadata.authorized_workload_ids, workload_id)
    }
}
