//! Credential kinds.
//!
//! API keys and MCP tokens share one engine. A kind fixes the token prefix,
//! the backing table, the metadata shape, and how creation input is checked.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::CredentialError;
use crate::models::Issuance;

pub trait CredentialKind: Send + Sync + 'static {
    /// 3-character token tag. Distinct per kind.
    const PREFIX: &'static str;
    /// Human label for logs and messages.
    const LABEL: &'static str;
    /// Backing table.
    const TABLE: &'static str;
    /// Whether deleting an absent credential is reported as `NotFound`
    /// (`true`) or treated as an idempotent success (`false`).
    const DELETE_MISSING_IS_ERROR: bool;

    type Metadata: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static;
    type Request: Send;

    /// Check creation input and split it into stored metadata and expiry.
    fn prepare(request: Self::Request) -> Result<Issuance<Self::Metadata>, CredentialError>;
}

// ── API keys ─────────────────────────────────────────────────

/// Workload scope entry meaning "every workload the owner can reach".
pub const WILDCARD_WORKLOAD: &str = "*";

#[derive(Debug, Clone, Copy)]
pub struct ApiKeys;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyMetadata {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub authorized_workload_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateApiKey {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authorized_workload_ids: Vec<String>,
}

impl CredentialKind for ApiKeys {
    const PREFIX: &'static str = "ok1";
    const LABEL: &'static str = "api_key";
    const TABLE: &'static str = "api_keys";
    const DELETE_MISSING_IS_ERROR: bool = true;

    type Metadata = ApiKeyMetadata;
    type Request = CreateApiKey;

    fn prepare(request: CreateApiKey) -> Result<Issuance<ApiKeyMetadata>, CredentialError> {
        if request.authorized_workload_ids.is_empty() {
            return Err(CredentialError::Validation(
                "at least one authorized workload id is required".into(),
            ));
        }

        let mut workloads = Vec::with_capacity(request.authorized_workload_ids.len());
        for id in request.authorized_workload_ids {
            let id = id.trim();
            if id.is_empty() {
                return Err(CredentialError::Validation(
                    "authorized workload ids must not be blank".into(),
                ));
            }
            workloads.push(id.to_string());
        }

        Ok(Issuance {
            metadata: ApiKeyMetadata {
                display_name: non_blank(request.name),
                description: non_blank(request.description),
                authorized_workload_ids: workloads,
            },
            expires_at: request.expires_at,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ── MCP tokens ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct McpTokens;

/// MCP tokens carry nothing beyond the common record fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpTokenMetadata {}

impl CredentialKind for McpTokens {
    const PREFIX: &'static str = "mt1";
    const LABEL: &'static str = "mcp_token";
    const TABLE: &'static str = "mcp_tokens";
    const DELETE_MISSING_IS_ERROR: bool = false;

    type Metadata = McpTokenMetadata;
    type Request = ();

    fn prepare(_request: ()) -> Result<Issuance<McpTokenMetadata>, CredentialError> {
        Ok(Issuance {
            metadata: McpTokenMetadata {},
            expires_at: None,
        })
    }
}
