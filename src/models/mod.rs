pub mod credential;
pub mod kind;

pub use credential::{
    last_used_cutoff, stored_now, Credential, Issuance, NewCredential, LAST_USED_THROTTLE,
};
pub use kind::{
    ApiKeyMetadata, ApiKeys, CreateApiKey, CredentialKind, McpTokenMetadata, McpTokens,
    WILDCARD_WORKLOAD,
};
