use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::secret::HashError;
use crate::store::StoreError;
use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("malformed token")]
    MalformedToken,

    #[error("token belongs to another credential kind (expected prefix '{expected}')")]
    WrongPrefix { expected: &'static str },

    /// Unknown id/owner pair or secret mismatch. The two are not told apart.
    #[error("invalid credential")]
    InvalidCredential,

    #[error("credential expired")]
    Expired,

    #[error("credential not found")]
    NotFound,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("hash error: {0}")]
    Hash(#[from] HashError),
}

impl From<TokenError> for CredentialError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Malformed => CredentialError::MalformedToken,
            TokenError::WrongPrefix { expected } => CredentialError::WrongPrefix { expected },
        }
    }
}

impl CredentialError {
    /// Stable machine-readable code for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialError::MalformedToken => "malformed_token",
            CredentialError::WrongPrefix { .. } => "wrong_prefix",
            CredentialError::InvalidCredential => "invalid_credential",
            CredentialError::Expired => "expired",
            CredentialError::NotFound => "not_found",
            CredentialError::Validation(_) => "validation_error",
            CredentialError::Unavailable(_) | CredentialError::Store(_) => "unavailable",
            CredentialError::Hash(_) => "internal",
        }
    }

    /// True for the outcomes of presenting a bad token. Callers must reject
    /// the request and must not retry.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CredentialError::MalformedToken
                | CredentialError::WrongPrefix { .. }
                | CredentialError::InvalidCredential
                | CredentialError::Expired
        )
    }

    /// What may be shown to the party that presented a token.
    ///
    /// All rejections collapse into one "invalid credential" answer so the
    /// response carries no hint about token structure or which ids exist.
    pub fn public(&self) -> PublicError {
        match self {
            CredentialError::MalformedToken
            | CredentialError::WrongPrefix { .. }
            | CredentialError::InvalidCredential
            | CredentialError::Expired => PublicError {
                status: 401,
                error_type: "authentication_error",
                code: "invalid_credential",
                message: "invalid credential".to_string(),
            },
            CredentialError::NotFound => PublicError {
                status: 404,
                error_type: "invalid_request_error",
                code: "not_found",
                message: "credential not found".to_string(),
            },
            CredentialError::Validation(msg) => PublicError {
                status: 400,
                error_type: "invalid_request_error",
                code: "validation_error",
                message: msg.clone(),
            },
            CredentialError::Unavailable(e) => {
                tracing::error!("Credential service unavailable: {}", e);
                PublicError::unavailable()
            }
            CredentialError::Store(e) => {
                tracing::error!("Credential store error: {}", e);
                PublicError::unavailable()
            }
            CredentialError::Hash(e) => {
                tracing::error!("Credential hash error: {}", e);
                PublicError {
                    status: 500,
                    error_type: "internal_error",
                    code: "internal_server_error",
                    message: "internal server error".to_string(),
                }
            }
        }
    }
}

/// Caller-facing rendering of a [`CredentialError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicError {
    pub status: u16,
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub code: &'static str,
    pub message: String,
}

impl PublicError {
    fn unavailable() -> Self {
        Self {
            status: 503,
            error_type: "unavailable_error",
            code: "service_unavailable",
            message: "service temporarily unavailable".to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "error": {
                "message": self.message,
                "type": self.error_type,
                "code": self.code,
            }
        })
    }
}
