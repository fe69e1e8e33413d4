//! Bearer token wire format: `<prefix>-<ownerID>-<credentialID>-<secret>`.
//!
//! The prefix is a 3-character tag naming the credential kind. The two ids
//! are unsigned decimal integers. The secret is everything after the third
//! dash, taken verbatim: the secret alphabet contains `-` and `_`, so the
//! remainder is never split further.

use std::fmt;

use thiserror::Error;

/// Length of the kind tag at the front of every token.
pub const PREFIX_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token prefix does not match expected '{expected}'")]
    WrongPrefix { expected: &'static str },
}

/// A token split into its four fields. Borrows from the presented string.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TokenParts<'a> {
    pub prefix: &'a str,
    pub owner_id: u64,
    pub credential_id: u64,
    pub secret: &'a str,
}

impl fmt::Debug for TokenParts<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenParts")
            .field("prefix", &self.prefix)
            .field("owner_id", &self.owner_id)
            .field("credential_id", &self.credential_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl<'a> TokenParts<'a> {
    /// Structural parse. Does not look at which kind the prefix names.
    pub fn parse(token: &'a str) -> Result<Self, TokenError> {
        // At most four fields: the first three dashes delimit, the rest is the secret.
        let mut fields = token.splitn(4, '-');

        let prefix = fields.next().ok_or(TokenError::Malformed)?;
        let owner = fields.next().ok_or(TokenError::Malformed)?;
        let credential = fields.next().ok_or(TokenError::Malformed)?;
        let secret = fields.next().ok_or(TokenError::Malformed)?;

        if prefix.len() != PREFIX_LEN || !prefix.is_ascii() {
            return Err(TokenError::Malformed);
        }
        if secret.is_empty() {
            return Err(TokenError::Malformed);
        }

        Ok(Self {
            prefix,
            owner_id: parse_id(owner)?,
            credential_id: parse_id(credential)?,
            secret,
        })
    }

    /// Parse and require the kind tag to be `expected`.
    ///
    /// A structurally valid token carrying another kind's tag fails with
    /// [`TokenError::WrongPrefix`], not [`TokenError::Malformed`].
    pub fn parse_for(token: &'a str, expected: &'static str) -> Result<Self, TokenError> {
        let parts = Self::parse(token)?;
        if parts.prefix != expected {
            return Err(TokenError::WrongPrefix { expected });
        }
        Ok(parts)
    }
}

/// Render the wire form of a token.
pub fn format_token(prefix: &str, owner_id: u64, credential_id: u64, secret: &str) -> String {
    format!("{prefix}-{owner_id}-{credential_id}-{secret}")
}

// `u64::from_str` accepts a leading '+', the wire format does not.
fn parse_id(field: &str) -> Result<u64, TokenError> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TokenError::Malformed);
    }
    field.parse().map_err(|_| TokenError::Malformed)
}
