//! Argon2id hashing of bearer secrets.
//!
//! Stored values are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`).
//! Each hash carries its own salt and cost parameters, so changing the
//! configured cost only affects newly issued credentials.

use std::fmt;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    Error as PhcError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid hasher parameters: {0}")]
    InvalidParams(String),

    #[error("malformed stored hash: {0}")]
    Malformed(String),

    #[error("hashing failed: {0}")]
    Failed(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasherConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HasherConfig {
    /// The cheapest parameters argon2 accepts. Only for tests.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

#[derive(Clone)]
pub struct Hasher {
    argon2: Argon2<'static>,
    config: HasherConfig,
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher").field("config", &self.config).finish()
    }
}

impl Hasher {
    pub fn new(config: HasherConfig) -> Result<Self, HashError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| HashError::InvalidParams(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            config,
        })
    }

    pub fn config(&self) -> HasherConfig {
        self.config
    }

    /// Hash `secret` with a fresh random salt.
    pub fn hash(&self, secret: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| HashError::Failed(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Check `candidate` against a stored hash.
    ///
    /// A mismatch is `Ok(false)`. `Err` means the stored value could not be
    /// used at all.
    pub fn verify(&self, hashed: &str, candidate: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(hashed).map_err(|e| HashError::Malformed(e.to_string()))?;

        match self.argon2.verify_password(candidate.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            // Parsed as PHC but not something this hasher can evaluate.
            Err(
                e @ (PhcError::Algorithm
                | PhcError::Version
                | PhcError::ParamNameDuplicated
                | PhcError::ParamNameInvalid
                | PhcError::ParamValueInvalid(_)
                | PhcError::ParamsMaxExceeded
                | PhcError::SaltInvalid(_)
                | PhcError::B64Encoding(_)
                | PhcError::OutputSize { .. }),
            ) => Err(HashError::Malformed(e.to_string())),
            Err(e) => Err(HashError::Failed(e.to_string())),
        }
    }

    /// [`Hasher::hash`] on the blocking thread pool.
    pub async fn hash_blocking(&self, secret: Zeroizing<String>) -> Result<String, HashError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| HashError::Failed(e.to_string()))?
    }

    /// [`Hasher::verify`] on the blocking thread pool.
    pub async fn verify_blocking(
        &self,
        hashed: String,
        candidate: Zeroizing<String>,
    ) -> Result<bool, HashError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&hashed, &candidate))
            .await
            .map_err(|e| HashError::Failed(e.to_string()))?
    }
}
