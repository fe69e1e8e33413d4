//! Secret material: random generation and one-way hashing for storage.

pub mod generator;
pub mod hasher;

pub use generator::{SecretGenerator, SECRET_LEN};
pub use hasher::{HashError, Hasher, HasherConfig};
