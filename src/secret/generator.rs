use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// Raw entropy per secret. 33 bytes encode to 44 base64 characters with no
/// padding, so the rendered secret has no `=` and at least 256 bits.
pub const SECRET_BYTES: usize = 33;

/// Length of an encoded secret.
pub const SECRET_LEN: usize = 44;

/// Produces bearer secrets from the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretGenerator;

impl SecretGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a fresh secret in the URL-safe base64 alphabet
    /// (`A-Z a-z 0-9 - _`).
    ///
    /// Fails only when the entropy source does.
    pub fn generate(&self) -> Result<Zeroizing<String>, rand::Error> {
        let mut bytes = Zeroizing::new([0u8; SECRET_BYTES]);
        OsRng.try_fill_bytes(&mut bytes[..])?;
        Ok(Zeroizing::new(URL_SAFE_NO_PAD.encode(&bytes[..])))
    }
}
