use std::fmt;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Namespace tag prepended to every anonymized identifier.
pub const ANONYMOUS_ID_PREFIX: &str = "anon_";
/// Number of hex characters of the digest kept in the identifier.
pub const ANONYMOUS_ID_DIGEST_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum AnonymizerError {
    #[error("Anonymization secret key must not be empty")]
    EmptyKey,

    #[error("Failed to create HMAC: {0}")]
    InvalidKey(#[from] hmac::digest::InvalidLength),
}

/// Keyed, deterministic, one-way mapping from a real identifier to a pseudonym.
///
/// The MAC is keyed once at construction and cloned for every call, so
/// `anonymize` cannot fail.
#[derive(Clone)]
pub struct Anonymizer {
    mac: HmacSha256,
}

impl Anonymizer {
    pub fn new(secret_key: &SecretString) -> Result<Self, AnonymizerError> {
        let key = secret_key.expose_secret();
        if key.is_empty() {
            return Err(AnonymizerError::EmptyKey);
        }
        let mac = HmacSha256::new_from_slice(key.as_bytes())?;
        Ok(Self { mac })
    }

    pub fn anonymize(&self, original_id: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(original_id.as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());

        format!("{}{}", ANONYMOUS_ID_PREFIX, &digest[..ANONYMOUS_ID_DIGEST_LEN])
    }
}

impl fmt::Debug for Anonymizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anonymizer").finish_non_exhaustive()
    }
}

/// One-shot form of [`Anonymizer::anonymize`].
pub fn anonymize(secret_key: &SecretString, original_id: &str) -> Result<String, AnonymizerError> {
    Ok(Anonymizer::new(secret_key)?.anonymize(original_id))
}
