//! Second-password ("double encryption") protection of private material
//!
//! Secrets (seed entropy, xprivs, imported keys) are encrypted with the
//! payload cipher under `sharedKey ‖ secondPassword`. The password itself is
//! checked against `dpasswordhash`, an iterated SHA-256 of the same string.

use sha2::{Digest, Sha256};

use super::aes;
use crate::error::PayloadError;

/// Iterated SHA-256 over `shared_key ‖ second_password`, hex encoded
pub fn second_password_hash(shared_key: &str, second_password: &str, iterations: u32) -> String {
    let mut hashed = Sha256::digest(format!("{}{}", shared_key, second_password).as_bytes());
    for _ in 1..iterations.max(1) {
        hashed = Sha256::digest(hashed);
    }
    hex::encode(hashed)
}

/// Cipher bound to one wallet's shared key and second password
#[derive(Clone)]
pub struct SecondPasswordCipher {
    key: String,
    iterations: u32,
}

impl SecondPasswordCipher {
    pub fn new(shared_key: &str, second_password: &str, iterations: u32) -> Self {
        Self {
            key: format!("{}{}", shared_key, second_password),
            iterations,
        }
    }

    pub fn encrypt(&self, secret: &str) -> Result<String, PayloadError> {
        aes::encrypt(secret, &self.key, self.iterations)
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, PayloadError> {
        aes::decrypt(ciphertext, &self.key, self.iterations)
            .map_err(|_| PayloadError::InvalidSecondPassword)
    }
}

impl std::fmt::Debug for SecondPasswordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondPasswordCipher")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

/// Check a candidate second password against the stored hash
pub fn validate_second_password(
    stored_hash: Option<&str>,
    shared_key: &str,
    second_password: &str,
    iterations: u32,
) -> bool {
    match stored_hash {
        Some(hash) => second_password_hash(shared_key, second_password, iterations)
            .eq_ignore_ascii_case(hash),
        None => false,
    }
}
