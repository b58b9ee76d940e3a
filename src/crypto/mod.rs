//! Payload cryptography
//!
//! - AES-256 cipher with PBKDF2 key stretching
//! - Second-password protection of private material

pub mod aes;
pub mod double_encryption;

pub use self::aes::{decrypt, encrypt, CipherMode, Padding};
pub use double_encryption::{second_password_hash, validate_second_password, SecondPasswordCipher};
