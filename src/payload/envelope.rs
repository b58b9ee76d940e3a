//! Encrypted payload envelope
//!
//! Versioned payloads are a JSON wrapper `{version, pbkdf2_iterations,
//! payload}` around the AES ciphertext of the document. Version 1 payloads
//! are a bare ciphertext string with no parameters recorded; reading them
//! means trying a small fixed set of historical cipher settings.
//!
//! The checksum used for optimistic concurrency is the hex SHA-256 of the
//! serialized wrapper exactly as pushed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::document::WalletDocument;
use crate::config::sanitize_iterations;
use crate::crypto::aes::{self, CipherMode, Padding};
use crate::error::PayloadError;

/// Highest wrapper version this engine can read and write
pub const HIGHEST_SUPPORTED_VERSION: u32 = 4;

const LEGACY_ITERATIONS: [u32; 2] = [10, 1];
const LEGACY_MODES: [CipherMode; 2] = [CipherMode::Cbc, CipherMode::Ofb];
const LEGACY_PADDINGS: [Padding; 4] = [
    Padding::Iso10126,
    Padding::Iso7816,
    Padding::ZeroByte,
    Padding::NoPadding,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedPayload {
    pub version: u32,
    pub pbkdf2_iterations: i64,
    pub payload: String,
}

impl WrappedPayload {
    pub fn to_json(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Raw payload as fetched from the store, classified by format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Legacy(String),
    Versioned(WrappedPayload),
}

impl Envelope {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<WrappedPayload>(raw) {
            Ok(wrapped) => Self::Versioned(wrapped),
            Err(_) => Self::Legacy(raw.trim().trim_matches('"').to_string()),
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Self::Legacy(_) => 1,
            Self::Versioned(w) => w.version,
        }
    }
}

/// Output of [`EnvelopeCodec::encrypt_and_wrap`]
#[derive(Debug, Clone)]
pub struct SealedPayload {
    pub checksum: String,
    pub envelope: WrappedPayload,
    /// The exact bytes the checksum was computed over
    pub serialized: String,
}

pub struct EnvelopeCodec;

impl EnvelopeCodec {
    pub fn decrypt(raw: &str, password: &str) -> Result<WalletDocument, PayloadError> {
        match Envelope::parse(raw) {
            Envelope::Versioned(wrapped) => Self::decrypt_versioned(&wrapped, password),
            Envelope::Legacy(ciphertext) => Self::decrypt_legacy(&ciphertext, password),
        }
    }

    fn decrypt_versioned(wrapped: &WrappedPayload, password: &str) -> Result<WalletDocument, PayloadError> {
        if wrapped.version > HIGHEST_SUPPORTED_VERSION {
            return Err(PayloadError::UnsupportedVersion {
                found: wrapped.version,
                supported: HIGHEST_SUPPORTED_VERSION,
            });
        }
        let iterations = sanitize_iterations(wrapped.pbkdf2_iterations);
        let cleartext = aes::decrypt(&wrapped.payload, password, iterations)?;
        let mut document: WalletDocument = serde_json::from_str(&cleartext)
            .map_err(|e| PayloadError::Decryption(format!("payload did not parse: {}", e)))?;
        document.set_format_version(wrapped.version);

        log::debug!(
            "Decrypted v{} payload ({} iterations)",
            wrapped.version,
            iterations
        );
        Ok(document)
    }

    /// Read-only path for version 1 payloads. Never used for writing.
    fn decrypt_legacy(ciphertext: &str, password: &str) -> Result<WalletDocument, PayloadError> {
        for iterations in LEGACY_ITERATIONS {
            for mode in LEGACY_MODES {
                for padding in LEGACY_PADDINGS {
                    let Ok(cleartext) = aes::decrypt_with(ciphertext, password, iterations, mode, padding) else {
                        continue;
                    };
                    if let Ok(document) = serde_json::from_str::<WalletDocument>(&cleartext) {
                        log::info!(
                            "Decrypted legacy payload ({:?}, {:?}, {} iterations)",
                            mode,
                            padding,
                            iterations
                        );
                        return Ok(document);
                    }
                }
            }
        }
        Err(PayloadError::Decryption(
            "no legacy cipher setting produced a valid payload".into(),
        ))
    }

    /// Serialize, encrypt under `password` and wrap with the document's
    /// format version.
    pub fn encrypt_and_wrap(document: &WalletDocument, password: &str) -> Result<SealedPayload, PayloadError> {
        let iterations = document.pbkdf2_iterations();
        let cleartext = document.to_json()?;
        let payload = aes::encrypt(&cleartext, password, iterations)?;

        let envelope = WrappedPayload {
            version: document.format_version(),
            pbkdf2_iterations: iterations as i64,
            payload,
        };
        let serialized = envelope.to_json()?;
        let checksum = Self::checksum(&serialized);

        Ok(SealedPayload {
            checksum,
            envelope,
            serialized,
        })
    }

    pub fn checksum(serialized: &str) -> String {
        hex::encode(Sha256::digest(serialized.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::document::{Options, WalletBody};

    fn document() -> WalletDocument {
        let mut options = Options::default();
        options.pbkdf2_iterations = Some(10);
        let body = WalletBody::new("00112233445566778899aabbccddeeff".into(), String::new(), vec![], 4);
        WalletDocument::new("guid-1".into(), "shared-1".into(), options, Some(body))
    }

    #[test]
    fn test_round_trip_preserves_document_and_version() {
        let doc = document();
        let sealed = EnvelopeCodec::encrypt_and_wrap(&doc, "password1").unwrap();
        assert_eq!(sealed.envelope.version, 4);
        let back = EnvelopeCodec::decrypt(&sealed.serialized, "password1").unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_checksum_covers_serialized_envelope() {
        let sealed = EnvelopeCodec::encrypt_and_wrap(&document(), "password1").unwrap();
        assert_eq!(sealed.checksum, EnvelopeCodec::checksum(&sealed.serialized));
        assert_eq!(sealed.checksum.len(), 64);
    }

    #[test]
    fn test_newer_version_is_rejected_before_decrypting() {
        let raw = r#"{"version":5,"pbkdf2_iterations":5000,"payload":"not-even-base64"}"#;
        match EnvelopeCodec::decrypt(raw, "pw") {
            Err(PayloadError::UnsupportedVersion { found, supported }) => {
                assert_eq!(found, 5);
                assert_eq!(supported, 4);
            }
            other => panic!("expected UnsupportedVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_password_is_decryption_error() {
        let sealed = EnvelopeCodec::encrypt_and_wrap(&document(), "password1").unwrap();
        let err = EnvelopeCodec::decrypt(&sealed.serialized, "password2").unwrap_err();
        assert!(matches!(err, PayloadError::Decryption(_)));
    }

    #[test]
    fn test_legacy_payload_found_by_enumeration() {
        let legacy = r#"{"guid":"old-guid","sharedKey":"old-key","keys":[{"addr":"1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2"}]}"#;
        let ciphertext =
            aes::encrypt_with(legacy.as_bytes(), "pw", 1, CipherMode::Ofb, Padding::Iso7816).unwrap();

        assert!(matches!(Envelope::parse(&ciphertext), Envelope::Legacy(_)));
        let doc = EnvelopeCodec::decrypt(&ciphertext, "pw").unwrap();
        assert_eq!(doc.guid, "old-guid");
        assert_eq!(doc.imported_addresses.len(), 1);
        assert_eq!(doc.format_version(), 2);

        let err = EnvelopeCodec::decrypt(&ciphertext, "nope").unwrap_err();
        assert!(matches!(err, PayloadError::Decryption(_)));
    }
}
