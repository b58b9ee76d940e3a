//! Error types for payload engine operations
//!
//! One variant per failure class the embedding application has to tell
//! apart: wrong password, reload-required conflicts, and everything that
//! needs escalation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayloadError {
    /// Wrong password or corrupt ciphertext
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Envelope written by a newer client
    #[error("Unsupported payload version: {found} (highest supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Structural invariant violated in the wallet document
    #[error("Corrupted payload: {0}")]
    CorruptedPayload(String),

    /// Private-key operation on a watch-only or still-encrypted HD wallet
    #[error("HD wallet not ready: {0}")]
    HDWalletNotReady(String),

    /// Remote checksum moved on since the last load
    #[error("Save conflict: remote payload changed, reload required")]
    SaveConflict,

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Wallet upgrade failed: {0}")]
    WalletUpgradeFailure(String),

    #[error("Wallet not initialized")]
    NotInitialized,

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid second password")]
    InvalidSecondPassword,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PayloadError {
    /// Whether the user can resolve the failure without support
    /// (re-entering a password, reloading, retrying the network call).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Decryption(_)
                | Self::HDWalletNotReady(_)
                | Self::SaveConflict
                | Self::TransportError(_)
                | Self::InvalidSecondPassword
        )
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::CorruptedPayload(msg.into())
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::HDWalletNotReady(msg.into())
    }
}

impl From<reqwest::Error> for PayloadError {
    fn from(err: reqwest::Error) -> Self {
        Self::TransportError(err.to_string())
    }
}

impl From<bitcoin::bip32::Error> for PayloadError {
    fn from(err: bitcoin::bip32::Error) -> Self {
        Self::InvalidKey(err.to_string())
    }
}
