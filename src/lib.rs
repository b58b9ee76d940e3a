//! Wallet Payload: encrypted HD wallet documents with checksum-guarded sync
//!
//! This crate loads, mutates and saves the encrypted wallet document of a
//! custodial-storage Bitcoin wallet. The document is decrypted locally,
//! every change is re-encrypted and pushed with the checksum of the previous
//! version, and keys are derived from the document's seed in two BIP44
//! trees (legacy P2PKH and segwit P2WPKH).
//!
//! # Architecture
//!
//! - **Envelope Codec**: AES/PBKDF2 envelope, legacy brute-force decrypt, SHA-256 checksum
//! - **Derivation Container**: legacy (44') and segwit (84') key trees from one seed
//! - **Payload Manager**: load, save-and-sync, format upgrades, repairs, account discovery
//! - **Balance Ledger**: per-chain balance cache with bulk refresh
//!
//! # Example
//!
//! ```ignore
//! use wallet_payload::{EngineConfig, PayloadManager, WalletApiClient};
//!
//! let config = EngineConfig::from_env();
//! let client = WalletApiClient::from_config(&config)?;
//! let mut manager = PayloadManager::new(client, config);
//!
//! manager.initialize_and_decrypt(&guid, &shared_key, &password)?;
//! manager.upgrade_v3_to_v4(None)?;
//! let index = manager.add_account("Savings", None)?;
//! ```

// Public modules
pub mod balance;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hd;
pub mod manager;
pub mod payload;
pub mod remote;

// Re-exports for convenience
pub use balance::{BalanceLedger, Chain};
pub use config::EngineConfig;
pub use error::PayloadError;
pub use hd::{AddressManager, HdAccount, HdTree, HdWalletsContainer};
pub use manager::{AccountDiscovery, PayloadManager};
pub use payload::{
    Account, Derivation, DerivationType, ImportedAddress, MultiDerivationAccount, WalletBody,
    WalletDocument, XPub, XPubs,
};
pub use payload::envelope::{EnvelopeCodec, SealedPayload};
pub use remote::{
    BalanceEntry, BalanceFilter, BalanceQuery, RemoteStore, SaveOutcome, SaveRequest,
    TransactionQuery, TxDirection, TxPage, TxSummary, WalletApiClient,
};

// Re-export commonly used bitcoin types
pub use bip39::Language;
pub use bitcoin::{Address, Network};

// Common result type
pub type Result<T> = std::result::Result<T, PayloadError>;
