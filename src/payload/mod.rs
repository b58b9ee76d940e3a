//! Wallet payload model and envelope codec
//!
//! - Account shapes and derivations
//! - Imported addresses
//! - The wallet document aggregate
//! - Encrypted envelope and checksum

pub mod account;
pub mod document;
pub mod envelope;
pub mod imported;
pub mod xpub;

pub use account::{
    Account, AddressCache, AddressLabel, Derivation, DerivationType, LegacyAccount,
    MultiDerivationAccount,
};
pub use document::{Options, WalletBody, WalletDocument};
pub use envelope::{Envelope, EnvelopeCodec, WrappedPayload};
pub use imported::{DeviceInfo, ImportedAddress};
pub use xpub::{XPub, XPubs};
