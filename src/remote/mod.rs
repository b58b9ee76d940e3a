//! Boundaries to remote services
//!
//! - `RemoteStore` - encrypted document storage with checksum compare-and-swap
//! - `BalanceQuery` - per-key balances for xpubs and addresses
//! - `TransactionQuery` - paged transaction history
//! - `http` - wallet API client implementing all three

pub mod http;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PayloadError;

pub use http::WalletApiClient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub final_balance: u64,
    pub total_received: u64,
    pub n_tx: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BalanceFilter {
    #[default]
    All,
    ConfirmedOnly,
}

impl BalanceFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::ConfirmedOnly => "confirmed",
        }
    }
}

pub trait BalanceQuery {
    /// Balances keyed by the requested xpub/address. Keys are split by
    /// derivation format so the service derives the right address type.
    fn balances(
        &self,
        legacy: &[String],
        segwit: &[String],
        filter: BalanceFilter,
    ) -> Result<HashMap<String, BalanceEntry>, PayloadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    Sent,
    Received,
    Transferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    pub hash: String,
    pub direction: TxDirection,
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
    pub time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPage {
    pub transactions: Vec<TxSummary>,
    /// Total transactions across all pages
    pub total: u64,
}

pub trait TransactionQuery {
    fn transactions(
        &self,
        legacy: &[String],
        segwit: &[String],
        limit: u32,
        offset: u32,
    ) -> Result<TxPage, PayloadError>;
}

/// Arguments of a checksum-guarded push
#[derive(Debug, Clone)]
pub struct SaveRequest<'a> {
    pub guid: &'a str,
    pub shared_key: &'a str,
    /// Checksum the store must currently hold for the write to apply
    pub old_checksum: &'a str,
    pub new_checksum: &'a str,
    pub payload: &'a str,
    /// Addresses the server should watch for incoming payments
    pub sync_addresses: Option<&'a [String]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Conflict,
}

pub trait RemoteStore {
    /// Raw envelope as stored
    fn fetch(&self, guid: &str, shared_key: &str) -> Result<String, PayloadError>;

    /// Compare-and-swap write; `Conflict` when `old_checksum` is stale
    fn save(&self, request: &SaveRequest<'_>) -> Result<SaveOutcome, PayloadError>;

    /// Register a new wallet
    fn insert(
        &self,
        guid: &str,
        shared_key: &str,
        checksum: &str,
        payload: &str,
        sync_addresses: Option<&[String]>,
    ) -> Result<(), PayloadError>;
}
