/// Wallet API request and response types
///
/// These match the wire shapes the wallet client sends and parses.

use serde::{Deserialize, Serialize};

/// Form body of POST /wallet
#[derive(Debug, Clone, Deserialize)]
pub struct WalletForm {
    pub method: String,
    pub guid: String,
    #[serde(rename = "sharedKey")]
    pub shared_key: String,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub old_checksum: Option<String>,
    /// Pipe-joined addresses to watch
    #[serde(default)]
    pub active: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Response of `method=wallet.aes.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub payload: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub final_balance: u64,
    pub total_received: u64,
    pub n_tx: u64,
}

/// Query of GET /balance and GET /multiaddr
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysQuery {
    #[serde(default)]
    pub active: String,
    #[serde(rename = "activeBech32", default)]
    pub active_bech32: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub n: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl KeysQuery {
    /// Requested keys in request order, legacy first
    pub fn keys(&self) -> Vec<String> {
        self.active
            .split('|')
            .chain(self.active_bech32.split('|'))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Transaction as reported by /multiaddr; `result` is the net effect on
/// the queried keys in satoshis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub hash: String,
    pub result: i64,
    #[serde(default)]
    pub fee: u64,
    pub time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiAddressWallet {
    pub n_tx: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiAddressResponse {
    pub wallet: MultiAddressWallet,
    pub txs: Vec<TxRecord>,
}

/// POST /mock/balance
#[derive(Debug, Clone, Deserialize)]
pub struct MockBalanceRequest {
    pub key: String,
    #[serde(flatten)]
    pub balance: BalanceEntry,
}

/// POST /mock/tx
#[derive(Debug, Clone, Deserialize)]
pub struct MockTxRequest {
    pub key: String,
    #[serde(flatten)]
    pub tx: TxRecord,
}
