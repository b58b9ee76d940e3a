//! Engine configuration from environment variables
//!
//! Controls the Bitcoin network used for key derivation and address
//! encoding, the wallet API endpoint and payload encryption defaults.
//! Defaults to mainnet.

use std::env;

/// PBKDF2 iteration count used when the payload does not carry a valid one
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 5000;

/// Receive addresses announced per account and derivation type on sync
pub const DEFAULT_SYNC_LOOKAHEAD: u32 = 20;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Bitcoin network type (for bitcoin crate)
    pub bitcoin_network: bitcoin::Network,
    /// Wallet API base URL (document store, balance and multiaddr endpoints)
    pub api_url: String,
    /// Iterations for newly created payloads and second-password hashing
    pub pbkdf2_iterations: u32,
    /// Look-ahead window of unreserved receive addresses in the sync list
    pub sync_lookahead: u32,
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `BITCOIN_NETWORK`: "mainnet" (default), "testnet", "signet" or "regtest"
    /// - `WALLET_API_URL`: wallet API endpoint (default `https://blockchain.info`)
    /// - `PBKDF2_ITERATIONS`: iterations for new payloads (default 5000)
    /// - `SYNC_LOOKAHEAD`: receive addresses announced per account (default 20)
    pub fn from_env() -> Self {
        let network_str = env::var("BITCOIN_NETWORK")
            .unwrap_or_else(|_| "mainnet".to_string())
            .to_lowercase();

        let bitcoin_network = match network_str.as_str() {
            "mainnet" | "bitcoin" | "" => bitcoin::Network::Bitcoin,
            "testnet" => bitcoin::Network::Testnet,
            "signet" => bitcoin::Network::Signet,
            "regtest" => bitcoin::Network::Regtest,
            other => {
                log::warn!("Unknown network '{}', defaulting to mainnet", other);
                bitcoin::Network::Bitcoin
            }
        };
        log::info!("Using {} network", bitcoin_network);

        let api_url = env::var("WALLET_API_URL")
            .unwrap_or_else(|_| "https://blockchain.info".to_string());
        log::info!("Wallet API URL: {}", api_url);

        let pbkdf2_iterations = env::var("PBKDF2_ITERATIONS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .map(sanitize_iterations)
            .unwrap_or(DEFAULT_PBKDF2_ITERATIONS);

        let sync_lookahead = env::var("SYNC_LOOKAHEAD")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_SYNC_LOOKAHEAD);

        Self {
            bitcoin_network,
            api_url,
            pbkdf2_iterations,
            sync_lookahead,
        }
    }

    /// Get the BIP44 coin type for this network
    ///
    /// - Mainnet: 0
    /// - Testnet/Signet/Regtest: 1
    pub fn coin_type(&self) -> u32 {
        coin_type(self.bitcoin_network)
    }

    /// Account-level derivation path, e.g. "m/84'/0'/3'"
    pub fn derivation_path(&self, purpose: u32, account: u32) -> String {
        format!("m/{}'/{}'/{}'", purpose, self.coin_type(), account)
    }
}

impl Default for EngineConfig {
    /// Default configuration (mainnet)
    fn default() -> Self {
        Self {
            bitcoin_network: bitcoin::Network::Bitcoin,
            api_url: "https://blockchain.info".to_string(),
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            sync_lookahead: DEFAULT_SYNC_LOOKAHEAD,
        }
    }
}

pub fn coin_type(network: bitcoin::Network) -> u32 {
    match network {
        bitcoin::Network::Bitcoin => 0,
        _ => 1, // All test networks use coin type 1
    }
}

/// Non-positive iteration counts are replaced by the default.
pub fn sanitize_iterations(iterations: i64) -> u32 {
    if iterations <= 0 || iterations > u32::MAX as i64 {
        DEFAULT_PBKDF2_ITERATIONS
    } else {
        iterations as u32
    }
}
