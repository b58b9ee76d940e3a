//! Wallet API client
//!
//! Blocking HTTP implementation of the document store, balance and
//! multi-address services. Timeouts and retries are left to the caller.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;

use super::{
    BalanceEntry, BalanceFilter, BalanceQuery, RemoteStore, SaveOutcome, SaveRequest,
    TransactionQuery, TxDirection, TxPage, TxSummary,
};
use crate::config::EngineConfig;
use crate::error::PayloadError;

const CHECKSUM_MISMATCH: &str = "Checksum did not match";

pub struct WalletApiClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct FetchResponse {
    payload: String,
}

#[derive(Deserialize)]
struct MultiAddressResponse {
    wallet: MultiAddressWallet,
    #[serde(default)]
    txs: Vec<RawTransaction>,
}

#[derive(Deserialize)]
struct MultiAddressWallet {
    n_tx: u64,
}

#[derive(Deserialize)]
struct RawTransaction {
    hash: String,
    /// Net effect on the queried keys, in satoshis
    result: i64,
    #[serde(default)]
    fee: u64,
    time: i64,
}

impl RawTransaction {
    fn into_summary(self) -> TxSummary {
        let (direction, amount) = if self.result > 0 {
            (TxDirection::Received, self.result.unsigned_abs())
        } else if self.result.unsigned_abs() == self.fee {
            // Only the fee left the wallet: moved between own addresses
            (TxDirection::Transferred, 0)
        } else {
            (
                TxDirection::Sent,
                self.result.unsigned_abs().saturating_sub(self.fee),
            )
        };
        TxSummary {
            hash: self.hash,
            direction,
            amount,
            fee: self.fee,
            time: self.time,
        }
    }
}

impl WalletApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PayloadError> {
        let client = Client::builder()
            .timeout(None::<std::time::Duration>)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, PayloadError> {
        Self::new(config.api_url.clone())
    }

    fn wallet_url(&self) -> String {
        format!("{}/wallet", self.base_url)
    }

    fn post_wallet(&self, params: &[(&str, String)]) -> Result<(StatusCode, String), PayloadError> {
        let response = self.client.post(self.wallet_url()).form(params).send()?;
        let status = response.status();
        let body = response.text()?;
        Ok((status, body))
    }
}

impl RemoteStore for WalletApiClient {
    fn fetch(&self, guid: &str, shared_key: &str) -> Result<String, PayloadError> {
        let (status, body) = self.post_wallet(&[
            ("method", "wallet.aes.json".to_string()),
            ("guid", guid.to_string()),
            ("sharedKey", shared_key.to_string()),
            ("format", "json".to_string()),
        ])?;

        if !status.is_success() {
            return Err(PayloadError::transport(format!(
                "wallet fetch failed ({}): {}",
                status, body
            )));
        }

        let parsed: FetchResponse = serde_json::from_str(&body)
            .map_err(|e| PayloadError::transport(format!("invalid fetch response: {}", e)))?;
        log::debug!("Fetched payload for {} ({} bytes)", guid, parsed.payload.len());
        Ok(parsed.payload)
    }

    fn save(&self, request: &SaveRequest<'_>) -> Result<SaveOutcome, PayloadError> {
        let mut params = vec![
            ("method", "update".to_string()),
            ("guid", request.guid.to_string()),
            ("sharedKey", request.shared_key.to_string()),
            ("payload", request.payload.to_string()),
            ("length", request.payload.len().to_string()),
            ("checksum", request.new_checksum.to_string()),
            ("old_checksum", request.old_checksum.to_string()),
            ("format", "plain".to_string()),
        ];
        if let Some(addresses) = request.sync_addresses {
            params.push(("active", addresses.join("|")));
        }

        let (status, body) = self.post_wallet(&params)?;

        if status == StatusCode::CONFLICT || body.contains(CHECKSUM_MISMATCH) {
            log::warn!("Save rejected for {}: checksum mismatch", request.guid);
            return Ok(SaveOutcome::Conflict);
        }
        if !status.is_success() {
            return Err(PayloadError::transport(format!(
                "wallet save failed ({}): {}",
                status, body
            )));
        }
        Ok(SaveOutcome::Saved)
    }

    fn insert(
        &self,
        guid: &str,
        shared_key: &str,
        checksum: &str,
        payload: &str,
        sync_addresses: Option<&[String]>,
    ) -> Result<(), PayloadError> {
        let mut params = vec![
            ("method", "insert".to_string()),
            ("guid", guid.to_string()),
            ("sharedKey", shared_key.to_string()),
            ("payload", payload.to_string()),
            ("length", payload.len().to_string()),
            ("checksum", checksum.to_string()),
            ("format", "plain".to_string()),
        ];
        if let Some(addresses) = sync_addresses {
            params.push(("active", addresses.join("|")));
        }

        let (status, body) = self.post_wallet(&params)?;
        if !status.is_success() {
            return Err(PayloadError::transport(format!(
                "wallet insert failed ({}): {}",
                status, body
            )));
        }
        Ok(())
    }
}

impl BalanceQuery for WalletApiClient {
    fn balances(
        &self,
        legacy: &[String],
        segwit: &[String],
        filter: BalanceFilter,
    ) -> Result<HashMap<String, BalanceEntry>, PayloadError> {
        let url = format!("{}/balance", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("active", legacy.join("|")),
                ("activeBech32", segwit.join("|")),
                ("filter", filter.as_str().to_string()),
            ])
            .send()?;

        if !response.status().is_success() {
            return Err(PayloadError::transport(format!(
                "balance query failed ({})",
                response.status()
            )));
        }

        let balances: HashMap<String, BalanceEntry> = response.json()?;
        Ok(balances)
    }
}

impl TransactionQuery for WalletApiClient {
    fn transactions(
        &self,
        legacy: &[String],
        segwit: &[String],
        limit: u32,
        offset: u32,
    ) -> Result<TxPage, PayloadError> {
        let url = format!("{}/multiaddr", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("active", legacy.join("|")),
                ("activeBech32", segwit.join("|")),
                ("n", limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()?;

        if !response.status().is_success() {
            return Err(PayloadError::transport(format!(
                "multiaddr query failed ({})",
                response.status()
            )));
        }

        let parsed: MultiAddressResponse = response.json()?;
        Ok(TxPage {
            total: parsed.wallet.n_tx,
            transactions: parsed.txs.into_iter().map(RawTransaction::into_summary).collect(),
        })
    }
}
