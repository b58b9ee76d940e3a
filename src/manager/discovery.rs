//! Gap-limit account discovery for mnemonic recovery
//!
//! Candidate accounts are queried in batches. Used accounts extend the
//! wallet to their index + 1; the scan stops after `gap_limit` consecutive
//! unused accounts. Batches start at `initial_batch` and double each round.

use crate::error::PayloadError;
use crate::hd::HdWalletsContainer;
use crate::payload::DerivationType;
use crate::remote::{BalanceFilter, BalanceQuery};

pub const DISCOVERY_BATCH: u32 = 5;
pub const ACCOUNT_GAP_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountDiscovery {
    pub initial_batch: u32,
    pub gap_limit: u32,
}

impl Default for AccountDiscovery {
    fn default() -> Self {
        Self {
            initial_batch: DISCOVERY_BATCH,
            gap_limit: ACCOUNT_GAP_LIMIT,
        }
    }
}

impl AccountDiscovery {
    /// Number of used accounts in one tree. `hd` must hold private keys.
    pub fn discover(
        &self,
        hd: &HdWalletsContainer,
        query: &impl BalanceQuery,
        derivation: DerivationType,
    ) -> Result<u32, PayloadError> {
        let mut scanned = 0u32;
        let mut size = 0u32;
        let mut gap = 0u32;
        let mut batch_end = self.initial_batch.max(1);

        loop {
            let xpubs = (scanned..batch_end)
                .map(|i| hd.derive_account(i, derivation).map(|a| a.xpub().to_string()))
                .collect::<Result<Vec<_>, _>>()?;

            let balances = match derivation {
                DerivationType::Legacy => query.balances(&xpubs, &[], BalanceFilter::All)?,
                DerivationType::SegwitBech32 => query.balances(&[], &xpubs, BalanceFilter::All)?,
            };

            for (offset, xpub) in xpubs.iter().enumerate() {
                let index = scanned + offset as u32;
                let entry = balances.get(xpub).ok_or_else(|| {
                    PayloadError::transport(format!("balance response missing account {}", index))
                })?;
                if entry.n_tx > 0 {
                    size = index + 1;
                    gap = 0;
                } else {
                    gap += 1;
                    if gap >= self.gap_limit {
                        log::debug!("{} discovery: {} accounts", derivation, size);
                        return Ok(size);
                    }
                }
            }

            scanned = batch_end;
            batch_end = batch_end.saturating_mul(2);
        }
    }

    /// Accounts to restore: the larger of both trees, at least one
    pub fn wallet_size(
        &self,
        hd: &HdWalletsContainer,
        query: &impl BalanceQuery,
    ) -> Result<u32, PayloadError> {
        let legacy = self.discover(hd, query, DerivationType::Legacy)?;
        let segwit = self.discover(hd, query, DerivationType::SegwitBech32)?;
        Ok(legacy.max(segwit).max(1))
    }
}
