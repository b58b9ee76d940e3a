/// In-memory wallet store
///
/// Holds encrypted payloads keyed by guid with compare-and-swap on the
/// checksum, plus seedable balance and transaction tables.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::types::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unknown wallet identifier")]
    NotFound,

    #[error("Invalid shared key")]
    Unauthorized,

    #[error("Checksum did not match")]
    ChecksumMismatch,

    #[error("Wallet already exists")]
    AlreadyExists,

    #[error("Store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone)]
pub struct StoredWallet {
    pub shared_key: String,
    pub payload: String,
    pub checksum: String,
    /// Addresses announced with the last write
    pub active: Vec<String>,
}

#[derive(Debug, Default)]
struct Tables {
    wallets: HashMap<String, StoredWallet>,
    balances: HashMap<String, BalanceEntry>,
    transactions: HashMap<String, Vec<TxRecord>>,
    /// Filter of every balance query, in arrival order
    balance_filters: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockStore {
    tables: Mutex<Tables>,
}

fn split_active(active: Option<&str>) -> Vec<String> {
    active
        .unwrap_or_default()
        .split('|')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn fetch(&self, guid: &str, shared_key: &str) -> Result<String, StoreError> {
        let tables = self.tables()?;
        let wallet = tables.wallets.get(guid).ok_or(StoreError::NotFound)?;
        if wallet.shared_key != shared_key {
            return Err(StoreError::Unauthorized);
        }
        Ok(wallet.payload.clone())
    }

    pub fn insert(
        &self,
        guid: &str,
        shared_key: &str,
        payload: &str,
        checksum: &str,
        active: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if tables.wallets.contains_key(guid) {
            return Err(StoreError::AlreadyExists);
        }
        tables.wallets.insert(
            guid.to_string(),
            StoredWallet {
                shared_key: shared_key.to_string(),
                payload: payload.to_string(),
                checksum: checksum.to_string(),
                active: split_active(active),
            },
        );
        log::info!("Inserted wallet {}", guid);
        Ok(())
    }

    /// Replace the payload only if `old_checksum` is the stored checksum
    pub fn update(
        &self,
        guid: &str,
        shared_key: &str,
        payload: &str,
        checksum: &str,
        old_checksum: &str,
        active: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let wallet = tables.wallets.get_mut(guid).ok_or(StoreError::NotFound)?;
        if wallet.shared_key != shared_key {
            return Err(StoreError::Unauthorized);
        }
        if wallet.checksum != old_checksum {
            log::warn!("Rejected update of {}: stale checksum", guid);
            return Err(StoreError::ChecksumMismatch);
        }
        wallet.payload = payload.to_string();
        wallet.checksum = checksum.to_string();
        if active.is_some() {
            wallet.active = split_active(active);
        }
        log::info!("Updated wallet {} -> {}", guid, checksum);
        Ok(())
    }

    pub fn wallet(&self, guid: &str) -> Result<Option<StoredWallet>, StoreError> {
        Ok(self.tables()?.wallets.get(guid).cloned())
    }

    pub fn set_balance(&self, key: &str, balance: BalanceEntry) -> Result<(), StoreError> {
        self.tables()?.balances.insert(key.to_string(), balance);
        Ok(())
    }

    /// Balance per requested key; unknown keys read as empty
    pub fn balances(
        &self,
        keys: &[String],
        filter: &str,
    ) -> Result<HashMap<String, BalanceEntry>, StoreError> {
        let mut tables = self.tables()?;
        tables.balance_filters.push(filter.to_string());
        Ok(keys
            .iter()
            .map(|k| (k.clone(), tables.balances.get(k).copied().unwrap_or_default()))
            .collect())
    }

    pub fn balance_filters(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.tables()?.balance_filters.clone())
    }

    pub fn add_transaction(&self, key: &str, tx: TxRecord) -> Result<(), StoreError> {
        self.tables()?
            .transactions
            .entry(key.to_string())
            .or_default()
            .push(tx);
        Ok(())
    }

    /// Newest first, one entry per hash across all keys
    pub fn transactions(
        &self,
        keys: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<(u64, Vec<TxRecord>), StoreError> {
        let tables = self.tables()?;
        let mut txs: Vec<TxRecord> = keys
            .iter()
            .filter_map(|k| tables.transactions.get(k))
            .flatten()
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| a.hash.cmp(&b.hash)));
        txs.dedup_by(|a, b| a.hash == b.hash);

        let total = txs.len() as u64;
        let page = txs.into_iter().skip(offset).take(limit).collect();
        Ok((total, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_requires_current_checksum() {
        let store = MockStore::new();
        store.insert("g", "k", "p0", "c0", None).unwrap();

        assert_eq!(
            store.update("g", "k", "p1", "c1", "stale", None),
            Err(StoreError::ChecksumMismatch)
        );
        store.update("g", "k", "p1", "c1", "c0", Some("1a|1b")).unwrap();

        let wallet = store.wallet("g").unwrap().unwrap();
        assert_eq!(wallet.payload, "p1");
        assert_eq!(wallet.active, vec!["1a", "1b"]);
        assert_eq!(store.fetch("g", "wrong"), Err(StoreError::Unauthorized));
    }

    #[test]
    fn test_transactions_page_newest_first() {
        let store = MockStore::new();
        for (hash, time) in [("a", 1), ("b", 3), ("c", 2)] {
            let tx = TxRecord {
                hash: hash.into(),
                result: 100,
                fee: 0,
                time,
            };
            store.add_transaction("xpub", tx).unwrap();
        }
        let (total, page) = store.transactions(&["xpub".into()], 2, 1).unwrap();
        assert_eq!(total, 3);
        let hashes: Vec<_> = page.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["c", "a"]);
    }
}
