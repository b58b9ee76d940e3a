use std::collections::HashMap;

use crate::error::PayloadError;
use crate::payload::{DerivationType, XPubs};
use crate::remote::{BalanceEntry, BalanceFilter, BalanceQuery};

/// Chains sharing the HD payload. Bitcoin Cash only follows the legacy tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Btc,
    Bch,
}

impl Chain {
    pub fn tracks(&self, derivation: DerivationType) -> bool {
        match self {
            Self::Btc => true,
            Self::Bch => derivation == DerivationType::Legacy,
        }
    }
}

/// Cached balances for one chain, keyed by xpub or address.
///
/// Display cache only: spends are validated elsewhere.
#[derive(Debug, Clone)]
pub struct BalanceLedger {
    chain: Chain,
    filter: BalanceFilter,
    balances: HashMap<String, BalanceEntry>,
}

impl BalanceLedger {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            filter: BalanceFilter::All,
            balances: HashMap::new(),
        }
    }

    pub fn with_filter(mut self, filter: BalanceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Replace the cache from one bulk query. Either every requested key comes
    /// back and the cache is swapped, or the cache is left as it was.
    pub fn refresh_all(
        &mut self,
        query: &impl BalanceQuery,
        accounts: &[XPubs],
        imported: &[String],
    ) -> Result<(), PayloadError> {
        let mut legacy: Vec<String> = Vec::new();
        let mut segwit: Vec<String> = Vec::new();
        for xpubs in accounts {
            for xpub in xpubs.iter().filter(|x| self.chain.tracks(x.derivation)) {
                match xpub.derivation {
                    DerivationType::Legacy => legacy.push(xpub.address.clone()),
                    DerivationType::SegwitBech32 => segwit.push(xpub.address.clone()),
                }
            }
        }
        legacy.extend(imported.iter().cloned());

        let response = query.balances(&legacy, &segwit, self.filter)?;

        let mut fresh = HashMap::with_capacity(legacy.len() + segwit.len());
        for key in legacy.iter().chain(segwit.iter()) {
            let entry = response.get(key).ok_or_else(|| {
                PayloadError::transport(format!("balance response missing {}", key))
            })?;
            fresh.insert(key.clone(), *entry);
        }

        log::debug!(
            "{:?} balances refreshed for {} keys",
            self.chain,
            fresh.len()
        );
        self.balances = fresh;
        Ok(())
    }

    /// Optimistic decrement after a broadcast. Clamps at zero.
    pub fn debit_address(&mut self, address: &str, amount: u64) {
        match self.balances.get_mut(address) {
            Some(entry) => {
                if amount > entry.final_balance {
                    log::warn!(
                        "Debit of {} exceeds cached balance {} for {}, clamping",
                        amount,
                        entry.final_balance,
                        address
                    );
                }
                entry.final_balance = entry.final_balance.saturating_sub(amount);
            }
            None => log::debug!("No cached balance for {}, debit ignored", address),
        }
    }

    /// Sum over the xpub formats of one logical account
    pub fn address_balance(&self, xpubs: &XPubs) -> u64 {
        xpubs
            .iter()
            .filter_map(|x| self.balances.get(&x.address))
            .map(|e| e.final_balance)
            .sum()
    }

    pub fn imported_balance(&self, imported: &[String]) -> u64 {
        imported
            .iter()
            .filter_map(|a| self.balances.get(a))
            .map(|e| e.final_balance)
            .sum()
    }

    pub fn total_balance(&self) -> u64 {
        self.balances.values().map(|e| e.final_balance).sum()
    }

    pub fn entry(&self, key: &str) -> Option<&BalanceEntry> {
        self.balances.get(key)
    }

    pub fn clear(&mut self) {
        self.balances.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::XPub;
    use std::cell::Cell;

    struct FixedQuery {
        balances: HashMap<String, BalanceEntry>,
        calls: Cell<usize>,
    }

    impl BalanceQuery for FixedQuery {
        fn balances(
            &self,
            legacy: &[String],
            segwit: &[String],
            _filter: BalanceFilter,
        ) -> Result<HashMap<String, BalanceEntry>, PayloadError> {
            self.calls.set(self.calls.get() + 1);
            Ok(legacy
                .iter()
                .chain(segwit)
                .filter_map(|k| self.balances.get(k).map(|e| (k.clone(), *e)))
                .collect())
        }
    }

    fn entry(final_balance: u64) -> BalanceEntry {
        BalanceEntry {
            final_balance,
            total_received: final_balance,
            n_tx: 1,
        }
    }

    fn account() -> XPubs {
        XPubs::new(vec![
            XPub::new("xpub-legacy", DerivationType::Legacy),
            XPub::new("xpub-segwit", DerivationType::SegwitBech32),
        ])
    }

    fn query() -> FixedQuery {
        FixedQuery {
            balances: [
                ("xpub-legacy".to_string(), entry(1_000)),
                ("xpub-segwit".to_string(), entry(2_500)),
                ("1Imported".to_string(), entry(300)),
            ]
            .into_iter()
            .collect(),
            calls: Cell::new(0),
        }
    }

    #[test]
    fn test_account_balance_sums_both_formats() {
        let mut ledger = BalanceLedger::new(Chain::Btc);
        ledger.refresh_all(&query(), &[account()], &["1Imported".to_string()]).unwrap();
        assert_eq!(ledger.address_balance(&account()), 3_500);
        assert_eq!(ledger.imported_balance(&["1Imported".to_string()]), 300);
        assert_eq!(ledger.total_balance(), 3_800);
    }

    #[test]
    fn test_bch_ledger_ignores_segwit() {
        let mut ledger = BalanceLedger::new(Chain::Bch);
        ledger.refresh_all(&query(), &[account()], &[]).unwrap();
        assert_eq!(ledger.address_balance(&account()), 1_000);
        assert!(ledger.entry("xpub-segwit").is_none());
    }

    #[test]
    fn test_partial_response_leaves_cache_untouched() {
        let mut ledger = BalanceLedger::new(Chain::Btc);
        ledger.refresh_all(&query(), &[account()], &[]).unwrap();

        let err = ledger
            .refresh_all(&query(), &[account()], &["1Unknown".to_string()])
            .unwrap_err();
        assert!(matches!(err, PayloadError::TransportError(_)));
        assert_eq!(ledger.address_balance(&account()), 3_500);
    }

    #[test]
    fn test_sequential_debits_clamp_at_zero() {
        let mut ledger = BalanceLedger::new(Chain::Btc);
        ledger.refresh_all(&query(), &[], &["1Imported".to_string()]).unwrap();

        ledger.debit_address("1Imported", 200);
        assert_eq!(ledger.entry("1Imported").unwrap().final_balance, 100);
        ledger.debit_address("1Imported", 200);
        assert_eq!(ledger.entry("1Imported").unwrap().final_balance, 0);
    }

    #[test]
    fn test_single_query_per_refresh() {
        let q = query();
        let mut ledger = BalanceLedger::new(Chain::Btc);
        ledger.refresh_all(&q, &[account()], &["1Imported".to_string()]).unwrap();
        assert_eq!(q.calls.get(), 1);
    }
}
