//! Shared fakes for integration tests
//!
//! - `FakeStore`: in-memory document store with checksum compare-and-swap
//! - `ScriptedBalances`: balance oracle where chosen keys have transactions
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bitcoin::Network;
use wallet_payload::payload::document::VERSION_SINGLE_DERIVATION;
use wallet_payload::payload::{AddressCache, LegacyAccount, Options};
use wallet_payload::{
    Account, BalanceEntry, BalanceFilter, BalanceQuery, DerivationType, EnvelopeCodec,
    HdWalletsContainer, Language, PayloadError, RemoteStore, SaveOutcome, SaveRequest,
    WalletBody, WalletDocument,
};

pub const PASSWORD: &str = "correct horse battery staple";
pub const SECOND_PASSWORD: &str = "second secret";

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

pub fn abandon_mnemonic() -> Vec<String> {
    let mut words = vec!["abandon".to_string(); 11];
    words.push("about".to_string());
    words
}

#[derive(Debug, Clone)]
pub struct StoredPayload {
    pub shared_key: String,
    pub payload: String,
    pub checksum: String,
}

#[derive(Debug, Default)]
struct FakeStoreState {
    wallets: HashMap<String, StoredPayload>,
    saves: usize,
    inserts: usize,
    last_sync: Option<Vec<String>>,
}

/// Clones share the same backing state, so a test can keep one handle
/// while the manager owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<FakeStoreState>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw envelope, checksummed the way the client checksums it
    pub fn put(&self, guid: &str, shared_key: &str, payload: &str) {
        let mut state = self.state.lock().unwrap();
        state.wallets.insert(
            guid.to_string(),
            StoredPayload {
                shared_key: shared_key.to_string(),
                payload: payload.to_string(),
                checksum: EnvelopeCodec::checksum(payload),
            },
        );
    }

    /// Simulate another client writing: the stored checksum moves on
    pub fn advance(&self, guid: &str) {
        let mut state = self.state.lock().unwrap();
        let wallet = state.wallets.get_mut(guid).expect("wallet stored");
        wallet.checksum = EnvelopeCodec::checksum(&format!("{}-elsewhere", wallet.checksum));
    }

    pub fn stored(&self, guid: &str) -> Option<StoredPayload> {
        self.state.lock().unwrap().wallets.get(guid).cloned()
    }

    pub fn only_guid(&self) -> String {
        let state = self.state.lock().unwrap();
        assert_eq!(state.wallets.len(), 1);
        state.wallets.keys().next().cloned().unwrap()
    }

    pub fn saves(&self) -> usize {
        self.state.lock().unwrap().saves
    }

    pub fn inserts(&self) -> usize {
        self.state.lock().unwrap().inserts
    }

    pub fn last_sync(&self) -> Option<Vec<String>> {
        self.state.lock().unwrap().last_sync.clone()
    }
}

impl RemoteStore for FakeStore {
    fn fetch(&self, guid: &str, shared_key: &str) -> Result<String, PayloadError> {
        let state = self.state.lock().unwrap();
        match state.wallets.get(guid) {
            Some(w) if w.shared_key == shared_key => Ok(w.payload.clone()),
            Some(_) => Err(PayloadError::transport("invalid shared key")),
            None => Err(PayloadError::transport("unknown wallet")),
        }
    }

    fn save(&self, request: &SaveRequest<'_>) -> Result<SaveOutcome, PayloadError> {
        let mut state = self.state.lock().unwrap();
        let wallet = state
            .wallets
            .get_mut(request.guid)
            .ok_or_else(|| PayloadError::transport("unknown wallet"))?;
        if wallet.checksum != request.old_checksum {
            return Ok(SaveOutcome::Conflict);
        }
        wallet.payload = request.payload.to_string();
        wallet.checksum = request.new_checksum.to_string();
        state.saves += 1;
        state.last_sync = request.sync_addresses.map(|a| a.to_vec());
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
        let mut state = self.state.lock().unwrap();
        state.wallets.insert(
            guid.to_string(),
            StoredPayload {
                shared_key: shared_key.to_string(),
                payload: payload.to_string(),
                checksum: checksum.to_string(),
            },
        );
        state.inserts += 1;
        state.last_sync = sync_addresses.map(|a| a.to_vec());
        Ok(())
    }
}

/// Balance oracle: keys in `used` report one transaction, all others none
#[derive(Debug, Default)]
pub struct ScriptedBalances {
    pub used: HashSet<String>,
    pub calls: Cell<usize>,
    pub requested: RefCell<Vec<String>>,
    pub filters: RefCell<Vec<BalanceFilter>>,
}

impl ScriptedBalances {
    /// Mark account indices of both trees of `hd` as used
    pub fn with_used_accounts(hd: &HdWalletsContainer, indices: &[u32]) -> Self {
        let mut used = HashSet::new();
        for index in indices {
            for derivation in DerivationType::ALL {
                let account = hd.derive_account(*index, derivation).unwrap();
                used.insert(account.xpub().to_string());
            }
        }
        Self {
            used,
            ..Self::default()
        }
    }
}

impl BalanceQuery for ScriptedBalances {
    fn balances(
        &self,
        legacy: &[String],
        segwit: &[String],
        filter: BalanceFilter,
    ) -> Result<HashMap<String, BalanceEntry>, PayloadError> {
        self.calls.set(self.calls.get() + 1);
        self.filters.borrow_mut().push(filter);
        let mut result = HashMap::new();
        for key in legacy.iter().chain(segwit) {
            self.requested.borrow_mut().push(key.clone());
            let n_tx = u64::from(self.used.contains(key));
            result.insert(
                key.clone(),
                BalanceEntry {
                    final_balance: n_tx * 10_000,
                    total_received: n_tx * 10_000,
                    n_tx,
                },
            );
        }
        Ok(result)
    }
}

/// Format 3 document (legacy accounts only) for the abandon mnemonic
pub fn v3_document(guid: &str, shared_key: &str, account_count: u32) -> WalletDocument {
    let hd = HdWalletsContainer::restore_from_mnemonic(
        Language::English,
        &abandon_mnemonic(),
        "",
        account_count,
        Network::Bitcoin,
    )
    .unwrap();

    let accounts = (0..account_count)
        .map(|i| {
            let node = hd.account(i, DerivationType::Legacy).unwrap();
            Account::Legacy(LegacyAccount {
                label: format!("Account {}", i + 1),
                archived: false,
                xpriv: node.xpriv().unwrap().to_string(),
                xpub: node.xpub().to_string(),
                address_labels: Vec::new(),
                cache: AddressCache::default(),
                extra: Default::default(),
            })
        })
        .collect();

    let body = WalletBody::new(
        hd.seed_hex().unwrap(),
        String::new(),
        accounts,
        VERSION_SINGLE_DERIVATION,
    );
    WalletDocument::new(guid.into(), shared_key.into(), Options::default(), Some(body))
}

/// Encrypt `document` under [`PASSWORD`] and seed it into `store`
pub fn seed_document(store: &FakeStore, document: &WalletDocument) {
    let sealed = EnvelopeCodec::encrypt_and_wrap(document, PASSWORD).unwrap();
    store.put(&document.guid, &document.shared_key, &sealed.serialized);
}
