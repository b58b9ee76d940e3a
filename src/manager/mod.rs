//! Payload manager
//!
//! Sole owner of the decrypted wallet document, its remote checksum and the
//! key trees built from it. Every mutation is applied to a copy of the
//! document and only becomes visible once save-and-sync has pushed it.

pub mod discovery;
pub mod imported;
pub mod save;
pub mod second_password;
pub mod upgrade;

use bip39::{Language, Mnemonic};
use bitcoin::{Address, Network};
use uuid::Uuid;

use crate::balance::BalanceLedger;
use crate::config::EngineConfig;
use crate::crypto::SecondPasswordCipher;
use crate::error::PayloadError;
use crate::hd::address::RECEIVE_CHAIN;
use crate::hd::{AddressManager, HdWalletsContainer};
use crate::payload::document::{VERSION_MULTI_DERIVATION, VERSION_SINGLE_DERIVATION};
use crate::payload::envelope::EnvelopeCodec;
use crate::payload::{
    Account, Derivation, DerivationType, DeviceInfo, LegacyAccount, MultiDerivationAccount,
    Options, WalletBody, WalletDocument, XPubs,
};
use crate::remote::{BalanceQuery, RemoteStore, TransactionQuery, TxPage};

pub use discovery::AccountDiscovery;
pub use save::sync_address_list;

/// Word count of newly created wallets
pub const NEW_WALLET_WORDS: usize = 12;

pub(crate) struct LoadedWallet {
    pub(crate) document: WalletDocument,
    pub(crate) password: String,
    /// Checksum of the envelope the store currently holds
    pub(crate) checksum: String,
    /// `None` until the document has an HD body
    pub(crate) hd: Option<HdWalletsContainer>,
}

pub struct PayloadManager<S: RemoteStore> {
    store: S,
    config: EngineConfig,
    device: DeviceInfo,
    sync_pub_keys: bool,
    state: Option<LoadedWallet>,
}

impl<S: RemoteStore> PayloadManager<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            device: DeviceInfo::default(),
            sync_pub_keys: false,
            state: None,
        }
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    /// Announce receive addresses to the server on every save. Off by
    /// default: building the list derives addresses for every account.
    pub fn set_sync_pub_keys(&mut self, enabled: bool) {
        self.sync_pub_keys = enabled;
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn network(&self) -> Network {
        self.config.bitcoin_network
    }

    pub(crate) fn loaded(&self) -> Result<&LoadedWallet, PayloadError> {
        self.state.as_ref().ok_or(PayloadError::NotInitialized)
    }

    pub(crate) fn loaded_mut(&mut self) -> Result<&mut LoadedWallet, PayloadError> {
        self.state.as_mut().ok_or(PayloadError::NotInitialized)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Fetch, decrypt and hold the wallet, then run the self-healing repairs.
    pub fn initialize_and_decrypt(
        &mut self,
        guid: &str,
        shared_key: &str,
        password: &str,
    ) -> Result<(), PayloadError> {
        let raw = self.store.fetch(guid, shared_key)?;
        let mut document = EnvelopeCodec::decrypt(&raw, password)?;

        if document.guid != guid {
            return Err(PayloadError::corrupted(format!(
                "payload guid {} does not match requested {}",
                document.guid, guid
            )));
        }

        // Legacy envelopes carry no version: infer it from the body shape
        if document.body().is_some() && document.format_version() < VERSION_SINGLE_DERIVATION {
            let inferred = if document.accounts().iter().all(Account::is_multi_derivation) {
                VERSION_MULTI_DERIVATION
            } else {
                VERSION_SINGLE_DERIVATION
            };
            document.set_format_version(inferred);
        }

        let hd = build_hd(&document, None, self.network())?;
        log::info!(
            "Loaded wallet {} (format v{}, {} accounts, double encryption: {})",
            document.guid,
            document.format_version(),
            document.accounts().len(),
            document.is_double_encryption
        );

        self.state = Some(LoadedWallet {
            document,
            password: password.to_string(),
            checksum: EnvelopeCodec::checksum(&raw),
            hd,
        });

        // A failed repair save leaves nothing loaded
        if let Err(e) = self.run_repairs(None) {
            self.state = None;
            return Err(e);
        }
        Ok(())
    }

    /// New wallet with a fresh 12-word seed and one account, registered
    /// with the store.
    pub fn create(&mut self, password: &str, default_account_label: &str) -> Result<(), PayloadError> {
        validate_password(password)?;
        let hd = HdWalletsContainer::create_new(
            Language::English,
            NEW_WALLET_WORDS,
            "",
            1,
            self.network(),
        )?;
        let account = multi_derivation_account(&hd, 0, default_account_label, None)?;
        let body = WalletBody::new(
            hd.seed_hex()?,
            String::new(),
            vec![account],
            VERSION_MULTI_DERIVATION,
        );
        self.insert_new(password, body, hd)
    }

    /// Rebuild a wallet from its mnemonic. The number of accounts is found
    /// with gap-limit discovery against `query`.
    pub fn recover(
        &mut self,
        password: &str,
        language: Language,
        mnemonic: &[String],
        passphrase: &str,
        default_account_label: &str,
        query: &impl BalanceQuery,
    ) -> Result<(), PayloadError> {
        validate_password(password)?;
        let network = self.network();
        let entropy = Mnemonic::parse_in(language, mnemonic.join(" "))
            .map_err(|e| PayloadError::InvalidMnemonic(e.to_string()))?
            .to_entropy();
        // Only the entropy is stored and reloads render it with the English
        // word list, so the trees are built from that rendering
        let seed_hex = hex::encode(entropy);
        let scan = HdWalletsContainer::restore_from_entropy(Language::English, &seed_hex, passphrase, 0, network)?;
        let size = AccountDiscovery::default().wallet_size(&scan, query)?;
        log::info!("Recovering wallet with {} accounts", size);

        let hd = HdWalletsContainer::restore_from_entropy(
            Language::English,
            &seed_hex,
            passphrase,
            size,
            network,
        )?;
        let accounts = (0..size)
            .map(|i| {
                let label = if i == 0 {
                    default_account_label.to_string()
                } else {
                    format!("{} {}", default_account_label, i + 1)
                };
                multi_derivation_account(&hd, i, &label, None)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut body = WalletBody::new(
            hd.seed_hex()?,
            passphrase.to_string(),
            accounts,
            VERSION_MULTI_DERIVATION,
        );
        // The user just typed the phrase back in
        body.mnemonic_verified = true;
        self.insert_new(password, body, hd)
    }

    fn insert_new(
        &mut self,
        password: &str,
        body: WalletBody,
        hd: HdWalletsContainer,
    ) -> Result<(), PayloadError> {
        let options = Options {
            pbkdf2_iterations: Some(self.config.pbkdf2_iterations as i64),
            ..Options::default()
        };
        let document = WalletDocument::new(
            Uuid::new_v4().to_string(),
            Uuid::new_v4().to_string(),
            options,
            Some(body),
        );
        document.validate()?;

        let sealed = EnvelopeCodec::encrypt_and_wrap(&document, password)?;
        let sync_list = if self.sync_pub_keys {
            Some(sync_address_list(
                &document,
                self.network(),
                self.config.sync_lookahead,
            )?)
        } else {
            None
        };
        self.store.insert(
            &document.guid,
            &document.shared_key,
            &sealed.checksum,
            &sealed.serialized,
            sync_list.as_deref(),
        )?;

        log::info!("Created wallet {}", document.guid);
        self.state = Some(LoadedWallet {
            document,
            password: password.to_string(),
            checksum: sealed.checksum,
            hd: Some(hd),
        });
        Ok(())
    }

    /// Drop the decrypted document and keys
    pub fn wipe(&mut self) {
        if self.state.take().is_some() {
            log::info!("Wallet state cleared");
        }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn document(&self) -> Result<&WalletDocument, PayloadError> {
        Ok(&self.loaded()?.document)
    }

    pub fn guid(&self) -> Result<&str, PayloadError> {
        Ok(&self.loaded()?.document.guid)
    }

    pub fn shared_key(&self) -> Result<&str, PayloadError> {
        Ok(&self.loaded()?.document.shared_key)
    }

    pub fn checksum(&self) -> Result<&str, PayloadError> {
        Ok(&self.loaded()?.checksum)
    }

    pub fn hd_wallets(&self) -> Result<&HdWalletsContainer, PayloadError> {
        self.loaded()?
            .hd
            .as_ref()
            .ok_or_else(|| PayloadError::not_ready("wallet has no HD body"))
    }

    pub fn is_hd_decrypted(&self) -> bool {
        self.state
            .as_ref()
            .and_then(|s| s.hd.as_ref())
            .map(HdWalletsContainer::is_decrypted)
            .unwrap_or(false)
    }

    pub fn is_double_encrypted(&self) -> Result<bool, PayloadError> {
        Ok(self.loaded()?.document.is_double_encryption)
    }

    pub fn accounts(&self) -> Result<&[Account], PayloadError> {
        Ok(self.loaded()?.document.accounts())
    }

    pub fn account(&self, index: usize) -> Result<&Account, PayloadError> {
        self.loaded()?
            .document
            .account(index)
            .ok_or_else(|| PayloadError::InvalidInput(format!("no account at index {}", index)))
    }

    pub fn default_account_index(&self) -> Result<usize, PayloadError> {
        Ok(self.loaded()?.document.require_body()?.default_account_index())
    }

    /// Xpub sets of every non-archived account
    pub fn active_xpubs(&self) -> Result<Vec<XPubs>, PayloadError> {
        Ok(self
            .accounts()?
            .iter()
            .filter(|a| !a.is_archived())
            .map(Account::xpubs)
            .collect())
    }

    pub fn active_imported_addresses(&self) -> Result<Vec<String>, PayloadError> {
        Ok(self
            .loaded()?
            .document
            .active_imported_addresses()
            .map(|a| a.address.clone())
            .collect())
    }

    /// Refresh `ledger` with every active account and imported address
    pub fn refresh_balances(
        &self,
        ledger: &mut BalanceLedger,
        query: &impl BalanceQuery,
    ) -> Result<(), PayloadError> {
        ledger.refresh_all(query, &self.active_xpubs()?, &self.active_imported_addresses()?)
    }

    pub fn account_transactions(
        &self,
        query: &impl TransactionQuery,
        account: usize,
        limit: u32,
        offset: u32,
    ) -> Result<TxPage, PayloadError> {
        let (legacy, segwit) = self.account(account)?.xpubs().partition();
        query.transactions(&legacy, &segwit, limit, offset)
    }

    // ---------------------------------------------------------------------
    // Accounts
    // ---------------------------------------------------------------------

    /// Append an account at the next index of both key trees. Returns its index.
    pub fn add_account(
        &mut self,
        label: &str,
        second_password: Option<&str>,
    ) -> Result<usize, PayloadError> {
        validate_label(label)?;
        let (mut hd, cipher) = self.unlocked_hd(second_password)?;
        let mut candidate = self.loaded()?.document.clone();

        let index = hd.add_account()?;
        if index as usize != candidate.accounts().len() {
            return Err(PayloadError::corrupted(format!(
                "key trees hold {} accounts, document holds {}",
                index,
                candidate.accounts().len()
            )));
        }

        let account = if candidate.format_version() >= VERSION_MULTI_DERIVATION {
            multi_derivation_account(&hd, index, label, cipher.as_ref())?
        } else {
            legacy_account(&hd, index, label, cipher.as_ref())?
        };
        candidate.require_body_mut()?.accounts.push(account);

        let hd = self.retained_hd(hd, &candidate)?;
        self.save_and_sync(candidate, Some(hd))?;
        log::info!("Added account {}", index);
        Ok(index as usize)
    }

    pub fn update_account_label(&mut self, index: usize, label: &str) -> Result<(), PayloadError> {
        validate_label(label)?;
        let mut candidate = self.loaded()?.document.clone();
        let body = candidate.require_body_mut()?;
        let account = take_account(body, index)?;
        body.accounts[index] = account.with_label(label);
        self.save_and_sync(candidate, None)
    }

    pub fn archive_account(&mut self, index: usize, archived: bool) -> Result<(), PayloadError> {
        let mut candidate = self.loaded()?.document.clone();
        let body = candidate.require_body_mut()?;
        if archived && body.default_account_index() == index {
            return Err(PayloadError::InvalidInput(
                "the default account cannot be archived".into(),
            ));
        }
        let account = take_account(body, index)?;
        body.accounts[index] = account.with_archived(archived);
        self.save_and_sync(candidate, None)
    }

    pub fn set_default_account_index(&mut self, index: usize) -> Result<(), PayloadError> {
        let mut candidate = self.loaded()?.document.clone();
        let body = candidate.require_body_mut()?;
        if take_account(body, index)?.is_archived() {
            return Err(PayloadError::InvalidInput(format!(
                "account {} is archived",
                index
            )));
        }
        body.default_account_index = Some(index as u32);
        self.save_and_sync(candidate, None)
    }

    pub fn set_mnemonic_verified(&mut self, verified: bool) -> Result<(), PayloadError> {
        let mut candidate = self.loaded()?.document.clone();
        candidate.require_body_mut()?.mnemonic_verified = verified;
        self.save_and_sync(candidate, None)
    }

    /// Replace the derivation lists of the given accounts in one save.
    /// Xpubs must still match the key trees.
    pub fn update_derivations(
        &mut self,
        updates: Vec<(usize, MultiDerivationAccount)>,
    ) -> Result<(), PayloadError> {
        let mut candidate = self.loaded()?.document.clone();
        let body = candidate.require_body_mut()?;
        for (index, account) in updates {
            take_account(body, index)?;
            body.accounts[index] = Account::MultiDerivation(account);
        }
        if let Some(hd) = self.loaded()?.hd.as_ref() {
            check_trees_match(hd, candidate.accounts())?;
        }
        self.save_and_sync(candidate, None)
    }

    // ---------------------------------------------------------------------
    // Receive addresses
    // ---------------------------------------------------------------------

    /// First receive address at or after `from` not reserved by a label
    pub fn next_receive_address(
        &self,
        account: usize,
        derivation: DerivationType,
        from: u32,
    ) -> Result<(u32, Address), PayloadError> {
        let acc = self.account(account)?;
        let xpub = acc.xpub_for(derivation).ok_or_else(|| {
            PayloadError::InvalidInput(format!("account {} has no {} derivation", account, derivation))
        })?;
        let reserved: Vec<u32> = acc
            .address_labels(derivation)
            .iter()
            .map(|l| l.index)
            .collect();
        let position = AddressManager::find_next_unreserved(from, &reserved);
        let address =
            AddressManager::derive_address_str(xpub, derivation, RECEIVE_CHAIN, position, self.network())?;
        Ok((position, address))
    }

    /// Hand out the next receive address of the account's default type and
    /// record it as reserved.
    pub fn reserve_next_receive_address(
        &mut self,
        account: usize,
        from: u32,
        label: &str,
    ) -> Result<(u32, Address), PayloadError> {
        validate_label(label)?;
        let derivation = self.account(account)?.default_derivation_type();
        let (position, address) = self.next_receive_address(account, derivation, from)?;

        let mut candidate = self.loaded()?.document.clone();
        let body = candidate.require_body_mut()?;
        take_account(body, account)?;
        body.accounts[account].reserve_address(derivation, position, label);
        self.save_and_sync(candidate, None)?;

        log::debug!("Reserved {} position {} on account {}", derivation, position, account);
        Ok((position, address))
    }

    // ---------------------------------------------------------------------
    // Notes and password
    // ---------------------------------------------------------------------

    pub fn set_tx_note(&mut self, tx_hash: &str, note: &str) -> Result<(), PayloadError> {
        validate_tx_hash(tx_hash)?;
        let mut candidate = self.loaded()?.document.clone();
        candidate
            .tx_notes
            .insert(tx_hash.to_lowercase(), note.to_string());
        self.save_and_sync(candidate, None)
    }

    /// Returns false without saving when no note exists
    pub fn remove_tx_note(&mut self, tx_hash: &str) -> Result<bool, PayloadError> {
        let mut candidate = self.loaded()?.document.clone();
        if candidate.tx_notes.remove(&tx_hash.to_lowercase()).is_none() {
            return Ok(false);
        }
        self.save_and_sync(candidate, None)?;
        Ok(true)
    }

    /// Re-encrypt the unchanged document under `new_password`
    pub fn change_password(&mut self, new_password: &str) -> Result<(), PayloadError> {
        validate_password(new_password)?;
        let candidate = self.loaded()?.document.clone();
        self.save_and_sync_with_password(candidate, None, Some(new_password.to_string()))?;
        log::info!("Main password changed");
        Ok(())
    }

    /// Container to keep after a save made with unlocked keys: the unlocked
    /// one if the wallet was already unlocked, otherwise a watch-only copy so
    /// private keys are not held longer than the operation.
    fn retained_hd(
        &self,
        unlocked: HdWalletsContainer,
        candidate: &WalletDocument,
    ) -> Result<HdWalletsContainer, PayloadError> {
        let was_unlocked = self
            .loaded()?
            .hd
            .as_ref()
            .map(HdWalletsContainer::is_decrypted)
            .unwrap_or(false);
        if was_unlocked || !candidate.is_double_encryption {
            return Ok(unlocked);
        }
        let xpubs: Vec<XPubs> = candidate.accounts().iter().map(Account::xpubs).collect();
        HdWalletsContainer::restore_watch_only(&xpubs, self.network())
    }
}

/// Key trees for `document`: from the plaintext seed, from the seed
/// decrypted with `cipher`, or watch-only from the account xpubs.
pub(crate) fn build_hd(
    document: &WalletDocument,
    cipher: Option<&SecondPasswordCipher>,
    network: Network,
) -> Result<Option<HdWalletsContainer>, PayloadError> {
    let Some(body) = document.body() else {
        return Ok(None);
    };
    let account_count = body.accounts.len() as u32;

    let hd = match (document.is_double_encryption, cipher) {
        (false, _) => HdWalletsContainer::restore_from_entropy(
            Language::English,
            &body.seed_hex,
            &body.passphrase,
            account_count,
            network,
        )?,
        (true, Some(cipher)) => {
            let seed_hex = cipher.decrypt(&body.seed_hex)?;
            let passphrase = if body.passphrase.is_empty() {
                String::new()
            } else {
                cipher.decrypt(&body.passphrase)?
            };
            HdWalletsContainer::restore_from_entropy(
                Language::English,
                &seed_hex,
                &passphrase,
                account_count,
                network,
            )?
        }
        (true, None) => {
            let xpubs: Vec<XPubs> = body.accounts.iter().map(Account::xpubs).collect();
            HdWalletsContainer::restore_watch_only(&xpubs, network)?
        }
    };

    if hd.is_decrypted() {
        check_trees_match(&hd, &body.accounts)?;
    }
    Ok(Some(hd))
}

/// Every stored xpub must be the one the seed derives at that index
pub(crate) fn check_trees_match(
    hd: &HdWalletsContainer,
    accounts: &[Account],
) -> Result<(), PayloadError> {
    for (index, account) in accounts.iter().enumerate() {
        for xpub in account.xpubs().iter() {
            let derived = hd
                .account(index as u32, xpub.derivation)
                .map(|a| a.xpub().to_string());
            if derived.as_deref() != Some(xpub.address.as_str()) {
                return Err(PayloadError::corrupted(format!(
                    "account {} {} xpub does not match the seed",
                    index, xpub.derivation
                )));
            }
        }
    }
    Ok(())
}

/// Derivation entry for account `index` of one tree, xpriv encrypted with
/// `cipher` when given
pub(crate) fn derivation_for(
    hd: &HdWalletsContainer,
    index: u32,
    derivation: DerivationType,
    cipher: Option<&SecondPasswordCipher>,
) -> Result<Derivation, PayloadError> {
    let node = match hd.account(index, derivation) {
        Some(node) if node.xpriv().is_some() => node.clone(),
        _ => hd.derive_account(index, derivation)?,
    };
    let xpriv = node
        .xpriv()
        .ok_or_else(|| PayloadError::not_ready("HD wallet is watch-only"))?
        .to_string();
    let xpriv = match cipher {
        Some(cipher) => cipher.encrypt(&xpriv)?,
        None => xpriv,
    };
    Ok(Derivation::new(
        derivation,
        xpriv,
        node.xpub().to_string(),
        node.address_cache(),
    ))
}

pub(crate) fn multi_derivation_account(
    hd: &HdWalletsContainer,
    index: u32,
    label: &str,
    cipher: Option<&SecondPasswordCipher>,
) -> Result<Account, PayloadError> {
    let derivations = DerivationType::ALL
        .iter()
        .map(|t| derivation_for(hd, index, *t, cipher))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Account::MultiDerivation(MultiDerivationAccount::new(
        label,
        derivations,
    )))
}

pub(crate) fn legacy_account(
    hd: &HdWalletsContainer,
    index: u32,
    label: &str,
    cipher: Option<&SecondPasswordCipher>,
) -> Result<Account, PayloadError> {
    let derivation = derivation_for(hd, index, DerivationType::Legacy, cipher)?;
    Ok(Account::Legacy(LegacyAccount {
        label: label.to_string(),
        archived: false,
        xpriv: derivation.xpriv,
        xpub: derivation.xpub,
        address_labels: Vec::new(),
        cache: derivation.cache,
        extra: Default::default(),
    }))
}

fn take_account(body: &WalletBody, index: usize) -> Result<Account, PayloadError> {
    body.accounts
        .get(index)
        .cloned()
        .ok_or_else(|| PayloadError::InvalidInput(format!("no account at index {}", index)))
}

fn validate_label(label: &str) -> Result<(), PayloadError> {
    if label.trim().is_empty() {
        return Err(PayloadError::InvalidInput("label must not be empty".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), PayloadError> {
    if password.is_empty() {
        return Err(PayloadError::InvalidInput("password must not be empty".into()));
    }
    Ok(())
}

fn validate_tx_hash(tx_hash: &str) -> Result<(), PayloadError> {
    if tx_hash.len() != 64 || hex::decode(tx_hash).is_err() {
        return Err(PayloadError::InvalidInput(format!(
            "not a transaction hash: {}",
            tx_hash
        )));
    }
    Ok(())
}
