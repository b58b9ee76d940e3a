//! One BIP44-style key tree (`m/purpose'/coin'/account'`)

use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, Network};

use super::address::{AddressManager, CHANGE_CHAIN, RECEIVE_CHAIN};
use crate::config::coin_type;
use crate::error::PayloadError;
use crate::payload::{AddressCache, DerivationType};

/// Account node of a tree. `xpriv` is absent when restored watch-only.
#[derive(Clone, Debug)]
pub struct HdAccount {
    index: u32,
    derivation: DerivationType,
    xpriv: Option<Xpriv>,
    xpub: Xpub,
    receive: Xpub,
    change: Xpub,
}

impl HdAccount {
    fn from_xpriv(index: u32, derivation: DerivationType, xpriv: Xpriv) -> Result<Self, PayloadError> {
        let secp = Secp256k1::new();
        let xpub = Xpub::from_priv(&secp, &xpriv);
        let mut account = Self::from_xpub(index, derivation, xpub)?;
        account.xpriv = Some(xpriv);
        Ok(account)
    }

    fn from_xpub(index: u32, derivation: DerivationType, xpub: Xpub) -> Result<Self, PayloadError> {
        let secp = Secp256k1::new();
        let receive = xpub.derive_pub(&secp, &[ChildNumber::from_normal_idx(RECEIVE_CHAIN)?])?;
        let change = xpub.derive_pub(&secp, &[ChildNumber::from_normal_idx(CHANGE_CHAIN)?])?;
        Ok(Self {
            index,
            derivation,
            xpriv: None,
            xpub,
            receive,
            change,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn derivation(&self) -> DerivationType {
        self.derivation
    }

    pub fn xpub(&self) -> &Xpub {
        &self.xpub
    }

    pub fn xpriv(&self) -> Option<&Xpriv> {
        self.xpriv.as_ref()
    }

    pub fn address_cache(&self) -> AddressCache {
        AddressCache {
            receive_account: self.receive.to_string(),
            change_account: self.change.to_string(),
        }
    }

    pub fn receive_address(&self, position: u32, network: Network) -> Result<Address, PayloadError> {
        AddressManager::derive_address(&self.xpub, self.derivation, RECEIVE_CHAIN, position, network)
    }

    pub fn change_address(&self, position: u32, network: Network) -> Result<Address, PayloadError> {
        AddressManager::derive_address(&self.xpub, self.derivation, CHANGE_CHAIN, position, network)
    }
}

#[derive(Clone, Debug)]
pub struct HdTree {
    derivation: DerivationType,
    network: Network,
    master: Option<Xpriv>,
    accounts: Vec<HdAccount>,
}

impl HdTree {
    pub fn from_seed(
        derivation: DerivationType,
        seed: &[u8],
        account_count: u32,
        network: Network,
    ) -> Result<Self, PayloadError> {
        let master = Xpriv::new_master(network, seed)?;
        let mut tree = Self {
            derivation,
            network,
            master: Some(master),
            accounts: Vec::with_capacity(account_count as usize),
        };
        for _ in 0..account_count {
            tree.add_account()?;
        }
        Ok(tree)
    }

    /// Public-only tree from known account xpubs, `(index, xpub)` pairs
    pub fn watch_only(
        derivation: DerivationType,
        xpubs: &[(u32, String)],
        network: Network,
    ) -> Result<Self, PayloadError> {
        let accounts = xpubs
            .iter()
            .map(|(index, xpub)| {
                HdAccount::from_xpub(*index, derivation, AddressManager::parse_xpub(xpub)?)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            derivation,
            network,
            master: None,
            accounts,
        })
    }

    pub fn derivation(&self) -> DerivationType {
        self.derivation
    }

    pub fn master_key(&self) -> Option<&Xpriv> {
        self.master.as_ref()
    }

    pub fn accounts(&self) -> &[HdAccount] {
        &self.accounts
    }

    pub fn account(&self, index: u32) -> Option<&HdAccount> {
        self.accounts.iter().find(|a| a.index == index)
    }

    /// Derive the account node at `index` without adding it to the tree
    pub fn derive_account(&self, index: u32) -> Result<HdAccount, PayloadError> {
        let master = self.master.as_ref().ok_or_else(|| {
            PayloadError::not_ready(format!("{} tree has no private keys", self.derivation))
        })?;
        let secp = Secp256k1::new();
        let path = [
            ChildNumber::from_hardened_idx(self.derivation.purpose())?,
            ChildNumber::from_hardened_idx(coin_type(self.network))?,
            ChildNumber::from_hardened_idx(index)?,
        ];
        let xpriv = master.derive_priv(&secp, &path)?;
        HdAccount::from_xpriv(index, self.derivation, xpriv)
    }

    pub fn add_account(&mut self) -> Result<u32, PayloadError> {
        let index = self
            .accounts
            .iter()
            .map(|a| a.index + 1)
            .max()
            .unwrap_or(0);
        let account = self.derive_account(index)?;
        self.accounts.push(account);
        Ok(index)
    }
}
