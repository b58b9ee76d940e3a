//! The decrypted wallet document
//!
//! Aggregate root holding the HD bodies, imported addresses, notes and
//! options. Fields this crate does not model are carried through untouched
//! so documents written by other clients survive a save.

use bitcoin::bip32::Xpriv;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::account::Account;
use super::imported::{decode_private_key, ImportedAddress};
use crate::config::{sanitize_iterations, DEFAULT_PBKDF2_ITERATIONS};
use crate::error::PayloadError;

/// Envelope version of wrapped documents without an HD body
pub const VERSION_NON_HD: u32 = 2;
pub const VERSION_SINGLE_DERIVATION: u32 = 3;
pub const VERSION_MULTI_DERIVATION: u32 = 4;

fn default_fee_per_kb() -> u64 {
    10_000
}

fn default_logout_time() -> u64 {
    600_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Raw value as stored; read through [`WalletDocument::pbkdf2_iterations`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbkdf2_iterations: Option<i64>,
    #[serde(default = "default_fee_per_kb")]
    pub fee_per_kb: u64,
    #[serde(default)]
    pub html5_notifications: bool,
    #[serde(default = "default_logout_time")]
    pub logout_time: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: Some(DEFAULT_PBKDF2_ITERATIONS as i64),
            fee_per_kb: default_fee_per_kb(),
            html5_notifications: false,
            logout_time: default_logout_time(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBody {
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// BIP39 entropy, hex; ciphertext under double encryption
    pub seed_hex: String,
    #[serde(default)]
    pub passphrase: String,
    #[serde(default)]
    pub mnemonic_verified: bool,
    /// Nullable on the wire; repaired after load
    #[serde(rename = "default_account_idx", default)]
    pub default_account_index: Option<u32>,
    /// Taken from the envelope, never serialized
    #[serde(skip)]
    pub format_version: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WalletBody {
    pub fn new(seed_hex: String, passphrase: String, accounts: Vec<Account>, format_version: u32) -> Self {
        Self {
            accounts,
            seed_hex,
            passphrase,
            mnemonic_verified: false,
            default_account_index: Some(0),
            format_version,
            extra: Map::new(),
        }
    }

    pub fn default_account_index(&self) -> usize {
        self.default_account_index.unwrap_or(0) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletDocument {
    pub guid: String,
    #[serde(rename = "sharedKey")]
    pub shared_key: String,
    #[serde(rename = "double_encryption", default)]
    pub is_double_encryption: bool,
    #[serde(rename = "dpasswordhash", default, skip_serializing_if = "Option::is_none")]
    pub second_password_hash: Option<String>,
    #[serde(default)]
    pub options: Options,
    #[serde(rename = "hd_wallets", default, skip_serializing_if = "Vec::is_empty")]
    pub bodies: Vec<WalletBody>,
    #[serde(rename = "keys", default)]
    pub imported_addresses: Vec<ImportedAddress>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tx_notes: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WalletDocument {
    pub fn new(guid: String, shared_key: String, options: Options, body: Option<WalletBody>) -> Self {
        Self {
            guid,
            shared_key,
            is_double_encryption: false,
            second_password_hash: None,
            options,
            bodies: body.into_iter().collect(),
            imported_addresses: Vec::new(),
            tx_notes: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PayloadError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn pbkdf2_iterations(&self) -> u32 {
        self.options
            .pbkdf2_iterations
            .map(sanitize_iterations)
            .unwrap_or(DEFAULT_PBKDF2_ITERATIONS)
    }

    /// The HD body. Historically there is exactly one.
    pub fn body(&self) -> Option<&WalletBody> {
        self.bodies.first()
    }

    pub fn body_mut(&mut self) -> Option<&mut WalletBody> {
        self.bodies.first_mut()
    }

    pub fn require_body(&self) -> Result<&WalletBody, PayloadError> {
        self.body()
            .ok_or_else(|| PayloadError::not_ready("wallet has no HD body"))
    }

    pub fn require_body_mut(&mut self) -> Result<&mut WalletBody, PayloadError> {
        self.body_mut()
            .ok_or_else(|| PayloadError::not_ready("wallet has no HD body"))
    }

    pub fn format_version(&self) -> u32 {
        self.body()
            .map(|b| b.format_version)
            .filter(|v| *v >= VERSION_SINGLE_DERIVATION)
            .unwrap_or(VERSION_NON_HD)
    }

    pub fn set_format_version(&mut self, version: u32) {
        for body in &mut self.bodies {
            body.format_version = version;
        }
    }

    pub fn accounts(&self) -> &[Account] {
        self.body().map(|b| b.accounts.as_slice()).unwrap_or(&[])
    }

    pub fn account(&self, index: usize) -> Option<&Account> {
        self.accounts().get(index)
    }

    pub fn imported_address(&self, address: &str) -> Option<&ImportedAddress> {
        self.imported_addresses.iter().find(|a| a.address == address)
    }

    pub fn active_imported_addresses(&self) -> impl Iterator<Item = &ImportedAddress> {
        self.imported_addresses.iter().filter(|a| !a.is_archived())
    }

    /// Private material must be uniformly plaintext or uniformly ciphertext,
    /// matching the double-encryption flag.
    pub fn is_encryption_consistent(&self) -> bool {
        let plaintext_expected = !self.is_double_encryption;

        let xprivs_ok = self
            .accounts()
            .iter()
            .flat_map(|a| a.xprivs())
            .all(|x| Xpriv::from_str(x).is_ok() == plaintext_expected);

        let imported_ok = self
            .imported_addresses
            .iter()
            .filter_map(|a| a.private_key.as_deref())
            .all(|k| decode_private_key(k).is_ok() == plaintext_expected);

        let seed_ok = self.bodies.iter().all(|b| {
            let looks_plain = !b.seed_hex.is_empty() && hex::decode(&b.seed_hex).is_ok();
            looks_plain == plaintext_expected
        });

        xprivs_ok && imported_ok && seed_ok
    }

    /// Structural checks run before anything is pushed
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.guid.is_empty() || self.shared_key.is_empty() {
            return Err(PayloadError::corrupted("missing guid or shared key"));
        }
        if self.is_double_encryption && self.second_password_hash.is_none() {
            return Err(PayloadError::corrupted(
                "double encryption enabled without a password hash",
            ));
        }
        if !self.is_encryption_consistent() {
            return Err(PayloadError::corrupted(
                "inconsistent key encryption across accounts",
            ));
        }
        for body in &self.bodies {
            if let Some(index) = body.default_account_index {
                if !body.accounts.is_empty() && index as usize >= body.accounts.len() {
                    return Err(PayloadError::corrupted(format!(
                        "default account index {} out of range ({} accounts)",
                        index,
                        body.accounts.len()
                    )));
                }
            }
        }
        Ok(())
    }
}
