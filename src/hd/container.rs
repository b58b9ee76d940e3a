//! Legacy + segwit key trees sharing one seed
//!
//! Both trees are derived from the same BIP39 seed and passphrase and always
//! hold the same account indices. The container is built once per loaded
//! document and owned by the payload manager.

use bip39::{Language, Mnemonic};
use bitcoin::bip32::Xpriv;
use bitcoin::{Address, Network};
use rand::RngCore;

use super::tree::{HdAccount, HdTree};
use crate::error::PayloadError;
use crate::payload::{DerivationType, XPubs};

#[derive(Clone)]
struct SeedMaterial {
    mnemonic: Mnemonic,
    passphrase: String,
}

#[derive(Clone)]
pub struct HdWalletsContainer {
    legacy: HdTree,
    segwit: HdTree,
    seed: Option<SeedMaterial>,
    network: Network,
}

impl std::fmt::Debug for HdWalletsContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdWalletsContainer")
            .field("network", &self.network)
            .field("decrypted", &self.is_decrypted())
            .field("accounts", &self.account_count())
            .finish()
    }
}

/// Entropy length in bytes for a BIP39 word count
pub fn entropy_len(word_count: usize) -> Result<usize, PayloadError> {
    match word_count {
        12 | 15 | 18 | 21 | 24 => Ok(word_count / 3 * 4),
        other => Err(PayloadError::InvalidInput(format!(
            "unsupported mnemonic length: {} words",
            other
        ))),
    }
}

impl HdWalletsContainer {
    /// Fresh random wallet with `account_count` accounts in both trees
    pub fn create_new(
        language: Language,
        word_count: usize,
        passphrase: &str,
        account_count: u32,
        network: Network,
    ) -> Result<Self, PayloadError> {
        let mut entropy = vec![0u8; entropy_len(word_count)?];
        rand::thread_rng().fill_bytes(&mut entropy);
        let mnemonic = Mnemonic::from_entropy_in(language, &entropy)
            .map_err(|e| PayloadError::InvalidMnemonic(e.to_string()))?;

        log::info!("Created new {}-word HD wallet", word_count);
        Self::from_mnemonic(mnemonic, passphrase, account_count, network)
    }

    pub fn restore_from_mnemonic(
        language: Language,
        words: &[String],
        passphrase: &str,
        account_count: u32,
        network: Network,
    ) -> Result<Self, PayloadError> {
        let mnemonic = Mnemonic::parse_in(language, words.join(" "))
            .map_err(|e| PayloadError::InvalidMnemonic(e.to_string()))?;
        Self::from_mnemonic(mnemonic, passphrase, account_count, network)
    }

    /// Restore from the hex entropy stored in the document. The word list
    /// matters: the seed is computed from the rendered mnemonic.
    pub fn restore_from_entropy(
        language: Language,
        entropy_hex: &str,
        passphrase: &str,
        account_count: u32,
        network: Network,
    ) -> Result<Self, PayloadError> {
        let entropy = hex::decode(entropy_hex)
            .map_err(|e| PayloadError::InvalidMnemonic(format!("seed is not hex: {}", e)))?;
        let mnemonic = Mnemonic::from_entropy_in(language, &entropy)
            .map_err(|e| PayloadError::InvalidMnemonic(e.to_string()))?;
        Self::from_mnemonic(mnemonic, passphrase, account_count, network)
    }

    /// Public-only container for when the seed cannot be decrypted.
    /// Accounts without a segwit xpub are absent from the segwit tree.
    pub fn restore_watch_only(accounts: &[XPubs], network: Network) -> Result<Self, PayloadError> {
        let collect = |derivation: DerivationType| -> Vec<(u32, String)> {
            accounts
                .iter()
                .enumerate()
                .filter_map(|(i, xpubs)| {
                    xpubs
                        .for_type(derivation)
                        .map(|x| (i as u32, x.address.clone()))
                })
                .collect()
        };

        Ok(Self {
            legacy: HdTree::watch_only(DerivationType::Legacy, &collect(DerivationType::Legacy), network)?,
            segwit: HdTree::watch_only(
                DerivationType::SegwitBech32,
                &collect(DerivationType::SegwitBech32),
                network,
            )?,
            seed: None,
            network,
        })
    }

    fn from_mnemonic(
        mnemonic: Mnemonic,
        passphrase: &str,
        account_count: u32,
        network: Network,
    ) -> Result<Self, PayloadError> {
        let seed = mnemonic.to_seed(passphrase);
        Ok(Self {
            legacy: HdTree::from_seed(DerivationType::Legacy, &seed, account_count, network)?,
            segwit: HdTree::from_seed(DerivationType::SegwitBech32, &seed, account_count, network)?,
            seed: Some(SeedMaterial {
                mnemonic,
                passphrase: passphrase.to_string(),
            }),
            network,
        })
    }

    /// Private seed material is loaded (not watch-only)
    pub fn is_decrypted(&self) -> bool {
        self.seed.is_some()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn account_count(&self) -> usize {
        self.legacy.accounts().len()
    }

    pub fn tree(&self, derivation: DerivationType) -> &HdTree {
        match derivation {
            DerivationType::Legacy => &self.legacy,
            DerivationType::SegwitBech32 => &self.segwit,
        }
    }

    fn seed(&self) -> Result<&SeedMaterial, PayloadError> {
        self.seed
            .as_ref()
            .ok_or_else(|| PayloadError::not_ready("HD wallet is watch-only"))
    }

    /// Append the next account index to both trees
    pub fn add_account(&mut self) -> Result<u32, PayloadError> {
        self.seed()?;
        let legacy_index = self.legacy.add_account()?;
        let segwit_index = self.segwit.add_account()?;
        if legacy_index != segwit_index {
            return Err(PayloadError::corrupted(format!(
                "key trees out of step: legacy {} vs segwit {}",
                legacy_index, segwit_index
            )));
        }
        log::debug!("Added HD account {}", legacy_index);
        Ok(legacy_index)
    }

    pub fn account(&self, index: u32, derivation: DerivationType) -> Option<&HdAccount> {
        self.tree(derivation).account(index)
    }

    /// Derive an account node without registering it (needs private keys)
    pub fn derive_account(&self, index: u32, derivation: DerivationType) -> Result<HdAccount, PayloadError> {
        self.tree(derivation).derive_account(index)
    }

    fn account_or_err(&self, index: u32, derivation: DerivationType) -> Result<&HdAccount, PayloadError> {
        self.account(index, derivation).ok_or_else(|| {
            PayloadError::InvalidInput(format!("no {} account at index {}", derivation, index))
        })
    }

    pub fn receive_address(
        &self,
        account: u32,
        derivation: DerivationType,
        position: u32,
    ) -> Result<Address, PayloadError> {
        self.account_or_err(account, derivation)?
            .receive_address(position, self.network)
    }

    pub fn change_address(
        &self,
        account: u32,
        derivation: DerivationType,
        position: u32,
    ) -> Result<Address, PayloadError> {
        self.account_or_err(account, derivation)?
            .change_address(position, self.network)
    }

    pub fn master_key(&self, derivation: DerivationType) -> Result<&Xpriv, PayloadError> {
        self.tree(derivation)
            .master_key()
            .ok_or_else(|| PayloadError::not_ready("HD wallet is watch-only"))
    }

    pub fn mnemonic(&self) -> Result<Vec<String>, PayloadError> {
        Ok(self
            .seed()?
            .mnemonic
            .to_string()
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    /// Entropy as stored in the document's `seed_hex`
    pub fn seed_hex(&self) -> Result<String, PayloadError> {
        Ok(hex::encode(self.seed()?.mnemonic.to_entropy()))
    }

    pub fn passphrase(&self) -> Result<&str, PayloadError> {
        Ok(&self.seed()?.passphrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abandon_words() -> Vec<String> {
        let mut words = vec!["abandon".to_string(); 11];
        words.push("about".to_string());
        words
    }

    #[test]
    fn test_reference_vectors() {
        let hd = HdWalletsContainer::restore_from_mnemonic(
            Language::English,
            &abandon_words(),
            "",
            1,
            Network::Bitcoin,
        )
        .unwrap();

        assert_eq!(
            hd.receive_address(0, DerivationType::Legacy, 0).unwrap().to_string(),
            "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA"
        );
        assert_eq!(
            hd.receive_address(0, DerivationType::SegwitBech32, 0).unwrap().to_string(),
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
        );
        assert_eq!(
            hd.change_address(0, DerivationType::SegwitBech32, 0).unwrap().to_string(),
            "bc1q8c6fshw2dlwun7ekn9qwf37cu2rn755upcp6el"
        );
        assert_eq!(hd.seed_hex().unwrap(), "00000000000000000000000000000000");
    }

    #[test]
    fn test_word_count_sets_entropy_length() {
        for (words, bytes) in [(12, 16), (18, 24), (24, 32)] {
            let hd = HdWalletsContainer::create_new(Language::English, words, "", 1, Network::Bitcoin).unwrap();
            assert_eq!(hd.mnemonic().unwrap().len(), words);
            assert_eq!(hd.seed_hex().unwrap().len(), bytes * 2);
        }
        assert!(entropy_len(13).is_err());
    }

    #[test]
    fn test_add_account_keeps_trees_in_step() {
        let mut hd = HdWalletsContainer::restore_from_mnemonic(
            Language::English,
            &abandon_words(),
            "",
            1,
            Network::Bitcoin,
        )
        .unwrap();
        assert_eq!(hd.add_account().unwrap(), 1);
        assert!(hd.account(1, DerivationType::Legacy).is_some());
        assert!(hd.account(1, DerivationType::SegwitBech32).is_some());
    }

    #[test]
    fn test_watch_only_derives_but_cannot_add() {
        let full = HdWalletsContainer::restore_from_mnemonic(
            Language::English,
            &abandon_words(),
            "",
            1,
            Network::Bitcoin,
        )
        .unwrap();
        let xpubs = XPubs::new(
            DerivationType::ALL
                .iter()
                .map(|t| {
                    crate::payload::XPub::new(full.account(0, *t).unwrap().xpub().to_string(), *t)
                })
                .collect(),
        );

        let mut watch = HdWalletsContainer::restore_watch_only(&[xpubs], Network::Bitcoin).unwrap();
        assert!(!watch.is_decrypted());
        assert_eq!(
            watch.receive_address(0, DerivationType::SegwitBech32, 0).unwrap(),
            full.receive_address(0, DerivationType::SegwitBech32, 0).unwrap()
        );
        assert!(matches!(watch.add_account(), Err(PayloadError::HDWalletNotReady(_))));
        assert!(matches!(watch.mnemonic(), Err(PayloadError::HDWalletNotReady(_))));
    }
}
