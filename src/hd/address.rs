use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, Network, PublicKey};
use std::str::FromStr;

use crate::error::PayloadError;
use crate::payload::DerivationType;

/// External (receive) chain under an account key
pub const RECEIVE_CHAIN: u32 = 0;
/// Internal (change) chain under an account key
pub const CHANGE_CHAIN: u32 = 1;

pub struct AddressManager;

impl AddressManager {
    /// Derive a single address from an account xpub at `chain/index`.
    /// Legacy keys give P2PKH, segwit keys give P2WPKH.
    pub fn derive_address(
        xpub: &Xpub,
        derivation: DerivationType,
        chain: u32,
        index: u32,
        network: Network,
    ) -> Result<Address, PayloadError> {
        let secp = Secp256k1::new();

        let chain_child = ChildNumber::from_normal_idx(chain)?;
        let child_number = ChildNumber::from_normal_idx(index)?;

        let derived_key = xpub.derive_pub(&secp, &[chain_child, child_number])?;

        Ok(Self::encode(derived_key.public_key, derivation, network))
    }

    /// Same as [`derive_address`](Self::derive_address) for a serialized xpub
    pub fn derive_address_str(
        xpub: &str,
        derivation: DerivationType,
        chain: u32,
        index: u32,
        network: Network,
    ) -> Result<Address, PayloadError> {
        let xpub = Self::parse_xpub(xpub)?;
        Self::derive_address(&xpub, derivation, chain, index, network)
    }

    /// First position at or after `start` that is not in `reserved`
    pub fn find_next_unreserved(start: u32, reserved: &[u32]) -> u32 {
        let mut index = start;

        while reserved.contains(&index) {
            index += 1;
        }

        index
    }

    pub fn parse_xpub(xpub: &str) -> Result<Xpub, PayloadError> {
        Xpub::from_str(xpub).map_err(|e| PayloadError::InvalidKey(e.to_string()))
    }

    pub fn encode(
        key: bitcoin::secp256k1::PublicKey,
        derivation: DerivationType,
        network: Network,
    ) -> Address {
        match derivation {
            DerivationType::Legacy => Address::p2pkh(PublicKey::new(key).pubkey_hash(), network),
            DerivationType::SegwitBech32 => Address::p2wpkh(&CompressedPublicKey(key), network),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_next_unreserved_skips_runs() {
        assert_eq!(AddressManager::find_next_unreserved(0, &[]), 0);
        assert_eq!(AddressManager::find_next_unreserved(0, &[0, 1, 3]), 2);
        assert_eq!(AddressManager::find_next_unreserved(3, &[0, 1, 3, 4]), 5);
    }

    #[test]
    fn test_bad_xpub_is_invalid_key() {
        let err = AddressManager::parse_xpub("xpub-nonsense").unwrap_err();
        assert!(matches!(err, PayloadError::InvalidKey(_)));
    }
}
