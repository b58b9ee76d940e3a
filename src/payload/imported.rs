//! Imported (non-HD) addresses

use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Address, Network, PrivateKey, PublicKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PayloadError;

pub const TAG_ACTIVE: u32 = 0;
pub const TAG_ARCHIVED: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedAddress {
    #[serde(rename = "addr")]
    pub address: String,
    /// Base58 of the raw 32-byte key, or ciphertext under double encryption.
    /// Absent for watch-only entries.
    #[serde(rename = "priv", default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub tag: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_device_version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImportedAddress {
    pub fn watch_only(address: impl Into<String>, label: Option<String>, device: &DeviceInfo) -> Self {
        Self {
            address: address.into(),
            private_key: None,
            label,
            tag: TAG_ACTIVE,
            created_time: Some(chrono::Utc::now().timestamp_millis()),
            created_device_name: Some(device.name.clone()),
            created_device_version: Some(device.version.clone()),
            extra: Map::new(),
        }
    }

    /// Entry for a spendable key; `private_key` is already in stored form.
    pub fn with_key(
        address: impl Into<String>,
        private_key: String,
        label: Option<String>,
        device: &DeviceInfo,
    ) -> Self {
        Self {
            private_key: Some(private_key),
            ..Self::watch_only(address, label, device)
        }
    }

    pub fn is_watch_only(&self) -> bool {
        self.private_key.is_none()
    }

    pub fn is_archived(&self) -> bool {
        self.tag == TAG_ARCHIVED
    }
}

/// Client identity recorded on newly created entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub version: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: "wallet-payload".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Stored form of a private key: base58 of the raw secret bytes
pub fn encode_private_key(key: &SecretKey) -> String {
    bitcoin::base58::encode(&key.secret_bytes())
}

pub fn decode_private_key(encoded: &str) -> Result<SecretKey, PayloadError> {
    let bytes = bitcoin::base58::decode(encoded)
        .map_err(|e| PayloadError::InvalidKey(e.to_string()))?;
    SecretKey::from_slice(&bytes).map_err(|e| PayloadError::InvalidKey(e.to_string()))
}

/// Parse a WIF string into a secret key
pub fn parse_wif(wif: &str) -> Result<PrivateKey, PayloadError> {
    PrivateKey::from_wif(wif.trim()).map_err(|e| PayloadError::InvalidKey(e.to_string()))
}

/// P2PKH address of a key in the compression form the key declares
pub fn address_for_key(key: &PrivateKey, network: Network) -> Address {
    let secp = Secp256k1::new();
    let public_key = key.public_key(&secp);
    Address::p2pkh(public_key.pubkey_hash(), network)
}

/// Whether `address` is the compressed or uncompressed P2PKH address of `key`
pub fn key_controls_address(key: &SecretKey, address: &str, network: Network) -> bool {
    let secp = Secp256k1::new();
    let point = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, key);
    [PublicKey::new(point), PublicKey::new_uncompressed(point)]
        .iter()
        .any(|pk| Address::p2pkh(pk.pubkey_hash(), network).to_string() == address)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIF: &str = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn";

    #[test]
    fn test_stored_key_round_trip() {
        let key = parse_wif(WIF).unwrap();
        let encoded = encode_private_key(&key.inner);
        assert_eq!(decode_private_key(&encoded).unwrap(), key.inner);
    }

    #[test]
    fn test_key_controls_both_address_forms() {
        let key = parse_wif(WIF).unwrap();
        let secp = Secp256k1::new();
        let point = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &key.inner);
        let uncompressed =
            Address::p2pkh(PublicKey::new_uncompressed(point).pubkey_hash(), Network::Bitcoin);
        let compressed = address_for_key(&key, Network::Bitcoin);

        assert!(key_controls_address(&key.inner, &compressed.to_string(), Network::Bitcoin));
        assert!(key_controls_address(&key.inner, &uncompressed.to_string(), Network::Bitcoin));
        assert!(!key_controls_address(
            &key.inner,
            "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
            Network::Bitcoin
        ));
    }

    #[test]
    fn test_watch_only_serializes_without_priv() {
        let entry = ImportedAddress::watch_only("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", None, &DeviceInfo::default());
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("priv").is_none());
        assert_eq!(value["addr"], "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2");
        assert!(entry.is_watch_only());
    }

    #[test]
    fn test_unknown_fields_are_carried() {
        let raw = serde_json::json!({
            "addr": "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
            "tag": 0,
            "paidTo": {"abc": 1}
        });
        let entry: ImportedAddress = serde_json::from_value(raw.clone()).unwrap();
        assert!(entry.extra.contains_key("paidTo"));
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }
}
