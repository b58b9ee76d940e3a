//! Imported address operations

use bitcoin::address::NetworkUnchecked;
use bitcoin::Address;

use super::PayloadManager;
use crate::error::PayloadError;
use crate::payload::imported::{
    address_for_key, encode_private_key, key_controls_address, parse_wif, TAG_ACTIVE, TAG_ARCHIVED,
};
use crate::payload::{ImportedAddress, WalletDocument};
use crate::remote::RemoteStore;

impl<S: RemoteStore> PayloadManager<S> {
    /// Import a spendable key given as WIF. Returns the P2PKH address.
    pub fn import_private_key(
        &mut self,
        wif: &str,
        label: Option<&str>,
        second_password: Option<&str>,
    ) -> Result<String, PayloadError> {
        let key = parse_wif(wif)?;
        let address = address_for_key(&key, self.network()).to_string();

        let stored = self.stored_private_key(&key.inner, second_password)?;
        let mut candidate = self.loaded()?.document.clone();
        if candidate.imported_address(&address).is_some() {
            return Err(PayloadError::InvalidInput(format!(
                "{} is already imported",
                address
            )));
        }
        candidate.imported_addresses.push(ImportedAddress::with_key(
            address.clone(),
            stored,
            label.map(str::to_string),
            &self.device,
        ));

        self.save_and_sync(candidate, None)?;
        log::info!("Imported private key for {}", address);
        Ok(address)
    }

    pub fn import_watch_only(&mut self, address: &str, label: Option<&str>) -> Result<(), PayloadError> {
        let address = address.trim();
        address
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|e| PayloadError::InvalidInput(format!("invalid address {}: {}", address, e)))?
            .require_network(self.network())
            .map_err(|e| PayloadError::InvalidInput(format!("invalid address {}: {}", address, e)))?;

        let mut candidate = self.loaded()?.document.clone();
        if candidate.imported_address(address).is_some() {
            return Err(PayloadError::InvalidInput(format!(
                "{} is already imported",
                address
            )));
        }
        candidate.imported_addresses.push(ImportedAddress::watch_only(
            address,
            label.map(str::to_string),
            &self.device,
        ));

        self.save_and_sync(candidate, None)?;
        log::info!("Imported watch-only address {}", address);
        Ok(())
    }

    /// Turn a watch-only entry spendable. The key must control the address;
    /// label and creation metadata stay as they were.
    pub fn attach_private_key(
        &mut self,
        address: &str,
        wif: &str,
        second_password: Option<&str>,
    ) -> Result<(), PayloadError> {
        let key = parse_wif(wif)?;
        if !key_controls_address(&key.inner, address, self.network()) {
            return Err(PayloadError::InvalidKey(format!(
                "key does not control {}",
                address
            )));
        }
        let stored = self.stored_private_key(&key.inner, second_password)?;

        let mut candidate = self.loaded()?.document.clone();
        let entry = imported_entry_mut(&mut candidate, address)?;
        if !entry.is_watch_only() {
            return Err(PayloadError::InvalidInput(format!(
                "{} already has a private key",
                address
            )));
        }
        entry.private_key = Some(stored);

        self.save_and_sync(candidate, None)?;
        log::info!("Attached private key to {}", address);
        Ok(())
    }

    pub fn update_imported_label(&mut self, address: &str, label: Option<&str>) -> Result<(), PayloadError> {
        let mut candidate = self.loaded()?.document.clone();
        imported_entry_mut(&mut candidate, address)?.label = label.map(str::to_string);
        self.save_and_sync(candidate, None)
    }

    pub fn archive_imported_address(&mut self, address: &str, archived: bool) -> Result<(), PayloadError> {
        let mut candidate = self.loaded()?.document.clone();
        imported_entry_mut(&mut candidate, address)?.tag = if archived { TAG_ARCHIVED } else { TAG_ACTIVE };
        self.save_and_sync(candidate, None)
    }

    /// Private key in stored form, encrypted when double encryption is on
    fn stored_private_key(
        &self,
        key: &bitcoin::secp256k1::SecretKey,
        second_password: Option<&str>,
    ) -> Result<String, PayloadError> {
        let encoded = encode_private_key(key);
        if !self.loaded()?.document.is_double_encryption {
            return Ok(encoded);
        }
        let second_password = second_password
            .ok_or_else(|| PayloadError::not_ready("second password required"))?;
        self.second_password_cipher(second_password)?.encrypt(&encoded)
    }
}

fn imported_entry_mut<'a>(
    document: &'a mut WalletDocument,
    address: &str,
) -> Result<&'a mut ImportedAddress, PayloadError> {
    document
        .imported_addresses
        .iter_mut()
        .find(|a| a.address == address)
        .ok_or_else(|| PayloadError::InvalidInput(format!("{} is not imported", address)))
}
