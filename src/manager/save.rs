//! Save-and-sync
//!
//! Every mutation builds a candidate document and hands it here. The
//! candidate is validated, encrypted under the wallet password and pushed
//! with the checksum of the last known remote state. Only a successful push
//! replaces the in-memory document, checksum and key trees.

use bitcoin::Network;

use super::{LoadedWallet, PayloadManager};
use crate::error::PayloadError;
use crate::hd::address::RECEIVE_CHAIN;
use crate::hd::{AddressManager, HdWalletsContainer};
use crate::payload::envelope::EnvelopeCodec;
use crate::payload::WalletDocument;
use crate::remote::{RemoteStore, SaveOutcome, SaveRequest};

impl<S: RemoteStore> PayloadManager<S> {
    /// Push `candidate` under the current password.
    /// `hd` replaces the key trees on success when given.
    pub(crate) fn save_and_sync(
        &mut self,
        candidate: WalletDocument,
        hd: Option<HdWalletsContainer>,
    ) -> Result<(), PayloadError> {
        self.save_and_sync_with_password(candidate, hd, None)
    }

    pub(crate) fn save_and_sync_with_password(
        &mut self,
        candidate: WalletDocument,
        hd: Option<HdWalletsContainer>,
        new_password: Option<String>,
    ) -> Result<(), PayloadError> {
        let loaded = self.loaded()?;

        // Fail before touching the network
        candidate.validate()?;

        let password = new_password.as_deref().unwrap_or(&loaded.password);
        let sealed = EnvelopeCodec::encrypt_and_wrap(&candidate, password)?;

        let sync_list = if self.sync_pub_keys {
            Some(sync_address_list(
                &candidate,
                self.config.bitcoin_network,
                self.config.sync_lookahead,
            )?)
        } else {
            None
        };

        let request = SaveRequest {
            guid: &candidate.guid,
            shared_key: &candidate.shared_key,
            old_checksum: &loaded.checksum,
            new_checksum: &sealed.checksum,
            payload: &sealed.serialized,
            sync_addresses: sync_list.as_deref(),
        };

        match self.store.save(&request)? {
            SaveOutcome::Conflict => {
                log::warn!("Save conflict for wallet {}, reload required", candidate.guid);
                Err(PayloadError::SaveConflict)
            }
            SaveOutcome::Saved => {
                log::debug!(
                    "Saved v{} payload, checksum {}",
                    sealed.envelope.version,
                    sealed.checksum
                );
                let state = self.state.as_mut().ok_or(PayloadError::NotInitialized)?;
                let LoadedWallet {
                    document,
                    password,
                    checksum,
                    hd: current_hd,
                } = state;
                *document = candidate;
                *checksum = sealed.checksum;
                if let Some(new_password) = new_password {
                    *password = new_password;
                }
                if let Some(hd) = hd {
                    *current_hd = Some(hd);
                }
                Ok(())
            }
        }
    }
}

/// Addresses announced to the server so it can recognise incoming payments:
/// the first `lookahead` unreserved receive positions of every derivation of
/// every active account, plus active imported addresses.
pub fn sync_address_list(
    document: &WalletDocument,
    network: Network,
    lookahead: u32,
) -> Result<Vec<String>, PayloadError> {
    let mut addresses = Vec::new();

    for account in document.accounts().iter().filter(|a| !a.is_archived()) {
        for xpub in account.xpubs().iter() {
            let reserved: Vec<u32> = account
                .address_labels(xpub.derivation)
                .iter()
                .map(|l| l.index)
                .collect();
            let parsed = AddressManager::parse_xpub(&xpub.address)?;

            let mut position = 0;
            for _ in 0..lookahead {
                position = AddressManager::find_next_unreserved(position, &reserved);
                let address = AddressManager::derive_address(
                    &parsed,
                    xpub.derivation,
                    RECEIVE_CHAIN,
                    position,
                    network,
                )?;
                addresses.push(address.to_string());
                position += 1;
            }
        }
    }

    addresses.extend(
        document
            .active_imported_addresses()
            .map(|a| a.address.clone()),
    );
    Ok(addresses)
}
