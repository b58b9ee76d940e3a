//! Format upgrades and self-healing repairs
//!
//! Upgrades are entered on demand: V2 (no HD body) to V3, then V3 to V4
//! (a segwit derivation next to every legacy one). Repairs run after each
//! load and fix known encoding defects in place. Both build the whole
//! candidate document first and push it in a single save.

use bip39::Language;

use super::{derivation_for, legacy_account, PayloadManager, NEW_WALLET_WORDS};
use crate::error::PayloadError;
use crate::hd::HdWalletsContainer;
use crate::payload::document::{VERSION_MULTI_DERIVATION, VERSION_SINGLE_DERIVATION};
use crate::payload::{Account, DerivationType, WalletBody};
use crate::remote::RemoteStore;

impl<S: RemoteStore> PayloadManager<S> {
    /// Whether the loaded document is below the multi-derivation format
    pub fn needs_upgrade(&self) -> Result<bool, PayloadError> {
        let document = &self.loaded()?.document;
        Ok(document.format_version() < VERSION_MULTI_DERIVATION
            || !document.accounts().iter().all(Account::has_full_derivations))
    }

    /// Give a wallet without an HD body a fresh seed and one account.
    /// Returns false when the body already exists.
    pub fn upgrade_v2_to_v3(
        &mut self,
        default_account_label: &str,
        second_password: Option<&str>,
    ) -> Result<bool, PayloadError> {
        if self.loaded()?.document.body().is_some() {
            return Ok(false);
        }
        self.try_upgrade_v2_to_v3(default_account_label, second_password)
            .map_err(into_upgrade_failure)?;
        log::info!("Upgraded wallet to v{}", VERSION_SINGLE_DERIVATION);
        Ok(true)
    }

    fn try_upgrade_v2_to_v3(
        &mut self,
        default_account_label: &str,
        second_password: Option<&str>,
    ) -> Result<(), PayloadError> {
        let document = &self.loaded()?.document;
        let cipher = match (document.is_double_encryption, second_password) {
            (false, _) => None,
            (true, Some(pw)) => Some(self.second_password_cipher(pw)?),
            (true, None) => {
                return Err(PayloadError::WalletUpgradeFailure(
                    "second password required to upgrade a double encrypted wallet".into(),
                ))
            }
        };

        let hd = HdWalletsContainer::create_new(
            Language::English,
            NEW_WALLET_WORDS,
            "",
            1,
            self.network(),
        )?;
        let account = legacy_account(&hd, 0, default_account_label, cipher.as_ref())?;
        let seed_hex = match &cipher {
            Some(cipher) => cipher.encrypt(&hd.seed_hex()?)?,
            None => hd.seed_hex()?,
        };

        let mut candidate = document.clone();
        candidate.bodies = vec![WalletBody::new(
            seed_hex,
            String::new(),
            vec![account],
            VERSION_SINGLE_DERIVATION,
        )];

        let hd = self.retained_hd(hd, &candidate)?;
        self.save_and_sync(candidate, Some(hd))
    }

    /// Attach a segwit derivation to every account, keeping the legacy
    /// entries as they are. Returns false, without any write, when every
    /// account already carries both derivations.
    pub fn upgrade_v3_to_v4(&mut self, second_password: Option<&str>) -> Result<bool, PayloadError> {
        if !self.needs_upgrade()? {
            return Ok(false);
        }
        self.try_upgrade_v3_to_v4(second_password)
            .map_err(into_upgrade_failure)?;
        log::info!("Upgraded wallet to v{}", VERSION_MULTI_DERIVATION);
        Ok(true)
    }

    fn try_upgrade_v3_to_v4(&mut self, second_password: Option<&str>) -> Result<(), PayloadError> {
        let document = &self.loaded()?.document;
        if document.body().is_none() {
            return Err(PayloadError::WalletUpgradeFailure(
                "wallet has no HD body; upgrade to v3 first".into(),
            ));
        }
        if document.is_double_encryption && second_password.is_none() {
            return Err(PayloadError::WalletUpgradeFailure(
                "second password required to upgrade a double encrypted wallet".into(),
            ));
        }

        let (hd, cipher) = self.unlocked_hd(second_password)?;
        let mut candidate = self.loaded()?.document.clone();
        let body = candidate.require_body_mut()?;

        let mut upgraded = Vec::with_capacity(body.accounts.len());
        for (index, account) in body.accounts.drain(..).enumerate() {
            let was_single = !account.is_multi_derivation();
            let mut account = account.upgrade_to_multi_derivation();
            for derivation in DerivationType::ALL {
                if account.derivation(derivation).is_none() {
                    account.set_derivation(derivation_for(
                        &hd,
                        index as u32,
                        derivation,
                        cipher.as_ref(),
                    )?);
                }
            }
            if was_single || account.default_derivation_type.is_none() {
                account.default_derivation_type = Some(DerivationType::SegwitBech32);
            }
            upgraded.push(Account::MultiDerivation(account));
        }
        body.accounts = upgraded;
        candidate.set_format_version(VERSION_MULTI_DERIVATION);

        let hd = self.retained_hd(hd, &candidate)?;
        self.save_and_sync(candidate, Some(hd))
    }

    /// Fix known defects of stored documents: a missing default account
    /// index, a missing default derivation type, and multi-derivation
    /// accounts that lost a derivation. Skipped entirely while double
    /// encryption is on and no second password was given. Returns whether a
    /// repair was saved.
    pub fn run_repairs(&mut self, second_password: Option<&str>) -> Result<bool, PayloadError> {
        let document = &self.loaded()?.document;
        if document.body().is_none() {
            return Ok(false);
        }
        if document.is_double_encryption && second_password.is_none() {
            log::debug!("Repairs skipped until the second password is supplied");
            return Ok(false);
        }

        let mut candidate = document.clone();
        let mut repaired = Vec::new();
        let body = candidate.require_body_mut()?;

        let index_valid = body
            .default_account_index
            .map(|i| (i as usize) < body.accounts.len())
            .unwrap_or(false);
        if !index_valid && !body.accounts.is_empty() {
            let first_active = body
                .accounts
                .iter()
                .position(|a| !a.is_archived())
                .unwrap_or(0);
            body.default_account_index = Some(first_active as u32);
            repaired.push("default account index");
        }

        let incomplete: Vec<usize> = body
            .accounts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_multi_derivation() && !a.has_full_derivations())
            .map(|(i, _)| i)
            .collect();
        if !incomplete.is_empty() {
            match self.unlocked_hd(second_password) {
                Ok((hd, cipher)) => {
                    for index in incomplete {
                        if let Some(Account::MultiDerivation(a)) = body.accounts.get_mut(index) {
                            for derivation in DerivationType::ALL {
                                if a.derivation(derivation).is_none() {
                                    a.set_derivation(derivation_for(
                                        &hd,
                                        index as u32,
                                        derivation,
                                        cipher.as_ref(),
                                    )?);
                                }
                            }
                        }
                    }
                    repaired.push("missing derivations");
                }
                Err(PayloadError::HDWalletNotReady(reason)) => {
                    log::warn!("Derivation repair skipped: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }

        // After the derivation repair so a restored segwit entry is preferred
        for account in &mut body.accounts {
            if let Account::MultiDerivation(a) = account {
                if a.default_derivation_type.is_none() {
                    a.default_derivation_type = Some(if a.derivation(DerivationType::SegwitBech32).is_some() {
                        DerivationType::SegwitBech32
                    } else {
                        DerivationType::Legacy
                    });
                    repaired.push("default derivation type");
                }
            }
        }

        if repaired.is_empty() {
            return Ok(false);
        }
        repaired.dedup();
        log::info!("Repairing wallet: {}", repaired.join(", "));

        let hd = match self.loaded()?.hd.as_ref() {
            Some(hd) if !hd.is_decrypted() => {
                let xpubs: Vec<_> = candidate.accounts().iter().map(Account::xpubs).collect();
                Some(HdWalletsContainer::restore_watch_only(&xpubs, self.network())?)
            }
            _ => None,
        };
        self.save_and_sync(candidate, hd)?;
        Ok(true)
    }
}

fn into_upgrade_failure(error: PayloadError) -> PayloadError {
    match error {
        PayloadError::WalletUpgradeFailure(_) => error,
        other => PayloadError::WalletUpgradeFailure(other.to_string()),
    }
}
