//! Second-password operations
//!
//! With double encryption on, the seed, passphrase, xprivs and imported
//! keys are stored as ciphertext and the key trees load watch-only. The
//! second password is never kept; operations that need private keys take
//! it as an argument.

use super::{build_hd, PayloadManager};
use crate::crypto::{second_password_hash, validate_second_password, SecondPasswordCipher};
use crate::error::PayloadError;
use crate::hd::HdWalletsContainer;
use crate::payload::{Account, WalletDocument};
use crate::remote::RemoteStore;

impl<S: RemoteStore> PayloadManager<S> {
    pub fn validate_second_password(&self, second_password: &str) -> Result<bool, PayloadError> {
        let document = &self.loaded()?.document;
        Ok(validate_second_password(
            document.second_password_hash.as_deref(),
            &document.shared_key,
            second_password,
            document.pbkdf2_iterations(),
        ))
    }

    /// Cipher for the loaded wallet's secrets, after checking the password
    pub(crate) fn second_password_cipher(
        &self,
        second_password: &str,
    ) -> Result<SecondPasswordCipher, PayloadError> {
        if !self.validate_second_password(second_password)? {
            return Err(PayloadError::InvalidSecondPassword);
        }
        let document = &self.loaded()?.document;
        Ok(SecondPasswordCipher::new(
            &document.shared_key,
            second_password,
            document.pbkdf2_iterations(),
        ))
    }

    /// Key trees holding private keys, plus the cipher new secrets must be
    /// stored under when double encryption is on.
    pub(crate) fn unlocked_hd(
        &self,
        second_password: Option<&str>,
    ) -> Result<(HdWalletsContainer, Option<SecondPasswordCipher>), PayloadError> {
        let loaded = self.loaded()?;
        let document = &loaded.document;

        if !document.is_double_encryption {
            let hd = loaded
                .hd
                .as_ref()
                .filter(|hd| hd.is_decrypted())
                .ok_or_else(|| PayloadError::not_ready("wallet has no HD seed"))?;
            return Ok((hd.clone(), None));
        }

        let second_password = second_password
            .ok_or_else(|| PayloadError::not_ready("second password required"))?;
        let cipher = self.second_password_cipher(second_password)?;
        let hd = match loaded.hd.as_ref().filter(|hd| hd.is_decrypted()) {
            Some(hd) => hd.clone(),
            None => build_hd(document, Some(&cipher), self.network())?
                .ok_or_else(|| PayloadError::not_ready("wallet has no HD seed"))?,
        };
        Ok((hd, Some(cipher)))
    }

    /// Load private keys into the key trees and run the repairs that were
    /// skipped while they were locked. Nothing is saved unless a repair
    /// applies.
    pub fn decrypt_hd_wallet(&mut self, second_password: &str) -> Result<(), PayloadError> {
        let loaded = self.loaded()?;
        if !loaded.document.is_double_encryption {
            return Ok(());
        }
        let cipher = self.second_password_cipher(second_password)?;
        let hd = build_hd(&loaded.document, Some(&cipher), self.network())?;
        self.loaded_mut()?.hd = hd;
        log::info!("HD wallet decrypted with second password");

        self.run_repairs(Some(second_password))?;
        Ok(())
    }

    pub fn enable_double_encryption(&mut self, second_password: &str) -> Result<(), PayloadError> {
        let loaded = self.loaded()?;
        let document = &loaded.document;
        if document.is_double_encryption {
            return Err(PayloadError::InvalidInput(
                "double encryption is already enabled".into(),
            ));
        }
        if second_password.is_empty() {
            return Err(PayloadError::InvalidInput(
                "second password must not be empty".into(),
            ));
        }
        if second_password == loaded.password {
            return Err(PayloadError::InvalidInput(
                "second password must differ from the main password".into(),
            ));
        }

        let iterations = document.pbkdf2_iterations();
        let cipher = SecondPasswordCipher::new(&document.shared_key, second_password, iterations);
        let mut candidate = document.clone();
        transform_secrets(&mut candidate, |secret| cipher.encrypt(secret))?;
        candidate.is_double_encryption = true;
        candidate.second_password_hash = Some(second_password_hash(
            &candidate.shared_key,
            second_password,
            iterations,
        ));

        self.save_and_sync(candidate, None)?;
        log::info!("Double encryption enabled");
        Ok(())
    }

    pub fn disable_double_encryption(&mut self, second_password: &str) -> Result<(), PayloadError> {
        let document = &self.loaded()?.document;
        if !document.is_double_encryption {
            return Err(PayloadError::InvalidInput(
                "double encryption is not enabled".into(),
            ));
        }
        let cipher = self.second_password_cipher(second_password)?;

        let mut candidate = document.clone();
        transform_secrets(&mut candidate, |secret| cipher.decrypt(secret))?;
        candidate.is_double_encryption = false;
        candidate.second_password_hash = None;

        let hd = build_hd(&candidate, None, self.network())?;
        self.save_and_sync(candidate, hd)?;
        log::info!("Double encryption disabled");
        Ok(())
    }
}

/// Apply `f` to every secret in the document: seeds, non-empty
/// passphrases, xprivs and imported keys.
pub(crate) fn transform_secrets<F>(document: &mut WalletDocument, mut f: F) -> Result<(), PayloadError>
where
    F: FnMut(&str) -> Result<String, PayloadError>,
{
    for body in &mut document.bodies {
        body.seed_hex = f(&body.seed_hex)?;
        if !body.passphrase.is_empty() {
            body.passphrase = f(&body.passphrase)?;
        }
        for account in &mut body.accounts {
            match account {
                Account::Legacy(a) => a.xpriv = f(&a.xpriv)?,
                Account::MultiDerivation(a) => {
                    for derivation in &mut a.derivations {
                        derivation.xpriv = f(&derivation.xpriv)?;
                    }
                }
            }
        }
    }
    for imported in &mut document.imported_addresses {
        if let Some(key) = imported.private_key.as_mut() {
            *key = f(key)?;
        }
    }
    Ok(())
}
