//! Envelope and Derivation Tests
//!
//! Sealing documents written by other clients, and restoring key trees
//! from the same mnemonic.

mod common;

use common::*;
use wallet_payload::payload::document::{VERSION_NON_HD, VERSION_SINGLE_DERIVATION};
use wallet_payload::payload::Envelope;
use wallet_payload::{
    DerivationType, EnvelopeCodec, HdWalletsContainer, Language, Network, WalletDocument,
};

const FOREIGN_DOCUMENT: &str = r#"{
    "guid": "5f3c1a2e-0000-4000-8000-000000000001",
    "sharedKey": "5f3c1a2e-0000-4000-8000-000000000002",
    "double_encryption": false,
    "options": {
        "pbkdf2_iterations": 5000,
        "fee_per_kb": 10000,
        "html5_notifications": false,
        "logout_time": 600000,
        "always_keep_local_backup": true
    },
    "hd_wallets": [{
        "seed_hex": "00000000000000000000000000000000",
        "passphrase": "",
        "mnemonic_verified": false,
        "default_account_idx": 0,
        "accounts": [],
        "paidTo": {}
    }],
    "keys": [],
    "address_book": [{"addr": "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", "label": "shop"}],
    "metadataHDNode": "xprv-placeholder"
}"#;

fn foreign_document() -> WalletDocument {
    let mut document = WalletDocument::from_json(FOREIGN_DOCUMENT).unwrap();
    document.set_format_version(VERSION_SINGLE_DERIVATION);
    document
}

// ============================================================================
// Envelope
// ============================================================================

#[test]
fn test_unknown_fields_survive_seal_and_open() {
    init_logging();
    let document = foreign_document();
    assert!(document.extra.contains_key("address_book"));
    assert!(document.options.extra.contains_key("always_keep_local_backup"));

    let sealed = EnvelopeCodec::encrypt_and_wrap(&document, PASSWORD).unwrap();
    let opened = EnvelopeCodec::decrypt(&sealed.serialized, PASSWORD).unwrap();
    assert_eq!(opened, document);

    let json: serde_json::Value = serde_json::from_str(&opened.to_json().unwrap()).unwrap();
    assert_eq!(json["metadataHDNode"], "xprv-placeholder");
    assert_eq!(json["address_book"][0]["label"], "shop");
    assert!(json["hd_wallets"][0].get("paidTo").is_some());
}

#[test]
fn test_wrapper_carries_format_version() {
    let document = foreign_document();
    let sealed = EnvelopeCodec::encrypt_and_wrap(&document, PASSWORD).unwrap();

    assert_eq!(sealed.envelope.version, VERSION_SINGLE_DERIVATION);
    assert_eq!(sealed.envelope.pbkdf2_iterations, 5000);
    assert_eq!(Envelope::parse(&sealed.serialized).version(), VERSION_SINGLE_DERIVATION);

    let mut no_body = document.clone();
    no_body.bodies.clear();
    let sealed = EnvelopeCodec::encrypt_and_wrap(&no_body, PASSWORD).unwrap();
    assert_eq!(sealed.envelope.version, VERSION_NON_HD);
}

#[test]
fn test_checksum_is_sha256_of_wire_bytes() {
    let sealed = EnvelopeCodec::encrypt_and_wrap(&foreign_document(), PASSWORD).unwrap();
    assert_eq!(sealed.checksum, EnvelopeCodec::checksum(&sealed.serialized));
    assert!(sealed.checksum.chars().all(|c| c.is_ascii_hexdigit()));

    // Fresh salt and IV every time
    let again = EnvelopeCodec::encrypt_and_wrap(&foreign_document(), PASSWORD).unwrap();
    assert_ne!(sealed.checksum, again.checksum);
    assert_eq!(EnvelopeCodec::checksum(""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
}

// ============================================================================
// Derivation
// ============================================================================

fn abandon_wallet(accounts: u32) -> HdWalletsContainer {
    HdWalletsContainer::restore_from_mnemonic(
        Language::English,
        &abandon_mnemonic(),
        "",
        accounts,
        Network::Bitcoin,
    )
    .unwrap()
}

#[test]
fn test_restore_is_deterministic() {
    let first = abandon_wallet(3);
    let second = abandon_wallet(3);

    for derivation in DerivationType::ALL {
        for index in 0..3 {
            let a = first.account(index, derivation).unwrap();
            let b = second.account(index, derivation).unwrap();
            assert_eq!(a.xpub(), b.xpub());
            assert_eq!(
                first.change_address(index, derivation, 4).unwrap(),
                second.change_address(index, derivation, 4).unwrap()
            );
        }
    }

    let watch_only = HdWalletsContainer::restore_watch_only(
        &(0..3)
            .map(|i| {
                DerivationType::ALL
                    .iter()
                    .map(|d| {
                        wallet_payload::XPub::new(
                            first.account(i, *d).unwrap().xpub().to_string(),
                            *d,
                        )
                    })
                    .collect()
            })
            .collect::<Vec<wallet_payload::XPubs>>(),
        Network::Bitcoin,
    )
    .unwrap();
    assert!(!watch_only.is_decrypted());
    assert_eq!(
        watch_only.receive_address(2, DerivationType::SegwitBech32, 7).unwrap(),
        first.receive_address(2, DerivationType::SegwitBech32, 7).unwrap()
    );
}

#[test]
fn test_passphrase_changes_every_key() {
    let plain = abandon_wallet(1);
    let salted = HdWalletsContainer::restore_from_mnemonic(
        Language::English,
        &abandon_mnemonic(),
        "TREZOR",
        1,
        Network::Bitcoin,
    )
    .unwrap();

    assert_eq!(plain.seed_hex().unwrap(), salted.seed_hex().unwrap());
    assert_eq!(salted.passphrase().unwrap(), "TREZOR");
    for derivation in DerivationType::ALL {
        assert_ne!(
            plain.account(0, derivation).unwrap().xpub(),
            salted.account(0, derivation).unwrap().xpub()
        );
    }
}
