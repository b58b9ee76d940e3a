//! Account Discovery Tests
//!
//! Gap-limit scanning over both key trees and mnemonic recovery on top of it.

mod common;

use std::collections::HashSet;

use common::*;
use wallet_payload::{
    AccountDiscovery, BalanceFilter, DerivationType, EngineConfig, HdWalletsContainer, Language,
    Network, PayloadError, PayloadManager,
};

fn abandon_tree() -> HdWalletsContainer {
    HdWalletsContainer::restore_from_mnemonic(
        Language::English,
        &abandon_mnemonic(),
        "",
        0,
        Network::Bitcoin,
    )
    .unwrap()
}

// ============================================================================
// Gap-limit scan
// ============================================================================

#[test]
fn test_discovery_spans_gap() {
    init_logging();
    let hd = abandon_tree();
    let oracle = ScriptedBalances::with_used_accounts(&hd, &[0, 1, 2, 3, 4, 7]);

    let size = AccountDiscovery::default()
        .discover(&hd, &oracle, DerivationType::Legacy)
        .unwrap();
    assert_eq!(size, 8);
    // 0..5, 5..10, 10..20
    assert_eq!(oracle.calls.get(), 3);
    assert_eq!(oracle.requested.borrow().len(), 20);
    assert!(oracle.filters.borrow().iter().all(|f| *f == BalanceFilter::All));

    assert_eq!(AccountDiscovery::default().wallet_size(&hd, &oracle).unwrap(), 8);
}

#[test]
fn test_unused_wallet_has_one_account() {
    init_logging();
    let hd = abandon_tree();
    let oracle = ScriptedBalances::default();

    let discovery = AccountDiscovery::default();
    assert_eq!(discovery.discover(&hd, &oracle, DerivationType::Legacy).unwrap(), 0);
    assert_eq!(discovery.wallet_size(&hd, &oracle).unwrap(), 1);
}

#[test]
fn test_segwit_usage_alone_sizes_wallet() {
    init_logging();
    let hd = abandon_tree();
    let mut used = HashSet::new();
    used.insert(
        hd.derive_account(2, DerivationType::SegwitBech32)
            .unwrap()
            .xpub()
            .to_string(),
    );
    let oracle = ScriptedBalances {
        used,
        ..ScriptedBalances::default()
    };

    let discovery = AccountDiscovery::default();
    assert_eq!(discovery.discover(&hd, &oracle, DerivationType::Legacy).unwrap(), 0);
    assert_eq!(
        discovery
            .discover(&hd, &oracle, DerivationType::SegwitBech32)
            .unwrap(),
        3
    );
    assert_eq!(discovery.wallet_size(&hd, &oracle).unwrap(), 3);
}

#[test]
fn test_smaller_gap_limit_stops_early() {
    init_logging();
    let hd = abandon_tree();
    let oracle = ScriptedBalances::with_used_accounts(&hd, &[0, 7]);

    let discovery = AccountDiscovery {
        initial_batch: 2,
        gap_limit: 3,
    };
    assert_eq!(discovery.discover(&hd, &oracle, DerivationType::Legacy).unwrap(), 1);
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn test_recover_restores_discovered_accounts() -> anyhow::Result<()> {
    init_logging();
    let hd = abandon_tree();
    let oracle = ScriptedBalances::with_used_accounts(&hd, &[0, 1, 2, 3, 4, 7]);

    let store = FakeStore::new();
    let mut mgr = PayloadManager::new(store.clone(), EngineConfig::default());
    mgr.recover(PASSWORD, Language::English, &abandon_mnemonic(), "", "Wallet", &oracle)?;
    assert_eq!(store.inserts(), 1);

    let accounts = mgr.accounts()?;
    assert_eq!(accounts.len(), 8);
    assert_eq!(accounts[0].label(), "Wallet");
    assert_eq!(accounts[7].label(), "Wallet 8");
    assert!(accounts.iter().all(|a| a.has_full_derivations()));

    let expected = hd.derive_account(7, DerivationType::SegwitBech32)?.xpub().to_string();
    assert_eq!(
        accounts[7].xpub_for(DerivationType::SegwitBech32),
        Some(expected.as_str())
    );
    assert!(mgr.document()?.body().unwrap().mnemonic_verified);
    assert_eq!(mgr.hd_wallets()?.mnemonic()?, abandon_mnemonic());

    let document = mgr.document()?.clone();
    let mut reloaded = PayloadManager::new(store.clone(), EngineConfig::default());
    reloaded.initialize_and_decrypt(&document.guid, &document.shared_key, PASSWORD)?;
    assert_eq!(reloaded.document()?, &document);
    assert_eq!(reloaded.hd_wallets()?.account_count(), 8);
    Ok(())
}

#[test]
fn test_recover_accepts_other_word_lists() -> anyhow::Result<()> {
    init_logging();
    let hd = abandon_tree();
    let oracle = ScriptedBalances::with_used_accounts(&hd, &[0, 1]);

    // Same entropy as the English test phrase
    let spanish = HdWalletsContainer::restore_from_entropy(
        Language::Spanish,
        &hd.seed_hex()?,
        "",
        0,
        Network::Bitcoin,
    )?
    .mnemonic()?;
    assert_ne!(spanish, abandon_mnemonic());

    let store = FakeStore::new();
    let mut wrong_list = PayloadManager::new(store.clone(), EngineConfig::default());
    let err = wrong_list
        .recover(PASSWORD, Language::English, &spanish, "", "Wallet", &oracle)
        .unwrap_err();
    assert!(matches!(err, PayloadError::InvalidMnemonic(_)));
    assert_eq!(store.inserts(), 0);

    let mut mgr = PayloadManager::new(store.clone(), EngineConfig::default());
    mgr.recover(PASSWORD, Language::Spanish, &spanish, "", "Wallet", &oracle)?;
    assert_eq!(mgr.accounts()?.len(), 2);
    assert_eq!(mgr.hd_wallets()?.seed_hex()?, hd.seed_hex()?);
    assert_eq!(
        mgr.accounts()?[1].xpub_for(DerivationType::Legacy),
        Some(hd.derive_account(1, DerivationType::Legacy)?.xpub().to_string().as_str())
    );

    let document = mgr.document()?.clone();
    let mut reloaded = PayloadManager::new(store.clone(), EngineConfig::default());
    reloaded.initialize_and_decrypt(&document.guid, &document.shared_key, PASSWORD)?;
    assert_eq!(reloaded.document()?, &document);
    Ok(())
}
