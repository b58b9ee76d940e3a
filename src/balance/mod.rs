//! Balance bookkeeping
//!
//! Per-chain cache of xpub/address balances, refreshed in bulk and debited
//! optimistically after a spend.

pub mod ledger;

pub use ledger::{BalanceLedger, Chain};
