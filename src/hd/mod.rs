//! HD key derivation
//!
//! - `container` - legacy (BIP44) and segwit (BIP84) trees over one seed
//! - `tree` - a single purpose tree and its account nodes
//! - `address` - address encoding and position selection

pub mod address;
pub mod container;
pub mod tree;

pub use address::AddressManager;
pub use container::HdWalletsContainer;
pub use tree::{HdAccount, HdTree};
