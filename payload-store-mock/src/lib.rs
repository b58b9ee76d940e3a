/// Wallet API Mock Server Library
///
/// This crate provides both a standalone binary and library components
/// for mocking the wallet document store and balance services in memory.

pub mod handlers;
pub mod server;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use handlers::AppState;
pub use server::{create_router, run_server, serve};
pub use store::{MockStore, StoreError, StoredWallet};
pub use types::*;
