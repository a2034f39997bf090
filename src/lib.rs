// Strongbox — Library root
//
// Re-exports the keys, store, migrate, adapter, config, and CLI modules.

pub mod adapter;
pub mod cli;
pub mod config;
pub mod error;
pub mod keys;
pub mod migrate;
pub mod store;

pub use adapter::{Adapter, AdapterState};
pub use error::{Result, StrongboxError};
