// Strongbox — Store Module
//
// The storage engine abstraction and its two variants. Both engines speak
// the same prepare/get/all/run/free statement contract, so callers never
// branch on whether the file underneath is encrypted.

pub mod catalog;
mod encrypted;
mod engine;
mod error;
mod plaintext;
mod statement;

pub use encrypted::EncryptedEngine;
pub use engine::{EngineKind, Rekeyable, StorageEngine};
pub use error::StoreError;
pub use plaintext::PlaintextEngine;
pub use statement::{Row, RunResult, Statement};

/// Parameter value type accepted by statements.
pub use rusqlite::types::Value;
