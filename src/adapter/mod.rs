// Strongbox — Engine Selector / Adapter
//
// Decides which engine a store runs on, acquires its key, runs the one-time
// migration when owed, and owns the resulting engine handle.

mod lifecycle;
mod selector;

pub use lifecycle::{Adapter, AdapterState, MetadataSummary, StoreStatus, DEVELOPMENT_PASSWORD};
pub use selector::{detect_engine, Selection, SelectionReason, SelectorInput};
