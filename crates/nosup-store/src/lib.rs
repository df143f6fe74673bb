//! Resume-state persistence for the NOSUP upload engine.
//!
//! A [`ResumeStore`] maps a content digest to the last-known server context
//! and remote object name, letting a brand-new session pick a transfer back
//! up at the server's acknowledged offset. Records are overwritten on save,
//! deleted on completion, and only ever treated as hints; the storage
//! service's offset probe is the authority on resume position.

mod local;
mod memory;
mod traits;

pub use local::LocalResumeStore;
pub use memory::MemoryResumeStore;
pub use traits::{ResumeStore, StoreError, StoreResult};
