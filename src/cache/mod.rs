//! Cover cache
//!
//! Slot-based file placement, the read/write contract, and the sync/purge
//! passes that keep the index and the files on disk consistent.

pub mod covers;
pub mod repair;
pub mod slots;
pub mod types;

pub use covers::CoverStore;
pub use slots::Slots;
pub use types::{CacheStats, PurgeReport, SyncReport};
