//! Covers Cache - self-healing disk cache for book cover images
//!
//! Maps a cover lookup key to the remote URL of the image and a local copy of
//! the downloaded file. Files are spread over slot directories under the cache
//! root and the mapping lives in a persistent index next to them.
//!
//! ```no_run
//! use covers_cache::{CacheConfig, CoverStore};
//!
//! let mut cache = CoverStore::open(CacheConfig::new(".covers"))?;
//! cache.set("gooc.9780000000000.2", "http://books.google.com/cover.jpg", "/tmp/9780000000000.jpg")?;
//! let cover = cache.get("gooc.9780000000000.2");
//! cache.sync()?;
//! # Ok::<(), covers_cache::CacheError>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod index;

pub use cache::{CacheStats, CoverStore, PurgeReport, Slots, SyncReport};
pub use config::{CacheConfig, DEFAULT_MAX_LEN, DEFAULT_NSLOTS, INDEX_FILE_NAME};
pub use error::{CacheError, Result};
pub use index::{Cover, FileIndex, PersistentIndex};
