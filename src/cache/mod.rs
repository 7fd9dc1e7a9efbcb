//! Local persistent cache for catalog entries.
//!
//! - A SQLite table of cached entries keyed by an autoincrement surrogate key
//! - Reactive reads that re-emit whenever the table changes
//! - Bulk clear that also restarts the key sequence

mod storage;
mod subscription;

pub use storage::{CacheStore, SqliteStore};
pub use subscription::Subscription;
