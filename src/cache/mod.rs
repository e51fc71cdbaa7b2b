//! Caching infrastructure for open tables.
//!
//! - **Idle list**: LRU order over readers no caller currently references
//! - **Table Cache**: Caches open SSTable reader handles, keyed by file number
//! - **Stats**: Counters for hits, opens, evictions and retirements

mod lru;
mod stats;
mod table_cache;

pub use stats::{CacheStats, CacheStatsSnapshot};
pub use table_cache::{EntryState, TableCache, TableHandle};
