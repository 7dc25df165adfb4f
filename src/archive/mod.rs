//! Open archives and the cache that owns them.
//!
//! - [`handle`]: one parsed archive plus its source and occupancy count
//! - [`reader`]: entry readers and the lease they hold on their archive
//! - [`cache`]: bounded LRU map of handles with an idle sweep

mod cache;
mod handle;
mod reader;

pub use cache::{ArchiveCache, CacheStats};
pub use handle::ArchiveHandle;
pub use reader::{EntryReader, Lease};
