//! # zipfolder
//!
//! A read-only overlay filesystem that shows ZIP archives as directories.
//!
//! A path such as `docs/archive.zip/sub/file.txt` is served by opening
//! `docs/archive.zip` and reading `sub/file.txt` from it, without extracting
//! anything to disk. Open archives are kept in a bounded LRU cache; an
//! archive is never closed while one of its entries is being read.
//!
//! ## Features
//!
//! - Archives appear as directories in listings and `stat`
//! - Bounded cache of open archives with single-flight loading
//! - Background idle sweep that closes archives nobody is reading
//! - Archives nested inside archives
//! - ZIP64, STORED and DEFLATE, CRC-32 checked on read
//! - Local, in-memory and sub-directory base storages
//!
//! ## Example
//!
//! ```no_run
//! use zipfolder::{LocalStorage, OverlayConfig, OverlayFs};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fs = OverlayFs::new(LocalStorage::new("."), OverlayConfig::default());
//!
//!     let info = fs.stat("bundle.zip").await?;
//!     assert!(info.is_dir());
//!
//!     let mut file = fs.open("bundle.zip/notes/todo.txt").await?;
//!     let mut text = Vec::new();
//!     file.read_to_end(&mut text).await?;
//!     file.close();
//!
//!     fs.close().await;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod overlay;
pub mod path;
pub mod storage;
pub mod zip;

pub use archive::{ArchiveCache, ArchiveHandle, CacheStats, EntryReader, Lease};
pub use cli::Cli;
pub use config::OverlayConfig;
pub use error::{Error, Result};
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use overlay::{OverlayFile, OverlayFs, SubFs};
pub use storage::{
    BaseStorage, FileInfo, FileKind, FileWriter, LocalStorage, MemoryStorage, SubStorage,
    WritableStorage,
};
