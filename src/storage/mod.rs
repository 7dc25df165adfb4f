//! Base storage: the host filesystem the overlay sits on.
//!
//! The overlay only ever reads through [`BaseStorage`]. Writable storages
//! additionally implement [`WritableStorage`], which the overlay passes
//! through for paths outside archives.

mod local;
mod memory;
mod sub;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use sub::SubStorage;

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWrite;

use crate::io::ReadAt;

/// Writer returned by [`WritableStorage::create`].
pub type FileWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Kind of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    File,
    Dir,
}

/// Metadata for one file or directory, used by both `stat` and listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Base name (last path segment; empty for the root).
    pub name: String,
    pub kind: FileKind,
    /// Size in bytes; zero for directories.
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl FileInfo {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::File,
            size,
            modified: None,
        }
    }

    /// A directory record that carries nothing but its name.
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::Dir,
            size: 0,
            modified: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.modified = modified;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }
}

/// Read capability of the host filesystem.
///
/// Paths are normalized and relative to the storage root; `""` is the root.
#[async_trait]
pub trait BaseStorage: Send + Sync + 'static {
    /// Open a file for random access reads.
    async fn open(&self, path: &str) -> io::Result<Arc<dyn ReadAt>>;

    /// Metadata for a file or directory.
    async fn stat(&self, path: &str) -> io::Result<FileInfo>;

    /// Immediate children of a directory, sorted by name.
    async fn read_dir(&self, path: &str) -> io::Result<Vec<FileInfo>>;
}

/// Write capability, for storages that support it.
#[async_trait]
pub trait WritableStorage: BaseStorage {
    /// Create (or truncate) a file.
    async fn create(&self, path: &str) -> io::Result<FileWriter>;

    /// Create a single directory; the parent must exist.
    async fn make_dir(&self, path: &str) -> io::Result<()>;
}

#[async_trait]
impl<S: BaseStorage + ?Sized> BaseStorage for Arc<S> {
    async fn open(&self, path: &str) -> io::Result<Arc<dyn ReadAt>> {
        (**self).open(path).await
    }

    async fn stat(&self, path: &str) -> io::Result<FileInfo> {
        (**self).stat(path).await
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<FileInfo>> {
        (**self).read_dir(path).await
    }
}
