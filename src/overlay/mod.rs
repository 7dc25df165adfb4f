//! The overlay filesystem: base storage with ZIP archives shown as
//! directories.
//!
//! Every call resolves its path first. Paths that never cross an archive go
//! straight to the base storage; paths that do are served by the
//! [`ArchiveCache`].
//!
//! ```no_run
//! use zipfolder::{LocalStorage, OverlayConfig, OverlayFs};
//!
//! #[tokio::main]
//! async fn main() -> zipfolder::Result<()> {
//!     let fs = OverlayFs::new(LocalStorage::new("/srv/data"), OverlayConfig::default());
//!
//!     for entry in fs.read_dir("docs/bundle.zip").await? {
//!         println!("{} {}", if entry.is_dir() { "d" } else { "f" }, entry.name);
//!     }
//!     let bytes = fs.read_file("docs/bundle.zip/readme.txt").await?;
//!     println!("{} bytes", bytes.len());
//!
//!     fs.close().await;
//!     Ok(())
//! }
//! ```

mod file;
mod sub;

pub use file::OverlayFile;
pub use sub::SubFs;

use std::sync::Arc;

use tracing::trace;

use crate::archive::ArchiveCache;
use crate::config::OverlayConfig;
use crate::error::{Error, Result};
use crate::io;
use crate::path::{self, Resolved};
use crate::storage::{BaseStorage, FileInfo, FileWriter, WritableStorage};

struct Inner<S> {
    storage: Arc<S>,
    cache: ArchiveCache,
}

/// Read-only view of a [`BaseStorage`] in which `*.zip` files are
/// directories.
///
/// Cloning is cheap; clones share one archive cache. The cache's idle sweep
/// runs until [`OverlayFs::close`] is called or the last clone is dropped.
pub struct OverlayFs<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for OverlayFs<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: BaseStorage> OverlayFs<S> {
    /// Wrap `storage`. Must be called inside a tokio runtime.
    pub fn new(storage: S, config: OverlayConfig) -> Self {
        Self::from_arc(Arc::new(storage), config)
    }

    pub fn from_arc(storage: Arc<S>, config: OverlayConfig) -> Self {
        let cache = ArchiveCache::new(Arc::clone(&storage) as Arc<dyn BaseStorage>, &config);
        Self {
            inner: Arc::new(Inner { storage, cache }),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.inner.storage
    }

    pub fn cache(&self) -> &ArchiveCache {
        &self.inner.cache
    }

    /// Open a file for sequential reading.
    ///
    /// Opening an archive itself (or a directory inside one) fails with
    /// [`Error::IsADirectory`].
    pub async fn open(&self, path: &str) -> Result<OverlayFile> {
        match path::resolve(path)? {
            Resolved::Plain(path) => {
                trace!(path, "Opening from base storage");
                let info = self
                    .inner
                    .storage
                    .stat(&path)
                    .await
                    .map_err(|e| Error::from_io(&path, e))?;
                if info.is_dir() {
                    return Err(Error::is_a_directory(path));
                }
                let source = self
                    .inner
                    .storage
                    .open(&path)
                    .await
                    .map_err(|e| Error::from_io(&path, e))?;
                let info = FileInfo::file(info.name, source.size()).with_modified(info.modified);
                Ok(OverlayFile::plain(path, info, source))
            }
            Resolved::Mounted { archive, internal } => {
                if internal.is_empty() {
                    return Err(Error::is_a_directory(archive));
                }
                trace!(archive, internal, "Opening archive entry");
                let reader = self.inner.cache.open_entry(&archive, &internal).await?;
                Ok(OverlayFile::entry(reader))
            }
        }
    }

    /// Metadata for `path`. Archives report as directories.
    ///
    /// Stat on an archive root loads the archive, so a corrupt archive is
    /// reported here rather than on the first listing.
    pub async fn stat(&self, path: &str) -> Result<FileInfo> {
        match path::resolve(path)? {
            Resolved::Plain(path) => self
                .inner
                .storage
                .stat(&path)
                .await
                .map_err(|e| Error::from_io(&path, e)),
            Resolved::Mounted { archive, internal } => {
                let handle = self.inner.cache.get(&archive).await?;
                if internal.is_empty() {
                    return Ok(FileInfo::dir(path::file_name(&archive)));
                }
                let info = handle.stat(&internal)?;
                Ok(as_listed(info))
            }
        }
    }

    /// Immediate children of `path`, sorted by name.
    ///
    /// Archive files among the children are listed as directories.
    pub async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        let entries = match path::resolve(path)? {
            Resolved::Plain(path) => self
                .inner
                .storage
                .read_dir(&path)
                .await
                .map_err(|e| Error::from_io(&path, e))?,
            Resolved::Mounted { archive, internal } => {
                let handle = self.inner.cache.get(&archive).await?;
                handle.read_dir(&internal)?
            }
        };
        Ok(entries.into_iter().map(as_listed).collect())
    }

    /// Read a whole file into memory.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut file = self.open(path).await?;
        let mut data = Vec::with_capacity(io::prealloc_len(file.info().size));
        let result = file.read_to_end(&mut data).await;
        file.close();
        result.map(|_| data)
    }

    /// A view of this filesystem rooted at `dir`.
    pub fn sub(&self, dir: &str) -> Result<SubFs<S>> {
        SubFs::new(self.clone(), dir)
    }

    /// Stop the idle sweep and close every cached archive.
    ///
    /// Closing with readers still open is a caller error: they keep working
    /// until closed, but nothing is cached any more. Idempotent.
    pub async fn close(&self) {
        self.inner.cache.close().await;
    }
}

impl<S: WritableStorage> OverlayFs<S> {
    /// Create a file in the base storage. Archives are read-only.
    pub async fn create(&self, path: &str) -> Result<FileWriter> {
        let path = writable_path(path)?;
        self.inner
            .storage
            .create(&path)
            .await
            .map_err(|e| Error::from_io(&path, e))
    }

    /// Create a directory in the base storage. Archives are read-only.
    pub async fn make_dir(&self, path: &str) -> Result<()> {
        let path = writable_path(path)?;
        self.inner
            .storage
            .make_dir(&path)
            .await
            .map_err(|e| Error::from_io(&path, e))
    }
}

impl<S> std::fmt::Debug for OverlayFs<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayFs")
            .field("cache", &self.inner.cache)
            .finish()
    }
}

/// Show archive files as directories.
fn as_listed(info: FileInfo) -> FileInfo {
    if !info.is_dir() && path::is_archive_name(&info.name) {
        FileInfo::dir(info.name)
    } else {
        info
    }
}

fn writable_path(path: &str) -> Result<String> {
    match path::resolve(path)? {
        Resolved::Plain(path) => Ok(path),
        Resolved::Mounted { .. } => Err(Error::ReadOnly {
            path: path.to_string(),
        }),
    }
}
