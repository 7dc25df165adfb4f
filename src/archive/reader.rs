//! Leases and entry readers.
//!
//! A [`Lease`] is the occupancy marker an [`EntryReader`] holds on its
//! [`ArchiveHandle`]. It is released exactly once: by `release`, by the
//! reader's `close`, or by `Drop` (which also covers unwinding).

use std::io;
use std::sync::Arc;

use super::handle::ArchiveHandle;
use crate::error::{Error, Result};
use crate::io::ReadAt;
use crate::storage::FileInfo;
use crate::zip::EntryStream;

/// Occupancy held on an archive handle.
pub struct Lease {
    handle: Option<Arc<ArchiveHandle>>,
}

impl Lease {
    pub(crate) fn new(handle: Arc<ArchiveHandle>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Give the occupancy back. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.release();
        }
    }

    pub fn is_held(&self) -> bool {
        self.handle.is_some()
    }

    /// The archive this lease is held on, while held.
    pub fn archive(&self) -> Option<&str> {
        self.handle.as_deref().map(ArchiveHandle::path)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Read handle for one archive entry.
///
/// Closing (or dropping) the reader first drops the decompression stream,
/// then releases the lease.
pub struct EntryReader {
    path: String,
    info: FileInfo,
    stream: Option<EntryStream<dyn ReadAt>>,
    lease: Lease,
}

impl EntryReader {
    pub(crate) fn new(
        path: String,
        info: FileInfo,
        stream: EntryStream<dyn ReadAt>,
        lease: Lease,
    ) -> Self {
        Self {
            path,
            info,
            stream: Some(stream),
            lease,
        }
    }

    /// Full overlay path of the entry.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    /// Read decompressed bytes. Returns 0 at end of entry and after close.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };
        stream.read(buf).await.map_err(|e| map_read_error(&self.path, e))
    }

    /// Read the remainder of the entry into `out`.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };
        stream
            .read_to_end(out)
            .await
            .map_err(|e| map_read_error(&self.path, e))
    }

    /// Close the stream and release the archive. Idempotent.
    pub fn close(&mut self) {
        self.stream = None;
        self.lease.release();
    }

    pub fn is_closed(&self) -> bool {
        !self.lease.is_held()
    }
}

impl std::fmt::Debug for EntryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("path", &self.path)
            .field("size", &self.info.size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for EntryReader {
    fn drop(&mut self) {
        self.close();
    }
}

fn map_read_error(path: &str, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::InvalidData {
        Error::ArchiveFormat {
            path: path.to_string(),
            reason: err.to_string(),
        }
    } else {
        Error::Io {
            path: path.to_string(),
            source: err,
        }
    }
}
