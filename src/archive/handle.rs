//! One open archive: its table of contents plus the open source.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::reader::{EntryReader, Lease};
use crate::error::{Error, Result};
use crate::io::ReadAt;
use crate::storage::FileInfo;
use crate::zip::{ArchiveIndex, EntryStream, Lookup, ZipParser};

type IdleHook = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Default)]
struct Occupancy {
    leases: usize,
    closed: bool,
}

/// An opened archive.
///
/// Occupancy is tracked as a count of outstanding [`Lease`]s. A handle can
/// only be retired (marked closed) while that count is zero, and once
/// retired no new lease can be taken, so the source is never released
/// under an active reader.
///
/// By default several entries of the same archive can be read at once.
/// In exclusive mode `open` waits until the previous reader is closed.
pub struct ArchiveHandle {
    path: String,
    index: ArchiveIndex,
    source: Mutex<Option<Arc<dyn ReadAt>>>,
    occupancy: Mutex<Occupancy>,
    released: Notify,
    exclusive: bool,
    on_idle: OnceLock<IdleHook>,
}

impl ArchiveHandle {
    /// Parse the central directory of `source` and wrap it.
    pub async fn load(
        path: impl Into<String>,
        source: Arc<dyn ReadAt>,
        exclusive: bool,
    ) -> Result<Self> {
        let path = path.into();
        let entries = ZipParser::new(Arc::clone(&source))
            .list_entries()
            .await
            .map_err(|e| Error::from_decoder(path.as_str(), e))?;

        Ok(Self {
            index: ArchiveIndex::new(entries),
            path,
            source: Mutex::new(Some(source)),
            occupancy: Mutex::new(Occupancy::default()),
            released: Notify::new(),
            exclusive,
            on_idle: OnceLock::new(),
        })
    }

    /// Archive path this handle was opened for.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    /// Open the entry named exactly `internal` for reading.
    ///
    /// The returned reader holds a lease on this handle until it is closed
    /// or dropped. Every error path after the lease is taken drops it again.
    pub async fn open(self: &Arc<Self>, internal: &str) -> Result<EntryReader> {
        let lease = self.acquire().await?;
        let full_path = self.entry_path(internal);

        let entry = match self.index.lookup(internal) {
            Lookup::File(entry) => entry,
            Lookup::Dir => return Err(Error::is_a_directory(full_path)),
            Lookup::Missing => return Err(Error::not_found(full_path)),
        };
        let source = self
            .source
            .lock()
            .clone()
            .ok_or_else(|| Error::ArchiveClosed {
                path: self.path.clone(),
            })?;

        let offset = ZipParser::new(Arc::clone(&source))
            .data_offset(entry)
            .await
            .map_err(|e| Error::from_decoder(full_path.as_str(), e))?;
        let stream =
            EntryStream::new(source, entry, offset).map_err(|e| Error::ArchiveFormat {
                path: full_path.clone(),
                reason: e.to_string(),
            })?;

        let info = FileInfo::file(crate::path::file_name(internal), entry.uncompressed_size)
            .with_modified(entry.modified());
        Ok(EntryReader::new(full_path, info, stream, lease))
    }

    /// Immediate children of `internal` inside the archive.
    pub fn read_dir(&self, internal: &str) -> Result<Vec<FileInfo>> {
        match self.index.children(internal) {
            Some(children) => Ok(children),
            None => match self.index.lookup(internal) {
                Lookup::File(_) => Err(Error::not_a_directory(self.entry_path(internal))),
                _ => Err(Error::not_found(self.entry_path(internal))),
            },
        }
    }

    /// Metadata for `internal`; the empty path is the archive root.
    pub fn stat(&self, internal: &str) -> Result<FileInfo> {
        self.index
            .stat(internal)
            .ok_or_else(|| Error::not_found(self.entry_path(internal)))
    }

    /// Non-blocking probe: true while any reader holds a lease.
    ///
    /// A contended occupancy lock counts as occupied.
    pub fn is_occupied(&self) -> bool {
        match self.occupancy.try_lock() {
            Some(occupancy) => occupancy.leases > 0,
            None => true,
        }
    }

    /// True once the handle has been retired or closed.
    pub fn is_closed(&self) -> bool {
        self.occupancy.lock().closed
    }

    /// Release the underlying source.
    ///
    /// The cache calls this exactly once per handle, after retiring it.
    /// A second call fails with [`Error::ArchiveClosed`].
    pub fn close(&self) -> Result<()> {
        self.occupancy.lock().closed = true;
        self.released.notify_waiters();

        let source = self.source.lock().take();
        match source {
            Some(source) => {
                drop(source);
                debug!(archive = %self.path, "Archive handle closed");
                Ok(())
            }
            None => Err(Error::ArchiveClosed {
                path: self.path.clone(),
            }),
        }
    }

    /// Mark the handle closed if nobody holds a lease.
    pub(crate) fn try_retire(&self) -> bool {
        let retired = {
            let mut occupancy = self.occupancy.lock();
            if occupancy.closed || occupancy.leases > 0 {
                false
            } else {
                occupancy.closed = true;
                true
            }
        };
        if retired {
            self.released.notify_waiters();
        }
        retired
    }

    /// Mark the handle closed regardless of leases (shutdown only).
    pub(crate) fn force_retire(&self) {
        self.occupancy.lock().closed = true;
        self.released.notify_waiters();
    }

    /// Register a callback run whenever the last lease is released.
    pub(crate) fn set_idle_hook(&self, hook: IdleHook) {
        let _ = self.on_idle.set(hook);
    }

    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<Lease> {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();

            {
                let mut occupancy = self.occupancy.lock();
                if occupancy.closed {
                    return Err(Error::ArchiveClosed {
                        path: self.path.clone(),
                    });
                }
                if !self.exclusive || occupancy.leases == 0 {
                    occupancy.leases += 1;
                    return Ok(Lease::new(Arc::clone(self)));
                }
            }

            notified.await;
        }
    }

    pub(crate) fn release(&self) {
        let idle = {
            let mut occupancy = self.occupancy.lock();
            occupancy.leases = occupancy.leases.saturating_sub(1);
            occupancy.leases == 0 && !occupancy.closed
        };
        self.released.notify_waiters();
        if idle && let Some(hook) = self.on_idle.get() {
            hook();
        }
    }

    fn entry_path(&self, internal: &str) -> String {
        if internal.is_empty() {
            self.path.clone()
        } else {
            format!("{}/{}", self.path, internal)
        }
    }
}

impl std::fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("path", &self.path)
            .field("entries", &self.index.len())
            .field("occupancy", &*self.occupancy.lock())
            .field("exclusive", &self.exclusive)
            .finish()
    }
}
