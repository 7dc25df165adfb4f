use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{BaseStorage, FileInfo};
use crate::io::{MemoryReader, ReadAt};
use crate::path::{file_name, normalize};

/// A simple map-based storage held entirely in memory.
///
/// Directories are implied by file paths; empty directories can be added
/// with [`MemoryStorage::insert_dir`].
///
/// # Example
///
/// ```
/// use zipfolder::storage::MemoryStorage;
///
/// let storage = MemoryStorage::new();
/// storage.insert("docs/readme.txt", b"hello".to_vec());
/// assert!(storage.contains("docs/readme.txt"));
/// ```
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, MemoryReader>>,
    dirs: RwLock<BTreeSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a file. Invalid paths are ignored.
    pub fn insert(&self, path: &str, content: impl Into<Arc<[u8]>>) {
        if let Ok(path) = normalize(path)
            && !path.is_empty()
        {
            self.files.write().insert(path, MemoryReader::new(content));
        }
    }

    /// Insert an empty directory.
    pub fn insert_dir(&self, path: &str) {
        if let Ok(path) = normalize(path)
            && !path.is_empty()
        {
            self.dirs.write().insert(path);
        }
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files.write().remove(path).is_some()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() || self.dirs.read().contains(path) {
            return true;
        }
        let prefix = format!("{path}/");
        let has_child = |key: &String| key.starts_with(&prefix);
        self.files.read().keys().any(has_child) || self.dirs.read().iter().any(has_child)
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{path}: not found"))
}

#[async_trait]
impl BaseStorage for MemoryStorage {
    async fn open(&self, path: &str) -> io::Result<Arc<dyn ReadAt>> {
        if let Some(reader) = self.files.read().get(path) {
            return Ok(Arc::new(reader.clone()));
        }
        if self.is_dir(path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{path}: is a directory"),
            ));
        }
        Err(not_found(path))
    }

    async fn stat(&self, path: &str) -> io::Result<FileInfo> {
        if let Some(reader) = self.files.read().get(path) {
            return Ok(FileInfo::file(file_name(path), reader.size()));
        }
        if self.is_dir(path) {
            return Ok(FileInfo::dir(file_name(path)));
        }
        Err(not_found(path))
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<FileInfo>> {
        if self.files.read().contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{path}: not a directory"),
            ));
        }
        if !self.is_dir(path) {
            return Err(not_found(path));
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut children: BTreeMap<String, FileInfo> = BTreeMap::new();
        for (key, reader) in self.files.read().iter() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    children
                        .entry(dir.to_string())
                        .or_insert_with(|| FileInfo::dir(dir));
                }
                None => {
                    children.insert(rest.to_string(), FileInfo::file(rest, reader.size()));
                }
            }
        }
        for key in self.dirs.read().iter() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                let dir = rest.split_once('/').map_or(rest, |(dir, _)| dir);
                children
                    .entry(dir.to_string())
                    .or_insert_with(|| FileInfo::dir(dir));
            }
        }
        Ok(children.into_values().collect())
    }
}
