use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use super::{BaseStorage, FileInfo, FileKind, FileWriter, WritableStorage};
use crate::io::{LocalFileReader, ReadAt};

/// Storage rooted at a directory of the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }
}

fn info_from_metadata(name: String, meta: &std::fs::Metadata) -> FileInfo {
    let kind = if meta.is_dir() {
        FileKind::Dir
    } else {
        FileKind::File
    };
    FileInfo {
        name,
        kind,
        size: if kind == FileKind::Dir { 0 } else { meta.len() },
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
    }
}

#[async_trait]
impl BaseStorage for LocalStorage {
    async fn open(&self, path: &str) -> io::Result<Arc<dyn ReadAt>> {
        let full = self.full_path(path);
        let file = fs::File::open(&full).await?.into_std().await;
        if file.metadata()?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", full.display()),
            ));
        }
        Ok(Arc::new(LocalFileReader::from_file(file)?))
    }

    async fn stat(&self, path: &str) -> io::Result<FileInfo> {
        let meta = fs::metadata(self.full_path(path)).await?;
        Ok(info_from_metadata(crate::path::file_name(path).to_string(), &meta))
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<FileInfo>> {
        let mut dir = fs::read_dir(self.full_path(path)).await?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            // Follows symlinks, like stat. A dangling link is listed as itself.
            let meta = match fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => entry.metadata().await?,
                Err(e) => return Err(e),
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(info_from_metadata(name, &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[async_trait]
impl WritableStorage for LocalStorage {
    async fn create(&self, path: &str) -> io::Result<FileWriter> {
        let file = fs::File::create(self.full_path(path)).await?;
        Ok(Box::new(file))
    }

    async fn make_dir(&self, path: &str) -> io::Result<()> {
        fs::create_dir(self.full_path(path)).await
    }
}
