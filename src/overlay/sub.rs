use super::{OverlayFile, OverlayFs};
use crate::error::Result;
use crate::path::{join, normalize};
use crate::storage::{BaseStorage, FileInfo, FileWriter, WritableStorage};

/// An [`OverlayFs`] seen from one of its directories.
///
/// All paths are joined onto `dir` before being resolved, so `dir` may
/// itself lie inside an archive.
pub struct SubFs<S> {
    fs: OverlayFs<S>,
    dir: String,
}

impl<S> Clone for SubFs<S> {
    fn clone(&self) -> Self {
        Self {
            fs: self.fs.clone(),
            dir: self.dir.clone(),
        }
    }
}

impl<S: BaseStorage> SubFs<S> {
    pub(crate) fn new(fs: OverlayFs<S>, dir: &str) -> Result<Self> {
        Ok(Self {
            fs,
            dir: normalize(dir)?,
        })
    }

    /// Directory of the parent filesystem this view is rooted at.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn fs(&self) -> &OverlayFs<S> {
        &self.fs
    }

    pub async fn open(&self, path: &str) -> Result<OverlayFile> {
        self.fs.open(&join(&self.dir, path)?).await
    }

    pub async fn stat(&self, path: &str) -> Result<FileInfo> {
        self.fs.stat(&join(&self.dir, path)?).await
    }

    pub async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
        self.fs.read_dir(&join(&self.dir, path)?).await
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.fs.read_file(&join(&self.dir, path)?).await
    }

    pub fn sub(&self, dir: &str) -> Result<Self> {
        Ok(Self {
            fs: self.fs.clone(),
            dir: join(&self.dir, dir)?,
        })
    }
}

impl<S: WritableStorage> SubFs<S> {
    pub async fn create(&self, path: &str) -> Result<FileWriter> {
        self.fs.create(&join(&self.dir, path)?).await
    }

    pub async fn make_dir(&self, path: &str) -> Result<()> {
        self.fs.make_dir(&join(&self.dir, path)?).await
    }
}

impl<S> std::fmt::Debug for SubFs<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubFs").field("dir", &self.dir).finish()
    }
}
