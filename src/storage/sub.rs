use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use super::{BaseStorage, FileInfo, FileWriter, WritableStorage};
use crate::io::ReadAt;
use crate::path::{join, normalize};

/// A view of a storage rooted at one of its subdirectories.
#[derive(Debug, Clone)]
pub struct SubStorage<S> {
    inner: S,
    dir: String,
}

impl<S: BaseStorage> SubStorage<S> {
    pub fn new(inner: S, dir: &str) -> io::Result<Self> {
        let dir = normalize(dir).map_err(io::Error::from)?;
        Ok(Self { inner, dir })
    }

    /// Narrow the view further.
    pub fn sub(&self, dir: &str) -> io::Result<Self>
    where
        S: Clone,
    {
        Ok(Self {
            inner: self.inner.clone(),
            dir: self.full_path(dir)?,
        })
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    fn full_path(&self, path: &str) -> io::Result<String> {
        join(&self.dir, path).map_err(io::Error::from)
    }
}

#[async_trait]
impl<S: BaseStorage> BaseStorage for SubStorage<S> {
    async fn open(&self, path: &str) -> io::Result<Arc<dyn ReadAt>> {
        self.inner.open(&self.full_path(path)?).await
    }

    async fn stat(&self, path: &str) -> io::Result<FileInfo> {
        self.inner.stat(&self.full_path(path)?).await
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<FileInfo>> {
        self.inner.read_dir(&self.full_path(path)?).await
    }
}

#[async_trait]
impl<S: WritableStorage> WritableStorage for SubStorage<S> {
    async fn create(&self, path: &str) -> io::Result<FileWriter> {
        self.inner.create(&self.full_path(path)?).await
    }

    async fn make_dir(&self, path: &str) -> io::Result<()> {
        self.inner.make_dir(&self.full_path(path)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_prefixes_paths() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("root/docs/a.txt", b"aaa".to_vec());

        let sub = SubStorage::new(Arc::clone(&storage), "root").unwrap();
        assert_eq!(sub.stat("docs/a.txt").await.unwrap().size, 3);

        let docs = sub.sub("docs").unwrap();
        assert_eq!(docs.dir(), "root/docs");
        let names: Vec<_> = docs
            .read_dir("")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["a.txt"]);

        let err = docs.stat("../../outside").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
