use std::sync::Arc;

use crate::archive::EntryReader;
use crate::error::{Error, Result};
use crate::io::ReadAt;
use crate::storage::FileInfo;

const READ_CHUNK: usize = 64 * 1024;

enum Body {
    Plain {
        source: Option<Arc<dyn ReadAt>>,
        pos: u64,
    },
    Entry(EntryReader),
}

/// A file opened through [`OverlayFs`](super::OverlayFs).
///
/// Either a plain file of the base storage or an entry inside an archive.
/// Entry files keep their archive open until closed or dropped.
pub struct OverlayFile {
    path: String,
    info: FileInfo,
    body: Body,
}

impl OverlayFile {
    pub(crate) fn plain(path: String, info: FileInfo, source: Arc<dyn ReadAt>) -> Self {
        Self {
            path,
            info,
            body: Body::Plain {
                source: Some(source),
                pos: 0,
            },
        }
    }

    pub(crate) fn entry(reader: EntryReader) -> Self {
        Self {
            path: reader.path().to_string(),
            info: reader.info().clone(),
            body: Body::Entry(reader),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn is_archive_entry(&self) -> bool {
        matches!(self.body, Body::Entry(_))
    }

    /// Read the next bytes into `buf`. Returns 0 at end of file and after
    /// close.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.body {
            Body::Plain { source, pos } => {
                let Some(source) = source else {
                    return Ok(0);
                };
                let n = source
                    .read_at(*pos, buf)
                    .await
                    .map_err(|e| Error::from_io(&self.path, e))?;
                *pos += n as u64;
                Ok(n)
            }
            Body::Entry(reader) => reader.read(buf).await,
        }
    }

    /// Read everything that is left into `out`, returning the byte count.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        if let Body::Entry(reader) = &mut self.body {
            return reader.read_to_end(out).await;
        }

        let mut chunk = vec![0u8; READ_CHUNK];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }

    /// Release the file. For archive entries this releases the archive.
    /// Idempotent.
    pub fn close(&mut self) {
        match &mut self.body {
            Body::Plain { source, .. } => *source = None,
            Body::Entry(reader) => reader.close(),
        }
    }
}

impl std::fmt::Debug for OverlayFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayFile")
            .field("path", &self.path)
            .field("size", &self.info.size)
            .field("archive_entry", &self.is_archive_entry())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;

    #[tokio::test]
    async fn test_plain_file_reads_sequentially() {
        let source: Arc<dyn ReadAt> = Arc::new(MemoryReader::new(b"hello world".to_vec()));
        let mut file = OverlayFile::plain("a.txt".into(), FileInfo::file("a.txt", 11), source);

        let mut buf = [0u8; 5];
        assert_eq!(file.read(&mut buf).await.unwrap(), 5);
        assert_eq!(&buf, b"hello");

        let mut rest = Vec::new();
        assert_eq!(file.read_to_end(&mut rest).await.unwrap(), 6);
        assert_eq!(rest, b" world");
        assert!(!file.is_archive_entry());
    }

    #[tokio::test]
    async fn test_read_after_close_is_eof() {
        let source: Arc<dyn ReadAt> = Arc::new(MemoryReader::new(b"data".to_vec()));
        let mut file = OverlayFile::plain("a.txt".into(), FileInfo::file("a.txt", 4), source);
        file.close();
        file.close();

        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).await.unwrap(), 0);
    }
}
