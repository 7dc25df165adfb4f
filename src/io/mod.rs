mod local;
mod memory;

pub use local::LocalFileReader;
pub use memory::MemoryReader;

use async_trait::async_trait;
use std::io;

/// Upper bound on buffer space reserved from a size an archive declares.
const MAX_PREALLOC: u64 = 64 * 1024;

/// Initial capacity for reading `declared` bytes. Archive headers are not
/// trusted, so the buffer grows as data actually arrives.
pub(crate) fn prealloc_len(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    ///
    /// Returns the number of bytes read, which is only short at end of data.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] when the source ends first,
    /// which is how truncated archives surface.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "short read at offset {}: wanted {} bytes, got {}",
                        offset,
                        buf.len(),
                        filled
                    ),
                ));
            }
            filled += n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prealloc_is_capped() {
        assert_eq!(prealloc_len(10), 10);
        assert_eq!(prealloc_len(1 << 62), MAX_PREALLOC as usize);
    }
}
