//! Sequential decompressing reader for a single archive entry.
//!
//! Compressed bytes are pulled from the [`ReadAt`] source in bounded chunks
//! and inflated incrementally, so an entry is never held in memory whole.
//! At end of stream the produced length and CRC-32 are checked against the
//! central directory.

use std::io;
use std::sync::Arc;

use flate2::{Crc, Decompress, FlushDecompress, Status};

use super::structures::{CompressionMethod, ZipEntry};
use crate::io::ReadAt;

/// Compressed bytes fetched per source read.
const CHUNK_SIZE: usize = 32 * 1024;

enum Decoder {
    Stored,
    Deflate {
        inflater: Box<Decompress>,
        input: Vec<u8>,
        input_pos: usize,
        ended: bool,
    },
}

/// Read cursor over one entry's uncompressed bytes.
pub struct EntryStream<R: ReadAt + ?Sized> {
    source: Arc<R>,
    name: String,
    /// Next compressed byte to fetch.
    offset: u64,
    /// Compressed bytes not fetched yet.
    remaining: u64,
    decoder: Decoder,
    crc: Crc,
    produced: u64,
    expected_size: u64,
    expected_crc: u32,
    finished: bool,
    /// Set when the finished entry failed its length or checksum check.
    corrupt: Option<String>,
}

impl<R: ReadAt + ?Sized> EntryStream<R> {
    /// Create a stream for `entry` whose compressed data starts at `data_offset`.
    ///
    /// Fails with `InvalidData` for compression methods other than STORED
    /// and DEFLATE, and for encrypted entries.
    pub fn new(source: Arc<R>, entry: &ZipEntry, data_offset: u64) -> io::Result<Self> {
        if entry.is_encrypted() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("'{}' is encrypted", entry.name),
            ));
        }
        let decoder = match entry.compression_method {
            CompressionMethod::Stored => Decoder::Stored,
            CompressionMethod::Deflate => Decoder::Deflate {
                // Raw deflate: ZIP entries carry no zlib header.
                inflater: Box::new(Decompress::new(false)),
                input: Vec::new(),
                input_pos: 0,
                ended: false,
            },
            CompressionMethod::Unknown(method) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "'{}' uses unsupported compression method {}",
                        entry.name, method
                    ),
                ));
            }
        };

        Ok(Self {
            source,
            name: entry.name.clone(),
            offset: data_offset,
            remaining: entry.compressed_size,
            decoder,
            crc: Crc::new(),
            produced: 0,
            expected_size: entry.uncompressed_size,
            expected_crc: entry.crc32,
            finished: false,
            corrupt: None,
        })
    }

    /// Read uncompressed bytes into `buf`. Returns 0 at end of entry.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(reason) = &self.corrupt {
            return Err(io::Error::new(io::ErrorKind::InvalidData, reason.clone()));
        }
        if self.finished || buf.is_empty() {
            return Ok(0);
        }

        let n = match &mut self.decoder {
            Decoder::Stored => {
                let want = (buf.len() as u64).min(self.remaining) as usize;
                if want == 0 {
                    0
                } else {
                    self.source
                        .read_exact_at(self.offset, &mut buf[..want])
                        .await?;
                    self.offset += want as u64;
                    self.remaining -= want as u64;
                    want
                }
            }
            Decoder::Deflate {
                inflater,
                input,
                input_pos,
                ended,
            } => loop {
                if *ended {
                    break 0;
                }
                if *input_pos == input.len() && self.remaining > 0 {
                    let len = (CHUNK_SIZE as u64).min(self.remaining) as usize;
                    input.resize(len, 0);
                    self.source.read_exact_at(self.offset, input).await?;
                    self.offset += len as u64;
                    self.remaining -= len as u64;
                    *input_pos = 0;
                }

                let before_in = inflater.total_in();
                let before_out = inflater.total_out();
                let status = inflater
                    .decompress(&input[*input_pos..], buf, FlushDecompress::None)
                    .map_err(|e| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("corrupt deflate data in '{}': {}", self.name, e),
                        )
                    })?;
                *input_pos += (inflater.total_in() - before_in) as usize;
                let produced = (inflater.total_out() - before_out) as usize;

                if status == Status::StreamEnd {
                    *ended = true;
                }
                if produced > 0 {
                    break produced;
                }
                if *ended {
                    break 0;
                }
                if *input_pos == input.len() && self.remaining == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("deflate stream of '{}' ends early", self.name),
                    ));
                }
            },
        };

        if n == 0 {
            self.finish()?;
        } else {
            self.crc.update(&buf[..n]);
            self.produced += n as u64;
            if self.produced > self.expected_size {
                // Already longer than declared; fails the length check.
                self.finish()?;
            }
        }
        Ok(n)
    }

    /// Read the rest of the entry into `out`, returning the byte count.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> io::Result<usize> {
        let start = out.len();
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out.len() - start);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Check length and checksum. A failed check sticks, so later reads
    /// report it again instead of a clean end.
    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;
        let reason = if self.produced != self.expected_size {
            format!(
                "'{}' decoded to {} bytes, expected {}",
                self.name, self.produced, self.expected_size
            )
        } else if self.crc.sum() != self.expected_crc {
            format!("checksum mismatch in '{}'", self.name)
        } else {
            return Ok(());
        };
        self.corrupt = Some(reason.clone());
        Err(io::Error::new(io::ErrorKind::InvalidData, reason))
    }
}
