//! Shared fixtures: an in-memory ZIP writer and an instrumented storage.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use parking_lot::Mutex;

use zipfolder::{BaseStorage, FileInfo, MemoryStorage, ReadAt};

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;

/// 2024-03-15
pub const DOS_DATE: u16 = ((2024 - 1980) << 9) | (3 << 5) | 15;
/// 12:30:00
pub const DOS_TIME: u16 = (12 << 11) | (30 << 5);

/// Builds ZIP archives in memory.
#[derive(Default)]
pub struct ZipBuilder {
    data: Vec<u8>,
    central: Vec<u8>,
    count: u16,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(self, name: &str, content: &[u8]) -> Self {
        let crc = crc32(content);
        self.raw(name, METHOD_STORED, crc, content.to_vec(), content.len() as u32)
    }

    pub fn deflated(self, name: &str, content: &[u8]) -> Self {
        let crc = crc32(content);
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        let compressed = encoder.finish().unwrap();
        self.raw(name, METHOD_DEFLATE, crc, compressed, content.len() as u32)
    }

    /// A directory record; `name` should end with `/`.
    pub fn dir(self, name: &str) -> Self {
        self.raw(name, METHOD_STORED, 0, Vec::new(), 0)
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = comment.as_bytes().to_vec();
        self
    }

    /// Append an entry with caller-controlled header fields.
    pub fn raw(
        self,
        name: &str,
        method: u16,
        crc: u32,
        payload: Vec<u8>,
        uncompressed_size: u32,
    ) -> Self {
        let compressed_size = payload.len() as u32;
        self.push(name, method, crc, payload, (compressed_size, uncompressed_size), &[])
    }

    /// Append a STORED entry whose central directory sizes live in a ZIP64
    /// extra field, so they can claim anything.
    pub fn zip64(
        self,
        name: &str,
        payload: &[u8],
        uncompressed_size: u64,
        compressed_size: u64,
    ) -> Self {
        let mut extra = Vec::new();
        extra.write_u16::<LittleEndian>(0x0001).unwrap();
        extra.write_u16::<LittleEndian>(16).unwrap();
        extra.write_u64::<LittleEndian>(uncompressed_size).unwrap();
        extra.write_u64::<LittleEndian>(compressed_size).unwrap();
        let crc = crc32(payload);
        self.push(
            name,
            METHOD_STORED,
            crc,
            payload.to_vec(),
            (u32::MAX, u32::MAX),
            &extra,
        )
    }

    fn push(
        mut self,
        name: &str,
        method: u16,
        crc: u32,
        payload: Vec<u8>,
        (compressed_size, uncompressed_size): (u32, u32),
        central_extra: &[u8],
    ) -> Self {
        let offset = self.data.len() as u32;
        let name_bytes = name.as_bytes();

        let lfh = &mut self.data;
        lfh.extend_from_slice(&[0x50, 0x4b, 0x03, 0x04]);
        lfh.write_u16::<LittleEndian>(20).unwrap();
        lfh.write_u16::<LittleEndian>(0).unwrap();
        lfh.write_u16::<LittleEndian>(method).unwrap();
        lfh.write_u16::<LittleEndian>(DOS_TIME).unwrap();
        lfh.write_u16::<LittleEndian>(DOS_DATE).unwrap();
        lfh.write_u32::<LittleEndian>(crc).unwrap();
        lfh.write_u32::<LittleEndian>(compressed_size).unwrap();
        lfh.write_u32::<LittleEndian>(uncompressed_size).unwrap();
        lfh.write_u16::<LittleEndian>(name_bytes.len() as u16).unwrap();
        lfh.write_u16::<LittleEndian>(0).unwrap();
        lfh.extend_from_slice(name_bytes);
        lfh.extend_from_slice(&payload);

        let cd = &mut self.central;
        cd.extend_from_slice(&[0x50, 0x4b, 0x01, 0x02]);
        cd.write_u16::<LittleEndian>(45).unwrap();
        cd.write_u16::<LittleEndian>(20).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(method).unwrap();
        cd.write_u16::<LittleEndian>(DOS_TIME).unwrap();
        cd.write_u16::<LittleEndian>(DOS_DATE).unwrap();
        cd.write_u32::<LittleEndian>(crc).unwrap();
        cd.write_u32::<LittleEndian>(compressed_size).unwrap();
        cd.write_u32::<LittleEndian>(uncompressed_size).unwrap();
        cd.write_u16::<LittleEndian>(name_bytes.len() as u16).unwrap();
        cd.write_u16::<LittleEndian>(central_extra.len() as u16).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        let external = if name.ends_with('/') { 0x10 } else { 0 };
        cd.write_u32::<LittleEndian>(external).unwrap();
        cd.write_u32::<LittleEndian>(offset).unwrap();
        cd.extend_from_slice(name_bytes);
        cd.extend_from_slice(central_extra);

        self.count += 1;
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = self.data;
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&self.central);

        out.extend_from_slice(&[0x50, 0x4b, 0x05, 0x06]);
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u32::<LittleEndian>(self.central.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(self.comment.len() as u16).unwrap();
        out.extend_from_slice(&self.comment);
        out
    }
}

pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

/// Deterministic, poorly compressible filler.
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

/// Memory storage that counts opens and tracks sources still alive.
pub struct CountingStorage {
    inner: MemoryStorage,
    opens: AtomicUsize,
    per_path: Mutex<HashMap<String, usize>>,
    live: Arc<AtomicUsize>,
    open_delay: Option<Duration>,
}

impl CountingStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self {
            inner,
            opens: AtomicUsize::new(0),
            per_path: Mutex::new(HashMap::new()),
            live: Arc::new(AtomicUsize::new(0)),
            open_delay: None,
        }
    }

    /// Sleep inside every `open`, widening race windows.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn memory(&self) -> &MemoryStorage {
        &self.inner
    }

    /// Total `open` calls.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn opens_of(&self, path: &str) -> usize {
        self.per_path.lock().get(path).copied().unwrap_or(0)
    }

    /// Sources returned by `open` that have not been dropped yet.
    pub fn live_sources(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaseStorage for CountingStorage {
    async fn open(&self, path: &str) -> io::Result<Arc<dyn ReadAt>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.per_path.lock().entry(path.to_string()).or_default() += 1;
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        let source = self.inner.open(path).await?;
        Ok(Arc::new(TrackedReader::new(source, Arc::clone(&self.live))))
    }

    async fn stat(&self, path: &str) -> io::Result<FileInfo> {
        self.inner.stat(path).await
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<FileInfo>> {
        self.inner.read_dir(path).await
    }
}

struct TrackedReader {
    inner: Arc<dyn ReadAt>,
    live: Arc<AtomicUsize>,
}

impl TrackedReader {
    fn new(inner: Arc<dyn ReadAt>, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { inner, live }
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReadAt for TrackedReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read_at(offset, buf).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }
}

/// Two small archives plus a plain file.
pub fn sample_storage() -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.insert("docs/report.pdf", b"%PDF-1.4 fake".to_vec());
    storage.insert(
        "docs/bundle.zip",
        ZipBuilder::new()
            .stored("readme.txt", b"hello from the bundle")
            .deflated("data/big.bin", &noise(100_000, 7))
            .deflated("data/text.txt", "lorem ipsum ".repeat(500).as_bytes())
            .dir("empty/")
            .finish(),
    );
    storage.insert(
        "other.zip",
        ZipBuilder::new().stored("x.txt", b"xx").finish(),
    );
    storage
}
