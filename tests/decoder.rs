mod common;

use std::sync::Arc;

use common::{METHOD_DEFLATE, ZipBuilder, crc32, noise};
use zipfolder::{ArchiveHandle, Error, MemoryReader, ReadAt};

async fn load(bytes: Vec<u8>) -> zipfolder::Result<Arc<ArchiveHandle>> {
    let source: Arc<dyn ReadAt> = Arc::new(MemoryReader::new(bytes));
    ArchiveHandle::load("test.zip", source, false).await.map(Arc::new)
}

async fn read_entry(handle: &Arc<ArchiveHandle>, name: &str) -> zipfolder::Result<Vec<u8>> {
    let mut reader = handle.open(name).await?;
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await?;
    Ok(data)
}

#[tokio::test]
async fn test_archive_with_comment() {
    let bytes = ZipBuilder::new()
        .stored("a.txt", b"commented")
        .comment("built by the test suite, PK\x05\x06 inside the comment")
        .finish();
    let handle = load(bytes).await.unwrap();

    assert_eq!(handle.index().len(), 1);
    assert_eq!(read_entry(&handle, "a.txt").await.unwrap(), b"commented");
}

#[tokio::test]
async fn test_deflate_across_chunks() {
    let big = noise(200_000, 11);
    let repetitive = "abcdefgh".repeat(20_000).into_bytes();
    let bytes = ZipBuilder::new()
        .deflated("noise.bin", &big)
        .deflated("text.txt", &repetitive)
        .finish();
    let handle = load(bytes).await.unwrap();

    assert_eq!(read_entry(&handle, "noise.bin").await.unwrap(), big);
    assert_eq!(read_entry(&handle, "text.txt").await.unwrap(), repetitive);
    assert!(!handle.is_occupied());
}

#[tokio::test]
async fn test_crc_mismatch_is_format_error() {
    let content = b"payload with a wrong checksum";
    let bytes = ZipBuilder::new()
        .raw("bad.txt", 0, crc32(content) ^ 1, content.to_vec(), content.len() as u32)
        .finish();
    let handle = load(bytes).await.unwrap();

    let err = read_entry(&handle, "bad.txt").await.unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { .. }), "{err:?}");
    assert_eq!(err.path(), "test.zip/bad.txt");
    // The failed read still released its lease.
    assert!(!handle.is_occupied());

    // Reading on after the failure keeps reporting it rather than EOF.
    let mut reader = handle.open("bad.txt").await.unwrap();
    let mut data = Vec::new();
    assert!(reader.read_to_end(&mut data).await.is_err());
    let mut buf = [0u8; 16];
    let again = reader.read(&mut buf).await.unwrap_err();
    assert!(matches!(again, Error::ArchiveFormat { .. }), "{again:?}");
    assert!(matches!(
        reader.read_to_end(&mut data).await,
        Err(Error::ArchiveFormat { .. })
    ));
    reader.close();
    assert!(!handle.is_occupied());
}

#[tokio::test]
async fn test_length_mismatch_is_format_error() {
    let content = b"short";
    let bytes = ZipBuilder::new()
        .raw("short.txt", METHOD_DEFLATE, crc32(content), deflate(content), 99)
        .finish();
    let handle = load(bytes).await.unwrap();

    let err = read_entry(&handle, "short.txt").await.unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { .. }), "{err:?}");
}

#[tokio::test]
async fn test_entry_longer_than_declared_fails_early() {
    let content = noise(100_000, 5);
    let bytes = ZipBuilder::new()
        .raw("long.bin", 0, crc32(&content), content.clone(), 10)
        .finish();
    let handle = load(bytes).await.unwrap();

    let mut reader = handle.open("long.bin").await.unwrap();
    let mut buf = vec![0u8; 64];
    let err = reader.read(&mut buf).await.unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { .. }), "{err:?}");
}

#[tokio::test]
async fn test_zip64_size_overflow_is_format_error() {
    let bytes = ZipBuilder::new()
        .zip64("x.bin", b"data", 4, u64::MAX)
        .stored("fine.txt", b"fine")
        .finish();
    let handle = load(bytes).await.unwrap();

    let err = handle.open("x.bin").await.unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { .. }), "{err:?}");
    assert!(!handle.is_occupied());
    assert_eq!(read_entry(&handle, "fine.txt").await.unwrap(), b"fine");
}

#[tokio::test]
async fn test_inflated_declared_size_is_format_error() {
    let bytes = ZipBuilder::new()
        .zip64("big.bin", b"tiny", 1 << 62, 4)
        .finish();
    let handle = load(bytes).await.unwrap();

    assert_eq!(handle.stat("big.bin").unwrap().size, 1 << 62);
    let err = read_entry(&handle, "big.bin").await.unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { .. }), "{err:?}");
}

#[tokio::test]
async fn test_unsupported_method_fails_at_open() {
    let bytes = ZipBuilder::new()
        .raw("lzma.bin", 14, 0, vec![1, 2, 3], 3)
        .stored("fine.txt", b"fine")
        .finish();
    let handle = load(bytes).await.unwrap();

    let err = handle.open("lzma.bin").await.unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { .. }), "{err:?}");
    assert!(!handle.is_occupied());
    assert_eq!(read_entry(&handle, "fine.txt").await.unwrap(), b"fine");
}

#[tokio::test]
async fn test_garbage_and_truncated_archives() {
    let err = load(b"not a zip at all, just some text".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { .. }), "{err:?}");

    let mut bytes = ZipBuilder::new().stored("a.txt", b"aaaa").finish();
    bytes.drain(..10);
    let err = load(bytes).await.unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { .. }), "{err:?}");

    let err = load(Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::ArchiveFormat { .. }), "{err:?}");
}

#[tokio::test]
async fn test_empty_archive() {
    let handle = load(ZipBuilder::new().finish()).await.unwrap();
    assert!(handle.index().is_empty());
    assert!(handle.read_dir("").unwrap().is_empty());
    assert!(handle.stat("").unwrap().is_dir());
}

#[tokio::test]
async fn test_reader_close_is_idempotent() {
    let bytes = ZipBuilder::new().stored("a.txt", b"abc").finish();
    let handle = load(bytes).await.unwrap();

    let mut reader = handle.open("a.txt").await.unwrap();
    assert!(handle.is_occupied());
    reader.close();
    reader.close();
    assert!(reader.is_closed());
    assert!(!handle.is_occupied());

    let mut buf = [0u8; 3];
    assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn test_names_are_normalized_for_lookup() {
    let bytes = ZipBuilder::new()
        .stored("./dot/a.txt", b"dot")
        .stored("/abs/b.txt", b"abs")
        .finish();
    let handle = load(bytes).await.unwrap();

    assert_eq!(read_entry(&handle, "dot/a.txt").await.unwrap(), b"dot");
    assert_eq!(read_entry(&handle, "abs/b.txt").await.unwrap(), b"abs");
    let root: Vec<String> = handle
        .read_dir("")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(root, vec!["abs", "dot"]);
}

fn deflate(data: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
