//! ZIP archive decoding.
//!
//! This module turns a random-access source into a table of contents and
//! per-entry read streams. It knows nothing about caching or paths outside
//! the archive.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`index`]: Lookup table and inferred directory tree
//! - [`stream`]: Sequential decompressing reader for one entry
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is read first (from the end of the file), then the Central
//! Directory, so listing an archive never touches entry data.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED and DEFLATE compression methods, CRC-32 checked at end of entry
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod index;
mod parser;
mod stream;
mod structures;

pub use index::{ArchiveIndex, Lookup};
pub use parser::ZipParser;
pub use stream::EntryStream;
pub use structures::*;
