//! Table of contents of an opened archive.
//!
//! ZIP central directories are flat lists of full paths. The index keeps
//! the exact-name lookup table and, built once up front, the directory tree
//! implied by those paths:
//!
//! ```text
//! entries:  sub/a.txt, sub/deep/b.txt, top.txt
//! tree:     ""        -> [sub/, top.txt]
//!           "sub"     -> [a.txt, deep/]
//!           "sub/deep"-> [b.txt]
//! ```

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use super::structures::ZipEntry;
use crate::storage::FileInfo;

/// What an internal path names.
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    File(&'a ZipEntry),
    Dir,
    Missing,
}

/// Parsed, immutable table of contents.
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    entries: Vec<ZipEntry>,
    /// Lookup name -> position in `entries`.
    by_name: FxHashMap<String, usize>,
    /// Directory path -> children sorted by name.
    tree: FxHashMap<String, BTreeMap<String, FileInfo>>,
}

impl ArchiveIndex {
    pub fn new(entries: Vec<ZipEntry>) -> Self {
        let mut by_name = FxHashMap::default();
        let mut tree: FxHashMap<String, BTreeMap<String, FileInfo>> = FxHashMap::default();
        tree.insert(String::new(), BTreeMap::new());

        for (pos, entry) in entries.iter().enumerate() {
            let name = entry.lookup_name();
            if name.is_empty() {
                continue;
            }
            by_name.entry(name.to_string()).or_insert(pos);

            let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
            for (depth, segment) in segments.iter().enumerate() {
                let parent = segments[..depth].join("/");
                let is_leaf = depth + 1 == segments.len();
                let children = tree.entry(parent).or_default();

                if is_leaf && !entry.is_directory {
                    children
                        .entry(segment.to_string())
                        .or_insert_with(|| {
                            FileInfo::file(*segment, entry.uncompressed_size)
                                .with_modified(entry.modified())
                        });
                } else {
                    let modified = if is_leaf { entry.modified() } else { None };
                    // A directory shadows a file of the same name.
                    let slot = children
                        .entry(segment.to_string())
                        .or_insert_with(|| FileInfo::dir(*segment));
                    if !slot.is_dir() {
                        *slot = FileInfo::dir(*segment);
                    }
                    if modified.is_some() {
                        slot.modified = modified;
                    }
                    tree.entry(segments[..=depth].join("/")).or_default();
                }
            }
        }

        Self {
            entries,
            by_name,
            tree,
        }
    }

    /// Resolve an internal path by exact name.
    pub fn lookup(&self, path: &str) -> Lookup<'_> {
        if self.tree.contains_key(path) {
            return Lookup::Dir;
        }
        match self.by_name.get(path) {
            Some(&pos) => Lookup::File(&self.entries[pos]),
            None => Lookup::Missing,
        }
    }

    /// Immediate children of a directory, `None` when `path` is not one.
    pub fn children(&self, path: &str) -> Option<Vec<FileInfo>> {
        self.tree
            .get(path)
            .map(|children| children.values().cloned().collect())
    }

    /// Metadata for an internal path.
    pub fn stat(&self, path: &str) -> Option<FileInfo> {
        let name = crate::path::file_name(path);
        match self.lookup(path) {
            Lookup::File(entry) => {
                Some(FileInfo::file(name, entry.uncompressed_size).with_modified(entry.modified()))
            }
            Lookup::Dir => {
                let modified = self
                    .by_name
                    .get(path)
                    .and_then(|&pos| self.entries[pos].modified());
                Some(FileInfo::dir(name).with_modified(modified))
            }
            Lookup::Missing => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::CompressionMethod;

    fn entry(name: &str, size: u64) -> ZipEntry {
        ZipEntry {
            name: name.to_string(),
            flags: 0,
            compression_method: CompressionMethod::Stored,
            compressed_size: size,
            uncompressed_size: size,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: 0,
            last_mod_date: 0,
            is_directory: name.ends_with('/'),
        }
    }

    fn names(infos: Vec<FileInfo>) -> Vec<(String, bool)> {
        infos.into_iter().map(|i| (i.name.clone(), i.is_dir())).collect()
    }

    #[test]
    fn test_directories_inferred_from_prefixes() {
        let index = ArchiveIndex::new(vec![
            entry("top.txt", 3),
            entry("sub/deep/b.txt", 5),
            entry("sub/a.txt", 1),
        ]);

        assert_eq!(
            names(index.children("").unwrap()),
            vec![("sub".into(), true), ("top.txt".into(), false)]
        );
        assert_eq!(
            names(index.children("sub").unwrap()),
            vec![("a.txt".into(), false), ("deep".into(), true)]
        );
        assert!(matches!(index.lookup("sub/deep"), Lookup::Dir));
        assert!(matches!(index.lookup("sub/a.txt"), Lookup::File(e) if e.uncompressed_size == 1));
        assert!(matches!(index.lookup("sub/missing"), Lookup::Missing));
        assert!(index.children("top.txt").is_none());
    }

    #[test]
    fn test_explicit_directory_entries() {
        let index = ArchiveIndex::new(vec![entry("empty/", 0), entry("./dot/x.txt", 2)]);
        assert_eq!(
            names(index.children("").unwrap()),
            vec![("dot".into(), true), ("empty".into(), true)]
        );
        assert!(index.children("empty").unwrap().is_empty());
        assert_eq!(index.stat("dot/x.txt").unwrap().size, 2);
        assert!(index.stat("empty").unwrap().is_dir());
        assert!(index.stat("").unwrap().is_dir());
    }

    #[test]
    fn test_empty_archive_has_root() {
        let index = ArchiveIndex::new(Vec::new());
        assert!(index.is_empty());
        assert!(index.children("").unwrap().is_empty());
    }
}
