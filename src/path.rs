//! Path resolution: deciding where a path crosses into an archive.
//!
//! All paths handled by the overlay are relative, slash-separated and
//! normalized. The empty string names the root.
//!
//! ```text
//! docs/archive.zip/sub/file.txt
//! └──────┬───────┘ └────┬─────┘
//!    archive path   internal path
//! ```
//!
//! Segments are scanned from the last one backwards and the first segment
//! ending in `.zip` (any case) marks the archive boundary.

use crate::error::{Error, Result};

/// Extension (without the dot) recognized as a mountable archive.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A plain base-storage path.
    Plain(String),
    /// A path that crosses into an archive.
    Mounted {
        /// Path of the archive file, used as the cache key.
        archive: String,
        /// Path inside the archive; empty for the archive root.
        internal: String,
    },
}

/// Returns true when `name` ends in the archive extension, ignoring case.
pub fn is_archive_name(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

/// Normalize a path: backslashes become slashes, `.` and empty segments
/// vanish and `..` pops its parent.
///
/// Leading slashes are dropped, the result is always root-relative.
/// A `..` that would climb above the root is rejected.
pub fn normalize(path: &str) -> Result<String> {
    let path = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::invalid_path(path));
                }
            }
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

/// Split a path into its archive and internal parts.
pub fn resolve(path: &str) -> Result<Resolved> {
    let normalized = normalize(path)?;
    Ok(split_at_archive(&normalized).unwrap_or(Resolved::Plain(normalized)))
}

/// Locate the archive that contains `archive_path` itself, for archives
/// nested inside other archives.
///
/// Returns `(outer archive, path of the inner archive inside it)`.
pub fn enclosing_archive(archive_path: &str) -> Option<(String, String)> {
    let (parent, name) = archive_path.rsplit_once('/')?;
    match split_at_archive(parent)? {
        Resolved::Mounted { archive, internal } => {
            let inner = if internal.is_empty() {
                name.to_string()
            } else {
                format!("{internal}/{name}")
            };
            Some((archive, inner))
        }
        Resolved::Plain(_) => None,
    }
}

/// Join `rel` onto `base`. `rel` is normalized on its own first so it
/// cannot climb out of `base`.
pub fn join(base: &str, rel: &str) -> Result<String> {
    let rel = normalize(rel)?;
    Ok(match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel,
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{rel}"),
    })
}

/// Last segment of a normalized path (the path itself at top level).
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn split_at_archive(normalized: &str) -> Option<Resolved> {
    if normalized.is_empty() {
        return None;
    }
    let segments: Vec<&str> = normalized.split('/').collect();
    let boundary = segments.iter().rposition(|s| is_archive_name(s))?;
    Some(Resolved::Mounted {
        archive: segments[..=boundary].join("/"),
        internal: segments[boundary + 1..].join("/"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mounted(archive: &str, internal: &str) -> Resolved {
        Resolved::Mounted {
            archive: archive.to_string(),
            internal: internal.to_string(),
        }
    }

    #[test]
    fn test_plain_paths_are_unchanged() {
        for p in ["", "docs", "docs/report.pdf", "a/b/c.txt", "zip/notzip.zipx"] {
            assert_eq!(resolve(p).unwrap(), Resolved::Plain(p.to_string()), "{p}");
        }
    }

    #[test]
    fn test_archive_split() {
        assert_eq!(
            resolve("docs/archive.zip/sub/file.txt").unwrap(),
            mounted("docs/archive.zip", "sub/file.txt")
        );
        assert_eq!(resolve("archive.zip").unwrap(), mounted("archive.zip", ""));
        assert_eq!(resolve("A/Bundle.ZIP/x").unwrap(), mounted("A/Bundle.ZIP", "x"));
    }

    #[test]
    fn test_last_archive_segment_wins() {
        assert_eq!(
            resolve("outer.zip/inner.zip/file").unwrap(),
            mounted("outer.zip/inner.zip", "file")
        );
        assert_eq!(
            resolve("dir.zip/plain/a.zip").unwrap(),
            mounted("dir.zip/plain/a.zip", "")
        );
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize("./a//b/./c/../d/").unwrap(), "a/b/d");
        assert_eq!(normalize("\\x\\y.zip\\z").unwrap(), "x/y.zip/z");
        assert_eq!(normalize("/a").unwrap(), "a");
        assert_eq!(normalize(".").unwrap(), "");
        assert!(matches!(normalize("../etc"), Err(Error::InvalidPath { .. })));
        assert_eq!(
            resolve("a.zip/../b/c.zip/./d").unwrap(),
            mounted("b/c.zip", "d")
        );
    }

    #[test]
    fn test_is_archive_name() {
        assert!(is_archive_name("a.zip"));
        assert!(is_archive_name("A.Zip"));
        assert!(is_archive_name(".zip"));
        assert!(!is_archive_name("zip"));
        assert!(!is_archive_name("a.zip.txt"));
    }

    #[test]
    fn test_enclosing_archive() {
        assert_eq!(
            enclosing_archive("outer.zip/inner.zip"),
            Some(("outer.zip".to_string(), "inner.zip".to_string()))
        );
        assert_eq!(
            enclosing_archive("d/outer.zip/x/inner.zip"),
            Some(("d/outer.zip".to_string(), "x/inner.zip".to_string()))
        );
        assert_eq!(enclosing_archive("d/plain.zip"), None);
        assert_eq!(enclosing_archive("plain.zip"), None);
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "a").unwrap(), "a");
        assert_eq!(join("base", "").unwrap(), "base");
        assert_eq!(join("base", "./x/../y").unwrap(), "base/y");
        assert!(join("base", "../escape").is_err());
        assert_eq!(file_name("a/b/c.zip"), "c.zip");
        assert_eq!(file_name("top"), "top");
    }
}
