//! Recursive directory tree scanning
//!
//! Produces the entry listing used both to build snapshots and as the raw
//! change source for the brute-force poll backend. Symlinks are recorded as
//! themselves and never traversed (lstat semantics), so link cycles cannot
//! occur. Paths that disappear mid-walk are skipped silently; a scan races
//! with concurrent mutation by design.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::trace;
use walkdir::WalkDir;

/// One filesystem entry observed by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Absolute path; the identity key of the entry
    pub path: PathBuf,
    /// Modification time in milliseconds since the Unix epoch
    pub mtime_ms: u64,
    /// Whether the entry is a directory (symlinks are not)
    pub is_dir: bool,
    /// Platform inode, where available
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ino: Option<u64>,
    /// Platform file id, where available
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_id: Option<String>,
}

impl Entry {
    /// Build an entry from a path and its (l)stat metadata
    pub fn from_metadata(path: PathBuf, metadata: &std::fs::Metadata) -> Self {
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            path,
            mtime_ms,
            is_dir: metadata.is_dir(),
            ino: inode_of(metadata),
            file_id: None,
        }
    }

    /// Stat a path without following symlinks; None if it vanished
    pub fn lstat(path: &Path) -> Option<Self> {
        let metadata = std::fs::symlink_metadata(path).ok()?;
        Some(Self::from_metadata(path.to_path_buf(), &metadata))
    }
}

#[cfg(unix)]
fn inode_of(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn inode_of(_metadata: &std::fs::Metadata) -> Option<u64> {
    None
}

/// Recursively list a directory tree.
///
/// The root itself is never included. Each call performs a fresh walk,
/// sorted by file name per directory so repeated scans of an unchanged tree
/// produce identical sequences.
pub fn scan(root: &Path) -> impl Iterator<Item = Entry> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|result| match result {
            Ok(entry) => {
                // With follow_links disabled this is symlink_metadata
                match entry.metadata() {
                    Ok(metadata) => {
                        Some(Entry::from_metadata(entry.into_path(), &metadata))
                    }
                    Err(e) => {
                        trace!(path = %entry.path().display(), error = %e, "entry vanished mid-walk");
                        None
                    }
                }
            }
            Err(e) => {
                trace!(error = %e, "unreadable entry skipped during scan");
                None
            }
        })
}

/// Verify that a watch root exists and is a directory.
///
/// Called by every public operation before any backend resource or snapshot
/// artifact is touched.
pub fn validate_root(root: &Path) -> Result<()> {
    match std::fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotADirectory(root.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::NotFound(root.to_path_buf()))
        }
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn scan_lists_files_and_directories() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        fs::write(root.join("a.txt"), b"a")?;
        fs::create_dir(root.join("sub"))?;
        fs::write(root.join("sub/b.txt"), b"b")?;

        let entries: Vec<Entry> = scan(root).collect();
        let paths: Vec<&Path> = entries.iter().map(|e| e.path.as_path()).collect();

        assert_eq!(entries.len(), 3);
        assert!(paths.contains(&root.join("a.txt").as_path()));
        assert!(paths.contains(&root.join("sub").as_path()));
        assert!(paths.contains(&root.join("sub/b.txt").as_path()));

        let sub = entries.iter().find(|e| e.path == root.join("sub")).unwrap();
        assert!(sub.is_dir);
        let file = entries.iter().find(|e| e.path == root.join("a.txt")).unwrap();
        assert!(!file.is_dir);
        assert!(file.mtime_ms > 0);
        Ok(())
    }

    #[test]
    fn scan_excludes_the_root_itself() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("f"), b"x")?;

        let entries: Vec<Entry> = scan(temp_dir.path()).collect();
        assert!(entries.iter().all(|e| e.path != temp_dir.path()));
        Ok(())
    }

    #[test]
    fn repeated_scans_are_identical() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::write(root.join("one"), b"1")?;
        fs::create_dir(root.join("two"))?;
        fs::write(root.join("two/three"), b"3")?;

        let first: Vec<Entry> = scan(root).collect();
        let second: Vec<Entry> = scan(root).collect();
        assert_eq!(first, second);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_recorded_but_not_traversed() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        fs::create_dir(root.join("target"))?;
        fs::write(root.join("target/inner.txt"), b"x")?;
        std::os::unix::fs::symlink(root.join("target"), root.join("link"))?;

        let entries: Vec<Entry> = scan(root).collect();
        let link = entries.iter().find(|e| e.path == root.join("link")).unwrap();
        assert!(!link.is_dir);

        // The link's children must not appear under the link path
        assert!(entries
            .iter()
            .all(|e| !e.path.starts_with(root.join("link/"))));
        Ok(())
    }

    #[test]
    fn mtime_is_captured_in_milliseconds() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let file = temp_dir.path().join("f");
        fs::write(&file, b"x")?;

        let mtime = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&file, mtime)?;

        let entries: Vec<Entry> = scan(temp_dir.path()).collect();
        assert_eq!(entries[0].mtime_ms, 1_600_000_000_000);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn entries_carry_inodes() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("f"), b"x")?;

        let entries: Vec<Entry> = scan(temp_dir.path()).collect();
        assert!(entries[0].ino.is_some());
        Ok(())
    }

    #[test]
    fn validate_root_error_taxonomy() -> Result<()> {
        let temp_dir = TempDir::new()?;

        assert!(validate_root(temp_dir.path()).is_ok());

        let missing = temp_dir.path().join("missing");
        assert!(matches!(
            validate_root(&missing),
            Err(Error::NotFound(p)) if p == missing
        ));

        let file = temp_dir.path().join("file");
        fs::write(&file, b"x")?;
        assert!(matches!(
            validate_root(&file),
            Err(Error::NotADirectory(p)) if p == file
        ));
        Ok(())
    }
}
