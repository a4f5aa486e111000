//! Snapshot persistence
//!
//! A snapshot is the serialized listing of a directory tree at one instant,
//! plus an opaque backend marker. The artifact format is a header line
//! `<count>[ <marker>]` followed by one record per entry:
//!
//! ```text
//! <path_len><path_bytes>\t<mtime_ms> <0|1>[ <ino>][ <file_id>]\n
//! ```
//!
//! Trailing record fields are optional and parsed with a has-more probe, so
//! older artifacts without inode data read back cleanly. A missing or
//! malformed artifact reads back as the empty snapshot: the diffing caller
//! always has a baseline, possibly the empty set.

use crate::error::Result;
use crate::ignore::IgnoreMatcher;
use crate::scan::{scan, validate_root, Entry};
use ahash::AHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A directory tree listing captured at one point in time
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Entries keyed by absolute path
    pub entries: AHashMap<PathBuf, Entry>,
    /// Opaque backend-specific cursor; scan-based backends write none
    pub marker: Option<String>,
}

impl Snapshot {
    /// The empty baseline
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scan `root` and capture every non-ignored entry.
    ///
    /// Fails with `NotFound` / `NotADirectory` before touching anything
    /// else.
    pub fn capture(root: &Path, ignore: &IgnoreMatcher) -> Result<Self> {
        validate_root(root)?;

        let mut entries = AHashMap::new();
        for entry in scan(root) {
            if ignore.is_ignored(&entry.path) {
                continue;
            }
            entries.insert(entry.path.clone(), entry);
        }

        debug!(root = %root.display(), count = entries.len(), "captured snapshot");
        Ok(Self {
            entries,
            marker: None,
        })
    }

    /// Build a snapshot from an already-collected entry list
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.path.clone(), e))
                .collect(),
            marker: None,
        }
    }

    /// Serialize to `dest`.
    ///
    /// Written to a sibling temp file and renamed into place, so a reader
    /// never observes a partially written artifact.
    pub fn write(&self, dest: &Path) -> Result<()> {
        let mut buf = Vec::new();
        self.serialize(&mut buf);

        let mut tmp = dest.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, &buf)?;
        fs::rename(&tmp, dest)?;
        Ok(())
    }

    /// Read a snapshot artifact.
    ///
    /// A missing or malformed artifact yields the empty snapshot rather
    /// than an error.
    pub fn read(source: &Path) -> Self {
        let bytes = match fs::read(source) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(source = %source.display(), error = %e, "no snapshot artifact, using empty baseline");
                return Self::empty();
            }
        };

        match parse(&bytes) {
            Some(snapshot) => snapshot,
            None => {
                warn!(source = %source.display(), "malformed snapshot artifact, using empty baseline");
                Self::empty()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        let mut header = self.entries.len().to_string();
        if let Some(marker) = &self.marker {
            header.push(' ');
            header.push_str(marker);
        }
        header.push('\n');
        out.extend_from_slice(header.as_bytes());

        // Sorted for a deterministic artifact; readers treat the set as
        // unordered either way
        let mut paths: Vec<&PathBuf> = self.entries.keys().collect();
        paths.sort();

        for path in paths {
            let entry = &self.entries[path];
            let path_str = entry.path.to_string_lossy();
            out.extend_from_slice(path_str.len().to_string().as_bytes());
            out.extend_from_slice(path_str.as_bytes());
            out.push(b'\t');
            out.extend_from_slice(entry.mtime_ms.to_string().as_bytes());
            out.push(b' ');
            out.push(if entry.is_dir { b'1' } else { b'0' });
            if let Some(ino) = entry.ino {
                out.push(b' ');
                out.extend_from_slice(ino.to_string().as_bytes());
            }
            if let Some(file_id) = &entry.file_id {
                out.push(b' ');
                out.extend_from_slice(file_id.as_bytes());
            }
            out.push(b'\n');
        }
    }
}

/// Parse the whole artifact; any violation aborts to None
fn parse(bytes: &[u8]) -> Option<Snapshot> {
    let mut cursor = Cursor { bytes, pos: 0 };

    let count = cursor.read_number()? as usize;
    let marker = if cursor.peek() == Some(b' ') {
        cursor.pos += 1;
        let token = cursor.take_until(b'\n')?;
        Some(String::from_utf8(token.to_vec()).ok()?)
    } else {
        None
    };
    cursor.expect(b'\n')?;

    let mut entries = AHashMap::with_capacity(count);
    for _ in 0..count {
        let entry = parse_record(&mut cursor)?;
        entries.insert(entry.path.clone(), entry);
    }

    Some(Snapshot { entries, marker })
}

fn parse_record(cursor: &mut Cursor) -> Option<Entry> {
    let len = cursor.read_number()? as usize;
    let path_bytes = cursor.take(len)?;
    let path = PathBuf::from(String::from_utf8(path_bytes.to_vec()).ok()?);
    cursor.expect(b'\t')?;

    let mtime_ms = cursor.read_number()?;
    cursor.expect(b' ')?;
    let is_dir = match cursor.next()? {
        b'0' => false,
        b'1' => true,
        _ => return None,
    };

    let mut ino = None;
    let mut file_id = None;
    if cursor.peek() == Some(b' ') {
        cursor.pos += 1;
        ino = Some(cursor.read_number()?);
    }
    if cursor.peek() == Some(b' ') {
        cursor.pos += 1;
        let token = cursor.take_until(b'\n')?;
        file_id = Some(String::from_utf8(token.to_vec()).ok()?);
    }
    cursor.expect(b'\n')?;

    Some(Entry {
        path,
        mtime_ms,
        is_dir,
        ino,
        file_id,
    })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, expected: u8) -> Option<()> {
        (self.next()? == expected).then_some(())
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn take_until(&mut self, stop: u8) -> Option<&'a [u8]> {
        let start = self.pos;
        while self.peek()? != stop {
            self.pos += 1;
        }
        Some(&self.bytes[start..self.pos])
    }

    fn read_number(&mut self) -> Option<u64> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use anyhow::Result;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn round_trip_reproduces_the_entry_set() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), b"a")?;
        fs::create_dir(root.join("sub"))?;
        fs::write(root.join("sub/b.txt"), b"b")?;

        let ignore = IgnoreMatcher::empty(root);
        let captured = Snapshot::capture(root, &ignore)?;

        let artifact = temp_dir.path().join("snapshot.txt");
        captured.write(&artifact)?;
        let restored = Snapshot::read(&artifact);

        assert_eq!(restored.entries, captured.entries);
        assert_eq!(restored.marker, None);
        Ok(())
    }

    #[test]
    fn capture_applies_ignore_rules() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::write(root.join("keep.txt"), b"k")?;
        fs::write(root.join("skip.log"), b"s")?;

        let ignore =
            IgnoreMatcher::compile(root, &["*.log".to_string()], false)?;
        let snapshot = Snapshot::capture(root, &ignore)?;

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.entries.contains_key(&root.join("keep.txt")));
        Ok(())
    }

    #[test]
    fn missing_artifact_reads_as_empty() {
        let snapshot = Snapshot::read(Path::new("/nonexistent/snapshot"));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn malformed_artifact_reads_as_empty() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let artifact = temp_dir.path().join("snapshot.txt");
        fs::write(&artifact, b"this is not a snapshot\n")?;

        assert!(Snapshot::read(&artifact).is_empty());

        // Truncated record
        fs::write(&artifact, b"2\n8/watched\t100 0\n")?;
        assert!(Snapshot::read(&artifact).is_empty());
        Ok(())
    }

    #[test]
    fn marker_round_trips_in_the_header() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let artifact = temp_dir.path().join("snapshot.txt");

        let mut snapshot = Snapshot::from_entries([Entry {
            path: PathBuf::from("/watched/f"),
            mtime_ms: 1234,
            is_dir: false,
            ino: Some(7),
            file_id: None,
        }]);
        snapshot.marker = Some("cursor:42".to_string());
        snapshot.write(&artifact)?;

        let restored = Snapshot::read(&artifact);
        assert_eq!(restored.marker.as_deref(), Some("cursor:42"));
        assert_eq!(restored.entries, snapshot.entries);
        Ok(())
    }

    #[test]
    fn records_without_optional_fields_parse() {
        let artifact = b"1\n10/watched/f\t500 0\n";
        let snapshot = parse(artifact).unwrap();
        let entry = &snapshot.entries[Path::new("/watched/f")];
        assert_eq!(entry.mtime_ms, 500);
        assert_eq!(entry.ino, None);
        assert_eq!(entry.file_id, None);
    }

    #[test]
    fn write_is_atomic_against_partial_reads() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let artifact = temp_dir.path().join("snapshot.txt");

        let snapshot = Snapshot::from_entries([Entry {
            path: PathBuf::from("/watched/f"),
            mtime_ms: 1,
            is_dir: false,
            ino: None,
            file_id: None,
        }]);
        snapshot.write(&artifact)?;

        // No temp residue next to the artifact
        let names: Vec<_> = fs::read_dir(temp_dir.path())?
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("snapshot.txt")]);
        Ok(())
    }

    #[test]
    fn capture_validates_the_root() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let ignore = IgnoreMatcher::empty(temp_dir.path());

        let missing = temp_dir.path().join("gone");
        assert!(matches!(
            Snapshot::capture(&missing, &ignore),
            Err(Error::NotFound(_))
        ));

        let file = temp_dir.path().join("plain");
        fs::write(&file, b"x")?;
        assert!(matches!(
            Snapshot::capture(&file, &ignore),
            Err(Error::NotADirectory(_))
        ));
        Ok(())
    }
}
