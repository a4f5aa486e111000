//! Snapshot diffing
//!
//! Compares an old snapshot against a fresh scan and emits the minimal
//! create/update/delete sequence describing the net change. Snapshot
//! diffing has no native rename detection; a moved path surfaces as an
//! independent delete + create pair.

use crate::event::Event;
use crate::ignore::IgnoreMatcher;
use crate::scan::Entry;
use crate::snapshot::Snapshot;
use ahash::AHashSet;
use std::path::PathBuf;

/// Diff an old snapshot against the current entry listing.
///
/// Creates and updates are emitted first, in listing order. A path whose
/// kind flipped between file and directory is a full replacement: delete
/// then create. Directories never produce updates; their mtimes move on
/// child mutation without any content change. Deletes for paths missing
/// from the new listing come last, ordered deepest-first (reverse
/// lexicographic), so a removed directory's contents always precede the
/// directory itself.
pub fn diff(
    old: &Snapshot,
    new_entries: impl IntoIterator<Item = Entry>,
    ignore: &IgnoreMatcher,
) -> Vec<Event> {
    let mut events = Vec::new();
    let mut seen: AHashSet<PathBuf> = AHashSet::new();

    for entry in new_entries {
        if ignore.is_ignored(&entry.path) {
            continue;
        }

        match old.entries.get(&entry.path) {
            None => {
                events.push(Event::create(&entry.path).with_ino(entry.ino));
            }
            Some(previous) if previous.is_dir != entry.is_dir => {
                events.push(Event::delete(&entry.path).with_ino(previous.ino));
                events.push(Event::create(&entry.path).with_ino(entry.ino));
            }
            Some(previous)
                if !entry.is_dir && entry.mtime_ms > previous.mtime_ms =>
            {
                events.push(Event::update(&entry.path).with_ino(entry.ino));
            }
            Some(_) => {}
        }

        seen.insert(entry.path);
    }

    let mut deleted: Vec<&Entry> = old
        .entries
        .values()
        .filter(|e| !seen.contains(&e.path) && !ignore.is_ignored(&e.path))
        .collect();
    deleted.sort_by(|a, b| b.path.cmp(&a.path));

    for entry in deleted {
        events.push(Event::delete(&entry.path).with_ino(entry.ino));
    }

    events
}
