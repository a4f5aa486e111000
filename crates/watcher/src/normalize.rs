//! Raw event normalization
//!
//! Converts one drained burst of raw backend notifications into the
//! canonical event vocabulary. This is where backend granularity
//! differences are reconciled:
//!
//! - Paired rename halves become a single `Rename`, correlated by tracker
//!   id when the backend supplies one, else first-in-first-out.
//! - An unmatched From half degrades to `Delete`, an unmatched To half to
//!   `Create` — pairing never crosses a batch boundary.
//! - Runs of consecutive deletes are reordered deepest-first, the same
//!   fixed order the diff engine uses, so backend-specific delete ordering
//!   is settled here and never reaches the coalescing buffer.

use crate::backend::{RawEvent, RawKind};
use driftwatch_core::{Event, EventKind};
use std::path::PathBuf;

struct PendingFrom {
    tracker: Option<usize>,
    path: PathBuf,
    /// Index of the slot reserved in the output for this half
    slot: usize,
    claimed: bool,
}

/// Normalize one raw batch into canonical events, preserving detection
/// order except for the documented delete reordering.
pub fn normalize(batch: &[RawEvent]) -> Vec<Event> {
    let mut slots: Vec<Option<Event>> = Vec::with_capacity(batch.len());
    let mut froms: Vec<PendingFrom> = Vec::new();

    for raw in batch {
        match raw.kind {
            RawKind::Create => {
                slots.push(Some(Event::create(&raw.path).with_ino(raw.ino)));
            }
            RawKind::Modify => {
                slots.push(Some(Event::update(&raw.path).with_ino(raw.ino)));
            }
            RawKind::Remove => {
                slots.push(Some(Event::delete(&raw.path).with_ino(raw.ino)));
            }
            RawKind::RenameBoth => {
                let to = raw.other.clone().unwrap_or_else(|| raw.path.clone());
                slots.push(Some(Event::rename(&raw.path, to).with_ino(raw.ino)));
            }
            RawKind::RenameFrom => {
                froms.push(PendingFrom {
                    tracker: raw.tracker,
                    path: raw.path.clone(),
                    slot: slots.len(),
                    claimed: false,
                });
                slots.push(None);
            }
            RawKind::RenameTo => {
                let matched = froms.iter_mut().find(|f| {
                    !f.claimed
                        && match (f.tracker, raw.tracker) {
                            (Some(a), Some(b)) => a == b,
                            _ => true,
                        }
                });

                match matched {
                    Some(from) => {
                        from.claimed = true;
                        let from_path = from.path.clone();
                        slots.push(Some(
                            Event::rename(from_path, &raw.path).with_ino(raw.ino),
                        ));
                    }
                    None => {
                        slots.push(Some(Event::create(&raw.path).with_ino(raw.ino)));
                    }
                }
            }
        }
    }

    // Unmatched From halves: the object left the tree as far as this batch
    // can tell
    for from in froms {
        if !from.claimed {
            slots[from.slot] = Some(Event::delete(from.path));
        }
    }

    let mut events: Vec<Event> = slots.into_iter().flatten().collect();
    order_delete_runs(&mut events);
    events
}

/// Sort each maximal run of consecutive deletes deepest-first (reverse
/// lexicographic), leaving everything else in place.
fn order_delete_runs(events: &mut [Event]) {
    let mut start = 0;
    while start < events.len() {
        if events[start].kind != EventKind::Delete {
            start += 1;
            continue;
        }

        let mut end = start + 1;
        while end < events.len() && events[end].kind == EventKind::Delete {
            end += 1;
        }

        events[start..end].sort_by(|a, b| b.path.cmp(&a.path));
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawEvent;
    use std::path::Path;

    fn raw(kind: RawKind, path: &str) -> RawEvent {
        RawEvent::new(kind, path)
    }

    #[test]
    fn plain_kinds_map_one_to_one() {
        let batch = [
            raw(RawKind::Create, "/w/a"),
            raw(RawKind::Modify, "/w/b"),
            raw(RawKind::Remove, "/w/c"),
        ];

        assert_eq!(
            normalize(&batch),
            vec![
                Event::create("/w/a"),
                Event::update("/w/b"),
                Event::delete("/w/c"),
            ]
        );
    }

    #[test]
    fn rename_both_becomes_one_rename() {
        let mut both = raw(RawKind::RenameBoth, "/w/old");
        both.other = Some(PathBuf::from("/w/new"));

        assert_eq!(normalize(&[both]), vec![Event::rename("/w/old", "/w/new")]);
    }

    #[test]
    fn from_to_pair_by_tracker() {
        let mut from = raw(RawKind::RenameFrom, "/w/old");
        from.tracker = Some(3);
        let mut to = raw(RawKind::RenameTo, "/w/new");
        to.tracker = Some(3);

        assert_eq!(
            normalize(&[from, to]),
            vec![Event::rename("/w/old", "/w/new")]
        );
    }

    #[test]
    fn interleaved_pairs_respect_trackers() {
        let mut from_a = raw(RawKind::RenameFrom, "/w/a");
        from_a.tracker = Some(1);
        let mut from_b = raw(RawKind::RenameFrom, "/w/b");
        from_b.tracker = Some(2);
        let mut to_b = raw(RawKind::RenameTo, "/w/b2");
        to_b.tracker = Some(2);
        let mut to_a = raw(RawKind::RenameTo, "/w/a2");
        to_a.tracker = Some(1);

        assert_eq!(
            normalize(&[from_a, from_b, to_b, to_a]),
            vec![
                Event::rename("/w/b", "/w/b2"),
                Event::rename("/w/a", "/w/a2"),
            ]
        );
    }

    #[test]
    fn trackerless_pairs_match_fifo() {
        let batch = [
            raw(RawKind::RenameFrom, "/w/old"),
            raw(RawKind::RenameTo, "/w/new"),
        ];
        assert_eq!(
            normalize(&batch),
            vec![Event::rename("/w/old", "/w/new")]
        );
    }

    #[test]
    fn unmatched_halves_degrade() {
        let batch = [
            raw(RawKind::RenameFrom, "/w/moved-out"),
            raw(RawKind::Create, "/w/unrelated"),
        ];
        assert_eq!(
            normalize(&batch),
            vec![
                Event::delete("/w/moved-out"),
                Event::create("/w/unrelated"),
            ]
        );

        let batch = [raw(RawKind::RenameTo, "/w/moved-in")];
        assert_eq!(normalize(&batch), vec![Event::create("/w/moved-in")]);
    }

    #[test]
    fn unmatched_from_keeps_its_position() {
        let batch = [
            raw(RawKind::Create, "/w/first"),
            raw(RawKind::RenameFrom, "/w/gone"),
            raw(RawKind::Create, "/w/last"),
        ];
        let events = normalize(&batch);
        assert_eq!(events[1], Event::delete("/w/gone"));
    }

    #[test]
    fn delete_runs_are_reordered_deepest_first() {
        let batch = [
            raw(RawKind::Remove, "/w/dir"),
            raw(RawKind::Remove, "/w/dir/sub"),
            raw(RawKind::Remove, "/w/dir/sub/f"),
            raw(RawKind::Create, "/w/other"),
            raw(RawKind::Remove, "/w/z"),
        ];

        let events = normalize(&batch);
        let paths: Vec<&Path> = events.iter().map(|e| e.path.as_path()).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("/w/dir/sub/f"),
                Path::new("/w/dir/sub"),
                Path::new("/w/dir"),
                Path::new("/w/other"),
                Path::new("/w/z"),
            ]
        );
    }

    #[test]
    fn non_delete_order_is_preserved() {
        let batch = [
            raw(RawKind::Create, "/w/b"),
            raw(RawKind::Create, "/w/a"),
            raw(RawKind::Modify, "/w/c"),
        ];
        let events = normalize(&batch);
        assert_eq!(events[0], Event::create("/w/b"));
        assert_eq!(events[1], Event::create("/w/a"));
        assert_eq!(events[2], Event::update("/w/c"));
    }
}
