//! Brute-force scan/diff fallback backend
//!
//! Keeps the previous scan of the root in memory, rescans on an interval,
//! and diffs the two listings. Each tick's changes go out as one raw batch
//! terminated by an explicit end-of-batch marker, so a burst of mutations
//! between ticks coalesces into a single delivery. Renames surface as
//! unpaired delete + create pairs; this backend has no native rename
//! detection.

use super::{Capabilities, RawEvent, RawKind, RawMessage, RawSender, RawSource};
use driftwatch_core::{diff, scan, snapshot::Snapshot, Event, EventKind, IgnoreMatcher};
use driftwatch_core::scan::validate_root;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Raw source backed by periodic rescans
pub struct PollSource {
    stop_tx: Option<oneshot::Sender<()>>,
}

impl PollSource {
    pub fn start(root: PathBuf, interval: Duration, tx: RawSender) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(run(root, interval, tx, stop_rx));
        Self {
            stop_tx: Some(stop_tx),
        }
    }
}

impl RawSource for PollSource {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_rename: false,
        }
    }
}

impl Drop for PollSource {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

async fn run(
    root: PathBuf,
    interval: Duration,
    tx: RawSender,
    mut stop_rx: oneshot::Receiver<()>,
) {
    // Ignore rules are per subscription and applied during fan-out; the
    // backend itself watches everything under the root
    let no_ignore = IgnoreMatcher::empty(&root);

    let mut last = match Snapshot::capture(&root, &no_ignore) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let _ = tx.send(RawMessage::Error(e.to_string()));
            return;
        }
    };
    debug!(root = %root.display(), entries = last.len(), "poll backend baseline captured");

    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                trace!(root = %root.display(), "poll backend stopped");
                break;
            }
            _ = timer.tick() => {
                if let Err(e) = validate_root(&root) {
                    warn!(root = %root.display(), error = %e, "watched root vanished");
                    let _ = tx.send(RawMessage::Error(e.to_string()));
                    break;
                }

                let current: Vec<_> = scan(&root).collect();
                let changes = diff(&last, current.iter().cloned(), &no_ignore);

                if !changes.is_empty() {
                    trace!(root = %root.display(), count = changes.len(), "poll tick found changes");
                    for event in &changes {
                        if tx.send(RawMessage::Event(to_raw(event))).is_err() {
                            return;
                        }
                    }
                    if tx.send(RawMessage::EndOfBatch).is_err() {
                        return;
                    }
                }

                last = Snapshot::from_entries(current);
            }
        }
    }
}

fn to_raw(event: &Event) -> RawEvent {
    let kind = match event.kind {
        EventKind::Create => RawKind::Create,
        EventKind::Update => RawKind::Modify,
        EventKind::Delete => RawKind::Remove,
        // The diff engine never emits renames
        EventKind::Rename { .. } => RawKind::Modify,
    };

    RawEvent {
        ino: event.ino,
        ..RawEvent::new(kind, event.path.clone())
    }
}
