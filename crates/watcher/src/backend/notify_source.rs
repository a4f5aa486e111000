//! Platform notification backend
//!
//! Wraps `notify`'s recommended watcher for the current platform and maps
//! its event kinds onto the raw vocabulary. Rename reporting differs per
//! platform: inotify emits paired From/To with a shared tracker id, FSEvents
//! emits `RenameMode::Any` one path at a time, Windows emits From/To without
//! a tracker. The mapping resolves `Any` with an existence probe and leaves
//! pairing to the normalizer.

use super::{Capabilities, RawEvent, RawKind, RawMessage, RawSender, RawSource};
use driftwatch_core::{Entry, Error, Result};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Raw source backed by platform change notifications
pub struct NotifySource {
    // Held for its Drop; dropping the watcher stops the OS watch
    _watcher: RecommendedWatcher,
}

impl NotifySource {
    pub fn start(root: &Path, tx: RawSender) -> Result<Self> {
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<notify::Event>| match result {
                Ok(event) => {
                    for raw in map_event(event) {
                        if tx.send(RawMessage::Event(raw)).is_err() {
                            trace!("raw event channel closed, dropping event");
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(RawMessage::Error(e.to_string()));
                }
            },
            Config::default(),
        )
        .map_err(|e| Error::Backend(e.to_string()))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| Error::Backend(e.to_string()))?;

        debug!(root = %root.display(), "platform watcher started");
        Ok(Self { _watcher: watcher })
    }
}

impl RawSource for NotifySource {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_rename: true,
        }
    }
}

/// Map one notify event onto raw events, one per affected path
fn map_event(event: notify::Event) -> Vec<RawEvent> {
    let tracker = event.attrs.tracker();

    match event.kind {
        EventKind::Create(_) => event
            .paths
            .into_iter()
            .map(|path| {
                let ino = probe_ino(&path);
                RawEvent {
                    ino,
                    ..RawEvent::new(RawKind::Create, path)
                }
            })
            .collect(),

        EventKind::Remove(_) => event
            .paths
            .into_iter()
            .map(|path| RawEvent::new(RawKind::Remove, path))
            .collect(),

        EventKind::Modify(ModifyKind::Name(mode)) => map_rename(mode, event.paths, tracker),

        EventKind::Modify(_) => event
            .paths
            .into_iter()
            .map(|path| RawEvent::new(RawKind::Modify, path))
            .collect(),

        // Access events carry no tree state change
        EventKind::Access(_) => Vec::new(),

        other => {
            warn!(kind = ?other, "unclassified notification treated as modify");
            event
                .paths
                .into_iter()
                .map(|path| RawEvent::new(RawKind::Modify, path))
                .collect()
        }
    }
}

fn map_rename(
    mode: RenameMode,
    mut paths: Vec<PathBuf>,
    tracker: Option<usize>,
) -> Vec<RawEvent> {
    match mode {
        RenameMode::Both if paths.len() >= 2 => {
            let to = paths.pop().unwrap_or_default();
            let from = paths.swap_remove(0);
            let ino = probe_ino(&to);
            vec![RawEvent {
                other: Some(to),
                tracker,
                ino,
                ..RawEvent::new(RawKind::RenameBoth, from)
            }]
        }

        RenameMode::From => paths
            .into_iter()
            .map(|path| RawEvent {
                tracker,
                ..RawEvent::new(RawKind::RenameFrom, path)
            })
            .collect(),

        RenameMode::To => paths
            .into_iter()
            .map(|path| {
                let ino = probe_ino(&path);
                RawEvent {
                    tracker,
                    ino,
                    ..RawEvent::new(RawKind::RenameTo, path)
                }
            })
            .collect(),

        // FSEvents reports both halves as `Any`, one event each; decide by
        // whether the path still exists
        _ => paths
            .into_iter()
            .map(|path| match Entry::lstat(&path) {
                Some(entry) => RawEvent {
                    tracker,
                    ino: entry.ino,
                    ..RawEvent::new(RawKind::RenameTo, path)
                },
                None => RawEvent {
                    tracker,
                    ..RawEvent::new(RawKind::RenameFrom, path)
                },
            })
            .collect(),
    }
}

fn probe_ino(path: &Path) -> Option<u64> {
    Entry::lstat(path).and_then(|e| e.ino)
}
