//! Event coalescing
//!
//! Each subscription owns one buffer. Within a flush window the buffer
//! tracks per-path pending state and applies a deterministic transition
//! table, so a burst of intermediate states collapses into the minimal
//! event sequence describing net effect. A path created and destroyed
//! inside one window produces nothing at all; a delete rapidly followed by
//! a create of the same object collapses to an update; chained renames of
//! one object collapse to a single event at the final path.

use ahash::AHashMap;
use driftwatch_core::{Event, EventKind};
use std::path::{Path, PathBuf};

/// Net pending effect for one path within the current flush window
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Created {
        ino: Option<u64>,
    },
    Updated {
        ino: Option<u64>,
    },
    Deleted {
        ino: Option<u64>,
    },
    /// A pre-existing object moved here; `from` is its path at window start
    Renamed {
        from: PathBuf,
        ino: Option<u64>,
    },
    /// Deleted and re-created by a different object; flushes as delete then
    /// create at the same path
    Replaced {
        old_ino: Option<u64>,
        new_ino: Option<u64>,
    },
}

/// Per-subscription coalescing buffer
#[derive(Debug, Default)]
pub struct CoalescingBuffer {
    pending: AHashMap<PathBuf, Pending>,
    /// Paths in first-touched order; drives flush ordering
    order: Vec<PathBuf>,
}

impl CoalescingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply one normalized event to the pending state
    pub fn apply(&mut self, event: &Event) {
        match &event.kind {
            EventKind::Create => self.on_create(&event.path, event.ino),
            EventKind::Update => self.on_update(&event.path, event.ino),
            EventKind::Delete => self.on_delete(&event.path, event.ino),
            EventKind::Rename { from } => self.on_rename(from.clone(), &event.path, event.ino),
        }
    }

    /// Drain pending state into one ordered batch and clear the window
    pub fn flush(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.pending.len());

        for path in self.order.drain(..) {
            let Some(state) = self.pending.remove(&path) else {
                continue;
            };
            match state {
                Pending::Created { ino } => {
                    events.push(Event::create(&path).with_ino(ino));
                }
                Pending::Updated { ino } => {
                    events.push(Event::update(&path).with_ino(ino));
                }
                Pending::Deleted { ino } => {
                    events.push(Event::delete(&path).with_ino(ino));
                }
                Pending::Renamed { from, ino } => {
                    events.push(Event::rename(from, &path).with_ino(ino));
                }
                Pending::Replaced { old_ino, new_ino } => {
                    events.push(Event::delete(&path).with_ino(old_ino));
                    events.push(Event::create(&path).with_ino(new_ino));
                }
            }
        }

        events
    }

    fn on_create(&mut self, path: &Path, ino: Option<u64>) {
        let next = match self.pending.get(path) {
            None => Pending::Created { ino },
            Some(Pending::Created { .. }) => Pending::Created { ino },
            Some(Pending::Updated { ino: u }) => Pending::Updated { ino: ino.or(*u) },
            // Removed and re-created within the window: the object still
            // exists and its content is indeterminate, so report an update
            // — unless the inodes prove this is a different object
            Some(Pending::Deleted { ino: old }) => match (*old, ino) {
                (Some(old_ino), Some(new_ino)) if old_ino != new_ino => Pending::Replaced {
                    old_ino: Some(old_ino),
                    new_ino: Some(new_ino),
                },
                _ => Pending::Updated { ino },
            },
            Some(Pending::Renamed { from, ino: r }) => Pending::Renamed {
                from: from.clone(),
                ino: ino.or(*r),
            },
            Some(Pending::Replaced { old_ino, .. }) => Pending::Replaced {
                old_ino: *old_ino,
                new_ino: ino,
            },
        };
        self.set(path, next);
    }

    fn on_update(&mut self, path: &Path, ino: Option<u64>) {
        let next = match self.pending.get(path) {
            None => Pending::Updated { ino },
            Some(Pending::Created { ino: c }) => Pending::Created { ino: ino.or(*c) },
            Some(Pending::Updated { ino: u }) => Pending::Updated { ino: ino.or(*u) },
            // An update cannot follow a delete without an intervening
            // create; treat it as stale
            Some(Pending::Deleted { ino: d }) => Pending::Deleted { ino: *d },
            Some(Pending::Renamed { from, ino: r }) => Pending::Renamed {
                from: from.clone(),
                ino: ino.or(*r),
            },
            Some(Pending::Replaced { old_ino, new_ino }) => Pending::Replaced {
                old_ino: *old_ino,
                new_ino: ino.or(*new_ino),
            },
        };
        self.set(path, next);
    }

    fn on_delete(&mut self, path: &Path, ino: Option<u64>) {
        match self.pending.get(path).cloned() {
            // Created and destroyed within one window: net no-op
            Some(Pending::Created { .. }) => {
                self.remove(path);
            }
            Some(Pending::Updated { ino: u }) => {
                self.set(path, Pending::Deleted { ino: ino.or(u) });
            }
            Some(Pending::Deleted { ino: d }) => {
                self.set(path, Pending::Deleted { ino: d });
            }
            // A pre-existing object moved here and was then deleted: the
            // net fact is the disappearance of its original path. If a new
            // object was meanwhile created at the origin, the origin nets
            // out to a replacement instead.
            Some(Pending::Renamed { from, ino: r }) => {
                self.move_slot(path, &from);
                let net = match self.pending.get(&from) {
                    Some(Pending::Created { ino: c }) => Pending::Replaced {
                        old_ino: ino.or(r),
                        new_ino: *c,
                    },
                    _ => Pending::Deleted { ino: ino.or(r) },
                };
                self.pending.insert(from, net);
            }
            Some(Pending::Replaced { old_ino, .. }) => {
                self.set(path, Pending::Deleted { ino: old_ino });
            }
            None => {
                self.set(path, Pending::Deleted { ino });
            }
        }
    }

    fn on_rename(&mut self, from: PathBuf, to: &Path, ino: Option<u64>) {
        match self.pending.get(&from).cloned() {
            // Not yet flushed as a create: still a create, at the final
            // path; merging through the create transition also covers a
            // move onto a path with a pending delete
            Some(Pending::Created { ino: c }) => {
                self.take(&from);
                self.move_slot(&from, to);
                self.on_create(to, ino.or(c));
            }
            // Chained renames keep the original origin; a chain that
            // returns home nets out to an update
            Some(Pending::Renamed { from: origin, ino: r }) => {
                self.take(&from);
                self.move_slot(&from, to);
                let state = if origin == to {
                    Pending::Updated { ino: ino.or(r) }
                } else {
                    Pending::Renamed {
                        from: origin,
                        ino: ino.or(r),
                    }
                };
                self.pending.insert(to.to_path_buf(), state);
            }
            Some(Pending::Updated { ino: u }) => {
                self.take(&from);
                self.move_slot(&from, to);
                self.pending.insert(
                    to.to_path_buf(),
                    Pending::Renamed {
                        from,
                        ino: ino.or(u),
                    },
                );
            }
            // The replacement object moved away: its old path stays
            // deleted, the new path gains the created object
            Some(Pending::Replaced { old_ino, new_ino }) => {
                self.pending
                    .insert(from.clone(), Pending::Deleted { ino: old_ino });
                self.set(to, Pending::Created { ino: ino.or(new_ino) });
            }
            // No prior state (pre-existing object), or a stale delete the
            // rename contradicts
            other => {
                if matches!(other, Some(Pending::Deleted { .. })) {
                    self.remove(&from);
                }
                self.set(
                    to,
                    Pending::Renamed {
                        from,
                        ino,
                    },
                );
            }
        }
    }

    /// Insert state for a path, registering its order slot on first touch
    fn set(&mut self, path: &Path, state: Pending) {
        if !self.pending.contains_key(path) {
            self.order.push(path.to_path_buf());
        }
        self.pending.insert(path.to_path_buf(), state);
    }

    fn take(&mut self, path: &Path) -> Option<Pending> {
        self.pending.remove(path)
    }

    /// Drop a path and its order slot entirely
    fn remove(&mut self, path: &Path) {
        self.pending.remove(path);
        self.order.retain(|p| p != path);
    }

    /// Re-point `old`'s order slot at `new`, collapsing to one slot if
    /// `new` already has one
    fn move_slot(&mut self, old: &Path, new: &Path) {
        if self.pending.contains_key(new) {
            self.order.retain(|p| p != old);
            return;
        }
        match self.order.iter_mut().find(|p| p.as_path() == old) {
            Some(slot) => *slot = new.to_path_buf(),
            None => self.order.push(new.to_path_buf()),
        }
    }
}
