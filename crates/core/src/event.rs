//! Canonical change-event vocabulary
//!
//! Every backend-specific notification and every snapshot diff is reduced to
//! this vocabulary before it reaches a consumer. Ordering of events within
//! one delivered batch is significant and preserved from detection order.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Type of filesystem change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Path came into existence
    Create,
    /// File content changed (directories never produce updates)
    Update,
    /// Path was removed
    Delete,
    /// Path moved; only emitted by backends with native rename detection
    Rename {
        /// The path the object previously lived at
        from: PathBuf,
    },
}

/// A normalized filesystem change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Type of change
    pub kind: EventKind,
    /// Path the change applies to (the destination path for renames)
    pub path: PathBuf,
    /// Inode of the affected object, where the backend supplies one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ino: Option<u64>,
}

impl Event {
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Create,
            path: path.into(),
            ino: None,
        }
    }

    pub fn update(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Update,
            path: path.into(),
            ino: None,
        }
    }

    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Delete,
            path: path.into(),
            ino: None,
        }
    }

    pub fn rename(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Rename { from: from.into() },
            path: to.into(),
            ino: None,
        }
    }

    /// Attach an inode hint
    pub fn with_ino(mut self, ino: Option<u64>) -> Self {
        self.ino = ino;
        self
    }

    /// True if this is a delete event
    pub fn is_delete(&self) -> bool {
        self.kind == EventKind::Delete
    }
}
