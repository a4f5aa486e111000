//! Raw event sources
//!
//! A backend supplies, per watched root, a serialized stream of raw
//! notifications plus a capability flag describing whether it can natively
//! detect renames. Two sources exist: the platform notification backend
//! built on `notify`, and a brute-force scan/diff poll loop used as the
//! fallback. All raw events for one root flow through a single channel, so
//! the engine never sees more than one delivery in flight per backend.

pub mod notify_source;
pub mod poll;

use driftwatch_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// What a backend can and cannot express
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// True if the backend emits paired rename notifications; false if a
    /// rename surfaces as an unpaired delete + create
    pub native_rename: bool,
}

/// Backend-agnostic raw notification vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Create,
    Modify,
    Remove,
    /// First half of a rename pair; the path no longer exists
    RenameFrom,
    /// Second half of a rename pair; the path now exists
    RenameTo,
    /// A rename carrying both paths in one notification
    RenameBoth,
}

/// One raw notification from a backend
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub kind: RawKind,
    pub path: PathBuf,
    /// Destination path for `RenameBoth`
    pub other: Option<PathBuf>,
    /// Backend token correlating the two halves of a rename pair
    pub tracker: Option<usize>,
    /// Inode of the affected object, where the backend knows it
    pub ino: Option<u64>,
}

impl RawEvent {
    pub fn new(kind: RawKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            other: None,
            tracker: None,
            ino: None,
        }
    }
}

/// Messages flowing from a backend to the engine worker
#[derive(Debug)]
pub enum RawMessage {
    Event(RawEvent),
    /// A burst of notifications has been fully drained; flush boundary
    EndOfBatch,
    /// The raw source died; the subscription is dead until resubscribed
    Error(String),
}

/// Sending half of a backend's serialized channel
pub type RawSender = mpsc::UnboundedSender<RawMessage>;
/// Receiving half, owned by the per-root worker
pub type RawReceiver = mpsc::UnboundedReceiver<RawMessage>;

/// A live raw source for one watched root.
///
/// Dropping the handle stops the underlying notification stream and closes
/// the channel, which in turn ends the worker draining it.
pub trait RawSource: Send {
    fn capabilities(&self) -> Capabilities;
}

/// Which raw source to use for a subscription
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Platform notifications, falling back to polling if unavailable
    #[default]
    Auto,
    /// Platform notification backend only
    Notify,
    /// Brute-force scan/diff polling
    Poll,
}

/// Instantiate the raw source for a root, honoring the fallback order
/// Auto → notify → poll.
pub fn spawn(
    kind: BackendKind,
    root: &Path,
    poll_interval: Duration,
    tx: RawSender,
) -> Result<Box<dyn RawSource>> {
    match kind {
        BackendKind::Notify => Ok(Box::new(notify_source::NotifySource::start(root, tx)?)),
        BackendKind::Poll => Ok(Box::new(poll::PollSource::start(
            root.to_path_buf(),
            poll_interval,
            tx,
        ))),
        BackendKind::Auto => match notify_source::NotifySource::start(root, tx.clone()) {
            Ok(source) => Ok(Box::new(source)),
            Err(Error::Backend(reason)) => {
                warn!(root = %root.display(), %reason, "platform watcher unavailable, falling back to polling");
                Ok(Box::new(poll::PollSource::start(
                    root.to_path_buf(),
                    poll_interval,
                    tx,
                )))
            }
            Err(e) => Err(e),
        },
    }
}
