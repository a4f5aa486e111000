//! Live filesystem watching for driftwatch
//!
//! This crate provides the change-notification engine on top of
//! `driftwatch-core`:
//! - Raw backend sources (platform notifications via `notify`, plus a
//!   brute-force scan/diff fallback) behind one capability interface
//! - Normalization of backend-specific notifications into the canonical
//!   event vocabulary
//! - Per-subscription event coalescing with deterministic state
//!   transitions
//! - Multiplexing of many subscriptions onto shared per-directory watches
//! - Snapshot operations: [`write_snapshot`] and [`get_events_since`]
//!
//! ```no_run
//! use driftwatch_watcher::{Engine, EventCallback, Options};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn demo() -> driftwatch_watcher::Result<()> {
//! let engine = Engine::new();
//! let callback: EventCallback = Arc::new(|batch| {
//!     if let Ok(events) = batch {
//!         for event in events {
//!             println!("{:?} {}", event.kind, event.path.display());
//!         }
//!     }
//! });
//!
//! let subscription = engine
//!     .subscribe(Path::new("/some/dir"), callback, Options::default())
//!     .await?;
//! subscription.unsubscribe().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod coalesce;
pub mod normalize;
mod registry;

pub use backend::BackendKind;
pub use driftwatch_core::{
    diff, scan, Entry, Error, Event, EventKind, IgnoreMatcher, Result, Snapshot,
};

use registry::Registry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::debug;

/// Subscription callback: receives either one coalesced event batch or a
/// backend failure. Callback identity (the `Arc` pointer) participates in
/// unsubscribe matching.
pub type EventCallback = Arc<dyn Fn(Result<Vec<Event>>) + Send + Sync>;

/// Cadence of the brute-force poll backend
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options accepted by every public operation
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Ignore entries: literal paths (absolute, or relative to the watched
    /// directory) and glob patterns
    pub ignore: Vec<String>,
    /// Which raw event source to use for subscriptions
    pub backend: BackendKind,
    /// Match ignore globs case-insensitively
    pub glob_case_insensitive: bool,
    /// Rescan cadence when the poll backend is in use
    pub poll_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            backend: BackendKind::default(),
            glob_case_insensitive: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// The process-wide watch engine.
///
/// Owns the directory → backend-handle registry. Cheap to clone; clones
/// share the same registry. Constructed explicitly at startup and torn
/// down with [`Engine::shutdown`] rather than living in module-level
/// state.
#[derive(Clone, Default)]
pub struct Engine {
    registry: Arc<Registry>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes under `dir`.
    ///
    /// Fails with [`Error::NotFound`] / [`Error::NotADirectory`] before any
    /// backend resource is allocated. Subscriptions on the same canonical
    /// directory share one underlying watch; each keeps its own ignore
    /// rules and receives independently coalesced batches.
    pub async fn subscribe(
        &self,
        dir: &Path,
        callback: EventCallback,
        options: Options,
    ) -> Result<Subscription> {
        let dir = resolve_dir(dir).await?;
        self.registry
            .subscribe(dir.clone(), Arc::clone(&callback), options.clone())?;

        Ok(Subscription {
            engine: self.clone(),
            dir,
            callback,
            options,
        })
    }

    /// Remove the subscription identified by (directory, callback
    /// reference, options). Other callbacks under the same directory are
    /// untouched; the underlying watch closes when its last subscriber
    /// leaves.
    pub async fn unsubscribe(
        &self,
        dir: &Path,
        callback: &EventCallback,
        options: &Options,
    ) -> Result<()> {
        // The directory may already be gone; fall back to the path as
        // given so a dead subscription can still be released
        let dir = match tokio::fs::canonicalize(dir).await {
            Ok(canonical) => canonical,
            Err(_) => dir.to_path_buf(),
        };
        self.registry.unsubscribe(&dir, callback, options)
    }

    /// Number of directories currently holding a live backend watch
    pub fn active_watches(&self) -> usize {
        self.registry.active_roots()
    }

    /// Tear down every watch and drop all subscriptions
    pub fn shutdown(&self) {
        debug!("engine shutdown");
        self.registry.shutdown();
    }
}

/// Handle returned by [`Engine::subscribe`].
///
/// Dropping the handle does not end the subscription; call
/// [`Subscription::unsubscribe`].
pub struct Subscription {
    engine: Engine,
    dir: PathBuf,
    callback: EventCallback,
    options: Options,
}

impl Subscription {
    /// The canonical directory this subscription watches
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn unsubscribe(self) -> Result<()> {
        self.engine
            .registry
            .unsubscribe(&self.dir, &self.callback, &self.options)
    }
}

/// Scan `dir` and persist its current state to `snapshot_path`.
///
/// Entries matching the ignore rules are excluded from the artifact.
pub async fn write_snapshot(
    dir: &Path,
    snapshot_path: &Path,
    options: &Options,
) -> Result<PathBuf> {
    let dir = resolve_dir(dir).await?;
    let ignore = IgnoreMatcher::compile(&dir, &options.ignore, options.glob_case_insensitive)?;
    let destination = snapshot_path.to_path_buf();

    task::spawn_blocking(move || -> Result<PathBuf> {
        let snapshot = Snapshot::capture(&dir, &ignore)?;
        snapshot.write(&destination)?;
        Ok(destination)
    })
    .await
    .map_err(|e| Error::Backend(format!("snapshot task failed: {e}")))?
}

/// Diff the current state of `dir` against a previously written snapshot.
///
/// A missing or corrupt snapshot artifact diffs against the empty
/// baseline; an invalid `dir` fails fast.
pub async fn get_events_since(
    dir: &Path,
    snapshot_path: &Path,
    options: &Options,
) -> Result<Vec<Event>> {
    let dir = resolve_dir(dir).await?;
    let ignore = IgnoreMatcher::compile(&dir, &options.ignore, options.glob_case_insensitive)?;
    let source = snapshot_path.to_path_buf();

    task::spawn_blocking(move || -> Result<Vec<Event>> {
        let baseline = Snapshot::read(&source);
        Ok(diff(&baseline, scan(&dir), &ignore))
    })
    .await
    .map_err(|e| Error::Backend(format!("diff task failed: {e}")))?
}

/// Canonicalize and validate a watched directory.
///
/// Every public operation goes through this before touching a snapshot
/// artifact or allocating a backend.
async fn resolve_dir(dir: &Path) -> Result<PathBuf> {
    let canonical = tokio::fs::canonicalize(dir).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(dir.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;

    let metadata = tokio::fs::metadata(&canonical).await?;
    if !metadata.is_dir() {
        return Err(Error::NotADirectory(dir.to_path_buf()));
    }

    Ok(canonical)
}
