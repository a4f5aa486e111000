//! Subscription multiplexing
//!
//! One engine instance owns the directory → backend-handle map. Multiple
//! subscriptions on the same canonical root share a single raw source and a
//! single worker task; each subscription keeps its own ignore rules and its
//! own coalescing buffer, so two subscribers to one directory can receive
//! different event sets from the same underlying notifications. The backend
//! opens on the first subscriber and closes on the last unsubscribe.

use crate::backend::{self, RawMessage, RawReceiver};
use crate::coalesce::CoalescingBuffer;
use crate::normalize::normalize;
use crate::{EventCallback, Options};
use ahash::AHashMap;
use dashmap::DashMap;
use driftwatch_core::{Error, Event, EventKind, IgnoreMatcher, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// One subscriber's routing entry under a watched root
#[derive(Clone)]
struct Route {
    id: u64,
    ignore: Arc<IgnoreMatcher>,
    options: Options,
    callback: EventCallback,
}

/// Shared state for one watched root: the live backend plus the fan-out
/// table its worker reads
struct WatchedRoot {
    // Held for its Drop; dropping the source stops the raw stream and the
    // worker drains out
    _source: Box<dyn backend::RawSource>,
    routes: Arc<RwLock<Vec<Route>>>,
}

/// The directory → backend-handle registry
#[derive(Default)]
pub(crate) struct Registry {
    roots: DashMap<PathBuf, WatchedRoot>,
    next_id: AtomicU64,
}

impl Registry {
    /// Register a subscription, creating the root's backend on first use.
    ///
    /// The directory must already be canonicalized and validated by the
    /// caller; no backend resource is allocated for an invalid root.
    pub(crate) fn subscribe(
        &self,
        dir: PathBuf,
        callback: EventCallback,
        options: Options,
    ) -> Result<u64> {
        let ignore = Arc::new(IgnoreMatcher::compile(
            &dir,
            &options.ignore,
            options.glob_case_insensitive,
        )?);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let route = Route {
            id,
            ignore,
            options,
            callback,
        };

        match self.roots.entry(dir.clone()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                occupied.get().routes.write().push(route);
                trace!(dir = %dir.display(), id, "joined existing watch");
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                let source = backend::spawn(
                    route.options.backend,
                    &dir,
                    route.options.poll_interval,
                    tx,
                )?;

                let capabilities = source.capabilities();
                let routes = Arc::new(RwLock::new(vec![route]));
                tokio::spawn(worker(dir.clone(), rx, Arc::clone(&routes)));

                vacant.insert(WatchedRoot {
                    _source: source,
                    routes,
                });
                debug!(
                    dir = %dir.display(),
                    id,
                    native_rename = capabilities.native_rename,
                    "watch opened"
                );
            }
        }

        Ok(id)
    }

    /// Remove the subscription matching (dir, callback identity, options),
    /// closing the root's backend when its last subscriber leaves.
    pub(crate) fn unsubscribe(
        &self,
        dir: &Path,
        callback: &EventCallback,
        options: &Options,
    ) -> Result<()> {
        if let Some(root) = self.roots.get(dir) {
            let mut routes = root.routes.write();
            if let Some(position) = routes.iter().position(|route| {
                Arc::ptr_eq(&route.callback, callback) && route.options == *options
            }) {
                let removed = routes.remove(position);
                trace!(dir = %dir.display(), id = removed.id, "subscription removed");
            }
        }

        if self
            .roots
            .remove_if(dir, |_, root| root.routes.read().is_empty())
            .is_some()
        {
            debug!(dir = %dir.display(), "watch closed");
        }

        Ok(())
    }

    /// Number of directories with a live backend watch
    pub(crate) fn active_roots(&self) -> usize {
        self.roots.len()
    }

    /// Tear down every watch explicitly
    pub(crate) fn shutdown(&self) {
        self.roots.clear();
    }
}

/// Per-root event loop: drain a burst from the serialized raw channel,
/// normalize it once, then fan out through each route's ignore rules into
/// that route's own coalescing buffer.
async fn worker(
    dir: PathBuf,
    mut rx: RawReceiver,
    routes: Arc<RwLock<Vec<Route>>>,
) {
    let mut buffers: AHashMap<u64, CoalescingBuffer> = AHashMap::new();

    while let Some(first) = rx.recv().await {
        let mut batch = Vec::new();
        let mut failure = None;
        let mut queue = vec![first];

        // A burst is over when the channel momentarily empties or the
        // backend marks an explicit batch boundary
        loop {
            for message in queue.drain(..) {
                match message {
                    RawMessage::Event(raw) => batch.push(raw),
                    RawMessage::EndOfBatch => {
                        dispatch(&batch, &routes, &mut buffers);
                        batch.clear();
                    }
                    RawMessage::Error(reason) => failure = Some(reason),
                }
            }
            match rx.try_recv() {
                Ok(message) => queue.push(message),
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            dispatch(&batch, &routes, &mut buffers);
        }

        if let Some(reason) = failure {
            error!(dir = %dir.display(), %reason, "backend failure, notifying subscribers");
            for route in routes.read().iter() {
                (route.callback)(Err(Error::Backend(reason.clone())));
            }
        }
    }

    trace!(dir = %dir.display(), "watch worker exited");
}

fn dispatch(
    batch: &[crate::backend::RawEvent],
    routes: &Arc<RwLock<Vec<Route>>>,
    buffers: &mut AHashMap<u64, CoalescingBuffer>,
) {
    let events = normalize(batch);
    if events.is_empty() {
        return;
    }

    let snapshot: Vec<Route> = routes.read().clone();

    // Buffers are owned here, one per live route; drop the ones whose
    // subscription has gone
    buffers.retain(|id, _| snapshot.iter().any(|route| route.id == *id));

    for route in &snapshot {
        let buffer = buffers.entry(route.id).or_default();

        for event in &events {
            match filtered(event, &route.ignore) {
                Filtered::Keep => buffer.apply(event),
                Filtered::AsCreate => {
                    buffer.apply(&Event::create(&event.path).with_ino(event.ino))
                }
                Filtered::Drop => {}
            }
        }

        let flushed = buffer.flush();
        if !flushed.is_empty() {
            (route.callback)(Ok(flushed));
        }
    }
}

enum Filtered {
    Keep,
    /// Rename whose origin is ignored: the destination simply appears
    AsCreate,
    Drop,
}

fn filtered(event: &Event, ignore: &IgnoreMatcher) -> Filtered {
    if ignore.is_ignored(&event.path) {
        return Filtered::Drop;
    }
    if let EventKind::Rename { from } = &event.kind {
        if ignore.is_ignored(from) {
            return Filtered::AsCreate;
        }
    }
    Filtered::Keep
}
