//! Core building blocks for driftwatch
//!
//! This crate provides the stateless pieces of the change-detection engine:
//! - Canonical event vocabulary (`Event`, `EventKind`)
//! - Ignore rule compilation and matching
//! - Recursive tree scanning with lstat semantics
//! - Snapshot serialization and the snapshot diff algorithm
//!
//! The live subscription machinery (backends, coalescing, routing) lives in
//! the `driftwatch-watcher` crate on top of these types.

pub mod diff;
pub mod error;
pub mod event;
pub mod ignore;
pub mod scan;
pub mod snapshot;

// Re-exports
pub use diff::diff;
pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use ignore::IgnoreMatcher;
pub use scan::{scan, Entry};
pub use snapshot::Snapshot;
