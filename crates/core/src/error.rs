//! Error taxonomy for driftwatch operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by snapshot and subscription operations.
///
/// Setup-time failures (`NotFound`, `NotADirectory`) are returned directly
/// from the public operations before any backend resource is allocated.
/// `Backend` failures occur after a subscription is established and are
/// delivered through the subscription callback, never thrown into unrelated
/// call stacks.
#[derive(Debug, Error)]
pub enum Error {
    /// The watched path does not exist
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// The watched path exists but is not a directory
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The underlying raw event source died or errored after subscribe
    #[error("watch backend failure: {0}")]
    Backend(String),

    /// Filesystem I/O failure outside the cases above
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An ignore pattern failed to compile
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Result type for driftwatch operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
