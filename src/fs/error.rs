//! Filesystem-facing error taxonomy.

use crate::store::StoreError;

#[cfg(unix)]
use libc::{EACCES, EIO, ENOENT};

#[cfg(not(unix))]
const ENOENT: i32 = 2;
#[cfg(not(unix))]
const EIO: i32 = 5;
#[cfg(not(unix))]
const EACCES: i32 = 13;

/// Errors the namespace layer reports to the filesystem driver.
///
/// Remote failures never show up here: the proxy turns them into request
/// records. What remains is path resolution, write-shape violations, and
/// payload parsing.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Path or cache key absent at resolution time.
    #[error("no such entry: {0}")]
    NotFound(String),

    /// Disallowed operation shape, e.g. a write at a non-zero offset.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Write payload that does not parse into the operation's arguments.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Store invariant violation; a bug in the node/cache binding.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FsError {
    /// The errno the protocol adapter should answer with.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => ENOENT,
            FsError::PermissionDenied(_) => EACCES,
            FsError::MalformedPayload(_) => EIO,
            FsError::Store(_) => EIO,
        }
    }
}
