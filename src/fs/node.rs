//! Namespace node model.
//!
//! Nodes are static configuration built once at filesystem construction.
//! Resource views (`/instances/<id>` and friends) are deliberately absent:
//! they are derived per request from the backing cache entry, never stored.

use chrono::{DateTime, Utc};

use crate::store::CacheEntry;

/// Directory type bit of `st_mode`.
pub const S_IFDIR: u32 = 0o040_000;
/// Regular-file type bit of `st_mode`.
pub const S_IFREG: u32 = 0o100_000;

/// Permission bits every node carries.
pub const DEFAULT_MODE: u32 = 0o755;

/// Nominal size reported for directories.
const DIR_SIZE: u64 = 4096;

/// Stat-shaped attributes of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsAttributes {
    /// Type and permission bits.
    pub mode: u32,
    /// Link count (2 for directories, 1 for files).
    pub nlink: u32,
    /// Content size in bytes.
    pub size: u64,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub atime: DateTime<Utc>,
    /// Owner: the mounting process.
    pub uid: u32,
    pub gid: u32,
}

impl FsAttributes {
    /// Attributes of a directory node.
    pub fn dir() -> Self {
        let now = Utc::now();
        Self {
            mode: S_IFDIR | DEFAULT_MODE,
            nlink: 2,
            size: DIR_SIZE,
            ctime: now,
            mtime: now,
            atime: now,
            uid: process_uid(),
            gid: process_gid(),
        }
    }

    /// Attributes of a regular file node of the given size.
    pub fn file(size: u64) -> Self {
        let now = Utc::now();
        Self {
            mode: S_IFREG | DEFAULT_MODE,
            nlink: 1,
            size,
            ctime: now,
            mtime: now,
            atime: now,
            uid: process_uid(),
            gid: process_gid(),
        }
    }

    /// Attributes of a resource view, synthesized from its cache entry:
    /// size is the cached byte length, timestamps are the entry's.
    pub fn for_entry(entry: &CacheEntry) -> Self {
        Self {
            mode: S_IFREG | DEFAULT_MODE,
            nlink: 1,
            size: entry.size as u64,
            ctime: entry.created_at,
            mtime: entry.updated_at,
            atime: entry.updated_at,
            uid: process_uid(),
            gid: process_gid(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFDIR == S_IFDIR
    }
}

#[cfg(unix)]
fn process_uid() -> u32 {
    // SAFETY: getuid is always safe to call.
    unsafe { libc::getuid() }
}

#[cfg(unix)]
fn process_gid() -> u32 {
    // SAFETY: getgid is always safe to call.
    unsafe { libc::getgid() }
}

#[cfg(not(unix))]
fn process_uid() -> u32 {
    0
}

#[cfg(not(unix))]
fn process_gid() -> u32 {
    0
}

/// Which proxy cache a dynamic directory lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Instances,
    Images,
    Requests,
}

/// Which proxy operation a write to an action file triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    RunInstances,
    DescribeInstances,
    TerminateInstances,
    DescribeImages,
    /// No-argument describe of instances and images.
    Refresh,
}

/// One configured namespace node.
#[derive(Debug)]
pub enum Node {
    /// Directory with a fixed child list.
    Dir {
        attrs: FsAttributes,
        children: Vec<String>,
    },
    /// Directory whose children are the live key set of a proxy cache.
    DynamicDir {
        attrs: FsAttributes,
        source: CacheSource,
    },
    /// Regular file with fixed content.
    File {
        attrs: FsAttributes,
        data: Vec<u8>,
    },
    /// Write-to-trigger file; `None` means the write is accepted but inert.
    Action {
        attrs: FsAttributes,
        action: Option<ActionKind>,
    },
}

impl Node {
    pub fn dir() -> Self {
        Node::Dir {
            attrs: FsAttributes::dir(),
            children: Vec::new(),
        }
    }

    pub fn dynamic_dir(source: CacheSource) -> Self {
        Node::DynamicDir {
            attrs: FsAttributes::dir(),
            source,
        }
    }

    pub fn file(data: Vec<u8>) -> Self {
        Node::File {
            attrs: FsAttributes::file(data.len() as u64),
            data,
        }
    }

    pub fn action(action: Option<ActionKind>) -> Self {
        Node::Action {
            attrs: FsAttributes::file(0),
            action,
        }
    }

    pub fn attrs(&self) -> &FsAttributes {
        match self {
            Node::Dir { attrs, .. }
            | Node::DynamicDir { attrs, .. }
            | Node::File { attrs, .. }
            | Node::Action { attrs, .. } => attrs,
        }
    }
}
