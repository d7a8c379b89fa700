//! Core VFS types.
//!
//! These are shared by every backend: open modes, byte ranges, the stat
//! record, mkdir attributes and the (unimplemented) watch event payload.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VfsOpenMode {
    /// Read-only access to an existing file.
    Read,
    /// Read/write access, creating the file if absent.
    Write,
    /// Like `Write`, with the cursor placed at end-of-file.
    Append,
    /// Read/write, creating the file if absent.
    Create,
    /// Read/write, failing if the file already exists.
    CreateNew,
    /// Read/write, creating the file or truncating it to zero.
    CreateOrTruncate,
}

impl VfsOpenMode {
    /// Whether opening truncates the file to zero length.
    pub fn truncate(self) -> bool {
        matches!(self, VfsOpenMode::CreateOrTruncate)
    }

    /// Whether opening must fail when the file already exists.
    pub fn must_not_exist(self) -> bool {
        matches!(self, VfsOpenMode::CreateNew)
    }

    /// Whether this mode implies write access.
    pub fn is_write(self) -> bool {
        !matches!(self, VfsOpenMode::Read)
    }
}

/// Inclusive byte range `[start, end_inclusive]`.
///
/// Bounds are signed so callers can pass out-of-range values; they are
/// clamped against the resource length, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: i64,
    pub end_inclusive: i64,
}

impl ByteRange {
    /// The whole resource.
    pub const FULL: ByteRange = ByteRange {
        start: 0,
        end_inclusive: i64::MAX,
    };

    pub fn new(start: i64, end_inclusive: i64) -> Self {
        Self {
            start,
            end_inclusive,
        }
    }

    /// Range starting at `start` covering `len` bytes.
    pub fn with_len(start: i64, len: i64) -> Self {
        Self::new(start, start.saturating_add(len).saturating_sub(1))
    }

    /// Clamp against a resource of `len` bytes.
    ///
    /// Returns `(start, end_exclusive)` with `start <= end_exclusive <= len`.
    pub fn clamp(&self, len: u64) -> (u64, u64) {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        let end_exclusive = self.end_inclusive.min(i64::MAX - 1) + 1;
        let end = end_exclusive.clamp(0, len);
        let start = self.start.clamp(0, end);
        (start as u64, end as u64)
    }
}

impl Default for ByteRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// Existence plus metadata for a path.
///
/// `stat` never fails just because a path is missing; it returns a record
/// with `exists == false` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsStat {
    pub path: String,
    pub exists: bool,
    pub is_directory: bool,
    pub size: u64,
    pub create_time: SystemTime,
    pub modified_time: SystemTime,
    pub last_access_time: SystemTime,
}

impl VfsStat {
    /// Stat for an existing file or directory.
    pub fn existing(
        path: impl Into<String>,
        is_directory: bool,
        size: u64,
        create_time: SystemTime,
        modified_time: SystemTime,
        last_access_time: SystemTime,
    ) -> Self {
        Self {
            path: path.into(),
            exists: true,
            is_directory,
            size,
            create_time,
            modified_time,
            last_access_time,
        }
    }

    /// Stat for a path that does not exist. Times are `UNIX_EPOCH`.
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            exists: false,
            is_directory: false,
            size: 0,
            create_time: SystemTime::UNIX_EPOCH,
            modified_time: SystemTime::UNIX_EPOCH,
            last_access_time: SystemTime::UNIX_EPOCH,
        }
    }

    /// Existing regular file.
    pub fn is_file(&self) -> bool {
        self.exists && !self.is_directory
    }

    /// Same record, reported under a different path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// Attributes accepted by `mkdir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VfsAttribute {
    /// Unix permission bits. Ignored where unsupported.
    Mode(u32),
}

/// Kind of change reported by a directory watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEventKind {
    Added,
    Deleted,
    Modified,
    Renamed,
}

/// Directory-change notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: String,
}
