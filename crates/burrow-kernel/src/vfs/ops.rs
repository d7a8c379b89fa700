//! The backend trait.
//!
//! Every store (local disk, asset bundle, memory) and every decorator
//! (merged, jail) implements [`Vfs`]. Paths are slash-separated strings
//! relative to the backend's own root.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::time::SystemTime;

use super::error::{VfsError, VfsResult};
use super::stream::VfsStream;
use super::types::{ByteRange, FileEvent, VfsAttribute, VfsOpenMode, VfsStat};
use crate::process::ProcessHandler;

/// One-shot, non-restartable sequence of child paths.
pub type VfsListing = BoxStream<'static, String>;

/// Callback receiving directory-change events.
pub type WatchHandler = Box<dyn Fn(FileEvent) + Send + Sync>;

/// Handle returned by a successful `watch`; dropping or closing it stops
/// the watch.
pub struct WatchHandle {
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    pub fn new(on_close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_close: Some(Box::new(on_close)),
        }
    }

    pub fn close(mut self) {
        if let Some(f) = self.on_close.take() {
            f();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(f) = self.on_close.take() {
            f();
        }
    }
}

/// Core VFS operations.
#[async_trait]
pub trait Vfs: Send + Sync {
    /// Short backend name for logs and stream labels.
    fn name(&self) -> &str;

    // ========================================================================
    // Reading
    // ========================================================================

    /// Open a stream on `path`.
    async fn open(&self, path: &str, mode: VfsOpenMode) -> VfsResult<VfsStream>;

    /// Read a clamped byte range without keeping a stream open.
    async fn read_range(&self, path: &str, range: ByteRange) -> VfsResult<Vec<u8>>;

    /// Existence and metadata. A missing path is `Ok` with `exists == false`.
    async fn stat(&self, path: &str) -> VfsResult<VfsStat>;

    /// Child paths (`path/name`) of a directory.
    async fn list(&self, path: &str) -> VfsResult<VfsListing>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Truncate or extend to exactly `size` bytes.
    async fn set_size(&self, path: &str, size: u64) -> VfsResult<()>;

    /// Create a directory and missing ancestors. True if the directory
    /// exists afterwards.
    async fn mkdir(&self, path: &str, attributes: &[VfsAttribute]) -> VfsResult<bool>;

    /// Set modification and access times.
    async fn touch(&self, path: &str, mtime: SystemTime, atime: SystemTime) -> VfsResult<()>;

    /// Remove a file (or empty directory). False on expected failure.
    async fn delete(&self, path: &str) -> VfsResult<bool>;

    /// Remove an empty directory. False on expected failure.
    async fn rmdir(&self, path: &str) -> VfsResult<bool>;

    /// Rename within this backend. False on expected failure.
    async fn rename(&self, src: &str, dst: &str) -> VfsResult<bool>;

    // ========================================================================
    // Optional capabilities
    // ========================================================================

    /// Watch a directory for changes.
    async fn watch(&self, path: &str, handler: WatchHandler) -> VfsResult<WatchHandle> {
        let _ = (path, handler);
        Err(VfsError::Unimplemented("watch"))
    }

    /// Run a command with `path` as working directory, streaming its output
    /// to `handler`. Returns the exit code.
    async fn exec(
        &self,
        path: &str,
        cmd_and_args: &[String],
        env: &HashMap<String, String>,
        handler: &mut dyn ProcessHandler,
    ) -> VfsResult<i32> {
        let _ = (path, cmd_and_args, env, handler);
        Err(VfsError::Unimplemented("exec"))
    }

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> VfsResult<bool> {
        Ok(self.stat(path).await?.exists)
    }

    /// Read entire file contents.
    async fn read_all(&self, path: &str) -> VfsResult<Vec<u8>> {
        self.read_range(path, ByteRange::FULL).await
    }

    /// Replace file contents, creating the file if needed.
    async fn write_all(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        let mut stream = self.open(path, VfsOpenMode::CreateOrTruncate).await?;
        stream.write_all(data).await?;
        stream.close().await
    }
}
