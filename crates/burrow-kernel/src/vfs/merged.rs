//! Merged view over an ordered list of backends.
//!
//! Reads resolve against children in registration order; the first child
//! that reports a path as existing answers. Writes always go to the first
//! child.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use super::error::{VfsError, VfsResult};
use super::ops::{Vfs, VfsListing, WatchHandle, WatchHandler};
use super::stream::VfsStream;
use super::types::{ByteRange, VfsAttribute, VfsOpenMode, VfsStat};
use crate::process::ProcessHandler;

/// Overlay of several backends.
///
/// Children may be appended after construction (e.g. a resource bundle that
/// becomes available late); later calls see them.
pub struct MergedVfs {
    children: RwLock<Vec<Arc<dyn Vfs>>>,
}

impl std::fmt::Debug for MergedVfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .children
            .read()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        f.debug_struct("MergedVfs").field("children", &names).finish()
    }
}

impl Default for MergedVfs {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MergedVfs {
    pub fn new(children: Vec<Arc<dyn Vfs>>) -> Self {
        Self {
            children: RwLock::new(children),
        }
    }

    /// Append a child with the lowest precedence.
    pub fn push(&self, child: Arc<dyn Vfs>) {
        tracing::debug!(child = child.name(), "merged: push");
        self.children.write().push(child);
    }

    pub fn len(&self) -> usize {
        self.children.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.read().is_empty()
    }

    /// Point-in-time copy of the child list; the lock is not held across
    /// awaits.
    fn snapshot(&self) -> Vec<Arc<dyn Vfs>> {
        self.children.read().clone()
    }

    fn first(&self, path: &str) -> VfsResult<Arc<dyn Vfs>> {
        self.children
            .read()
            .first()
            .cloned()
            .ok_or_else(|| VfsError::not_found(format!("{path} (merged backend has no children)")))
    }

    /// First child reporting `path` as existing, with its stat.
    async fn resolve(&self, path: &str) -> VfsResult<Option<(Arc<dyn Vfs>, VfsStat)>> {
        for child in self.snapshot() {
            let stat = child.stat(path).await?;
            if stat.exists {
                return Ok(Some((child, stat)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Vfs for MergedVfs {
    fn name(&self) -> &str {
        "merged"
    }

    async fn open(&self, path: &str, mode: VfsOpenMode) -> VfsResult<VfsStream> {
        if mode.is_write() {
            return self.first(path)?.open(path, mode).await;
        }
        match self.resolve(path).await? {
            Some((child, _)) => child.open(path, mode).await,
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn read_range(&self, path: &str, range: ByteRange) -> VfsResult<Vec<u8>> {
        match self.resolve(path).await? {
            Some((child, _)) => child.read_range(path, range).await,
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn stat(&self, path: &str) -> VfsResult<VfsStat> {
        Ok(match self.resolve(path).await? {
            Some((_, stat)) => stat,
            None => VfsStat::missing(path),
        })
    }

    async fn list(&self, path: &str) -> VfsResult<VfsListing> {
        match self.resolve(path).await? {
            Some((child, _)) => child.list(path).await,
            None => Ok(Box::pin(futures::stream::empty())),
        }
    }

    async fn set_size(&self, path: &str, size: u64) -> VfsResult<()> {
        self.first(path)?.set_size(path, size).await
    }

    async fn mkdir(&self, path: &str, attributes: &[VfsAttribute]) -> VfsResult<bool> {
        self.first(path)?.mkdir(path, attributes).await
    }

    async fn touch(&self, path: &str, mtime: SystemTime, atime: SystemTime) -> VfsResult<()> {
        self.first(path)?.touch(path, mtime, atime).await
    }

    async fn delete(&self, path: &str) -> VfsResult<bool> {
        self.first(path)?.delete(path).await
    }

    async fn rmdir(&self, path: &str) -> VfsResult<bool> {
        self.first(path)?.rmdir(path).await
    }

    async fn rename(&self, src: &str, dst: &str) -> VfsResult<bool> {
        self.first(src)?.rename(src, dst).await
    }

    async fn watch(&self, path: &str, handler: WatchHandler) -> VfsResult<WatchHandle> {
        self.first(path)?.watch(path, handler).await
    }

    async fn exec(
        &self,
        path: &str,
        cmd_and_args: &[String],
        env: &HashMap<String, String>,
        handler: &mut dyn ProcessHandler,
    ) -> VfsResult<i32> {
        self.first(path)?
            .exec(path, cmd_and_args, env, handler)
            .await
    }
}
