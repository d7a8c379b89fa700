//! Jail decorator: confine a backend to a subtree.
//!
//! Every incoming path is normalized first. A `..` that would climb above
//! the jail root is rejected with `AccessDenied` and never reaches the
//! wrapped backend.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use super::error::{VfsError, VfsResult};
use super::ops::{Vfs, VfsListing, WatchHandle, WatchHandler};
use super::path as vpath;
use super::stream::VfsStream;
use super::types::{ByteRange, FileEvent, VfsAttribute, VfsOpenMode, VfsStat};
use crate::process::ProcessHandler;

/// A backend restricted to `root` and everything below it.
pub struct JailVfs {
    inner: Arc<dyn Vfs>,
    root: String,
}

impl std::fmt::Debug for JailVfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JailVfs")
            .field("inner", &self.inner.name())
            .field("root", &self.root)
            .finish()
    }
}

impl JailVfs {
    pub fn new(inner: Arc<dyn Vfs>, root: &str) -> Self {
        Self {
            inner,
            root: vpath::normalize_lossy(root),
        }
    }

    /// Jail root within the wrapped backend.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Map a jail-relative path to the wrapped backend's namespace.
    fn resolve(&self, path: &str) -> VfsResult<String> {
        match vpath::normalize(path) {
            Some(normalized) => Ok(vpath::join(&self.root, &normalized)),
            None => {
                tracing::warn!(path, root = %self.root, "jail escape rejected");
                Err(VfsError::access_denied(format!("{path} escapes jail")))
            }
        }
    }
}

/// Map a wrapped-backend path back into a jail at `root`, if it lies inside.
fn unresolve(root: &str, inner_path: &str) -> Option<String> {
    let normalized = vpath::normalize_lossy(inner_path);
    if root.is_empty() {
        return Some(normalized);
    }
    if normalized == root {
        return Some(String::new());
    }
    normalized
        .strip_prefix(&format!("{root}/"))
        .map(str::to_string)
}

#[async_trait]
impl Vfs for JailVfs {
    fn name(&self) -> &str {
        "jail"
    }

    async fn open(&self, path: &str, mode: VfsOpenMode) -> VfsResult<VfsStream> {
        let inner = self.resolve(path)?;
        self.inner.open(&inner, mode).await
    }

    async fn read_range(&self, path: &str, range: ByteRange) -> VfsResult<Vec<u8>> {
        let inner = self.resolve(path)?;
        self.inner.read_range(&inner, range).await
    }

    async fn stat(&self, path: &str) -> VfsResult<VfsStat> {
        let inner = self.resolve(path)?;
        Ok(self.inner.stat(&inner).await?.with_path(path))
    }

    async fn list(&self, path: &str) -> VfsResult<VfsListing> {
        let inner = self.resolve(path)?;
        let dir = path.to_string();
        let children = self
            .inner
            .list(&inner)
            .await?
            .map(move |child| vpath::join(&dir, vpath::base_name(&child)));
        Ok(Box::pin(children))
    }

    async fn set_size(&self, path: &str, size: u64) -> VfsResult<()> {
        let inner = self.resolve(path)?;
        self.inner.set_size(&inner, size).await
    }

    async fn mkdir(&self, path: &str, attributes: &[VfsAttribute]) -> VfsResult<bool> {
        let inner = self.resolve(path)?;
        self.inner.mkdir(&inner, attributes).await
    }

    async fn touch(&self, path: &str, mtime: SystemTime, atime: SystemTime) -> VfsResult<()> {
        let inner = self.resolve(path)?;
        self.inner.touch(&inner, mtime, atime).await
    }

    async fn delete(&self, path: &str) -> VfsResult<bool> {
        let inner = self.resolve(path)?;
        self.inner.delete(&inner).await
    }

    async fn rmdir(&self, path: &str) -> VfsResult<bool> {
        let inner = self.resolve(path)?;
        self.inner.rmdir(&inner).await
    }

    /// Both endpoints must stay inside the jail.
    async fn rename(&self, src: &str, dst: &str) -> VfsResult<bool> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        self.inner.rename(&from, &to).await
    }

    async fn watch(&self, path: &str, handler: WatchHandler) -> VfsResult<WatchHandle> {
        let inner = self.resolve(path)?;
        let root = self.root.clone();
        let mapped: WatchHandler = Box::new(move |event: FileEvent| {
            if let Some(path) = unresolve(&root, &event.path) {
                handler(FileEvent {
                    kind: event.kind,
                    path,
                });
            }
        });
        self.inner.watch(&inner, mapped).await
    }

    async fn exec(
        &self,
        path: &str,
        cmd_and_args: &[String],
        env: &HashMap<String, String>,
        handler: &mut dyn ProcessHandler,
    ) -> VfsResult<i32> {
        let inner = self.resolve(path)?;
        self.inner.exec(&inner, cmd_and_args, env, handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;
    use crate::vfs::ErrorKind;

    async fn jailed() -> (Arc<MemoryBackend>, JailVfs) {
        let mem = Arc::new(MemoryBackend::new());
        mem.write_all("secret", b"top secret").await.unwrap();
        mem.write_all("root/inside.txt", b"ok").await.unwrap();
        let jail = JailVfs::new(mem.clone(), "/root");
        (mem, jail)
    }

    #[tokio::test]
    async fn test_paths_forwarded_under_root() {
        let (mem, jail) = jailed().await;
        assert_eq!(jail.read_all("inside.txt").await.unwrap(), b"ok");
        assert_eq!(jail.read_all("/sub/../inside.txt").await.unwrap(), b"ok");

        jail.write_all("new.txt", b"n").await.unwrap();
        assert!(mem.exists("root/new.txt").await.unwrap());

        let stat = jail.stat("inside.txt").await.unwrap();
        assert_eq!(stat.path, "inside.txt");
    }

    #[tokio::test]
    async fn test_escape_denied() {
        let (_mem, jail) = jailed().await;
        for path in ["../secret", "a/../../secret", "/.."] {
            let err = jail.read_all(path).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AccessDenied, "path {path}");
        }
        assert_eq!(jail.stat("../secret").await.unwrap_err().kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_rename_needs_both_inside() {
        let (mem, jail) = jailed().await;
        let err = jail.rename("inside.txt", "../out.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        assert!(mem.exists("root/inside.txt").await.unwrap());

        assert!(jail.rename("inside.txt", "moved.txt").await.unwrap());
        assert!(mem.exists("root/moved.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_maps_back() {
        let (_mem, jail) = jailed().await;
        jail.mkdir("d", &[]).await.unwrap();
        jail.write_all("d/f", b"").await.unwrap();

        let names: Vec<String> = jail.list("d").await.unwrap().collect().await;
        assert_eq!(names, vec!["d/f"]);
    }

    #[test]
    fn test_unresolve() {
        assert_eq!(unresolve("a/b", "a/b/c").as_deref(), Some("c"));
        assert_eq!(unresolve("a/b", "a/b").as_deref(), Some(""));
        assert_eq!(unresolve("a/b", "a/bc"), None);
        assert_eq!(unresolve("", "x/y").as_deref(), Some("x/y"));
    }
}
