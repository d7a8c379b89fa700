//! Path handle bound to a backend.

use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use super::error::VfsResult;
use super::jail::JailVfs;
use super::ops::{Vfs, WatchHandle, WatchHandler};
use super::path as vpath;
use super::stream::VfsStream;
use super::types::{ByteRange, VfsAttribute, VfsOpenMode, VfsStat};
use crate::process::ProcessHandler;

/// A path within a particular backend.
///
/// Cheap to clone; all operations forward to the backend.
#[derive(Clone)]
pub struct VfsFile {
    vfs: Arc<dyn Vfs>,
    path: String,
}

impl std::fmt::Debug for VfsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.vfs.name(), self.path)
    }
}

impl VfsFile {
    pub fn new(vfs: Arc<dyn Vfs>, path: impl Into<String>) -> Self {
        Self {
            vfs,
            path: path.into(),
        }
    }

    /// Handle on the backend root.
    pub fn root(vfs: Arc<dyn Vfs>) -> Self {
        Self::new(vfs, "")
    }

    pub fn vfs(&self) -> &Arc<dyn Vfs> {
        &self.vfs
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn child(&self, name: &str) -> Self {
        Self::new(self.vfs.clone(), vpath::join(&self.path, name))
    }

    pub fn parent(&self) -> Self {
        Self::new(self.vfs.clone(), vpath::parent(&self.path))
    }

    pub fn base_name(&self) -> &str {
        vpath::base_name(&self.path)
    }

    /// A handle at the root of a jail confined to this path.
    pub fn jail(&self) -> Self {
        Self::root(Arc::new(JailVfs::new(self.vfs.clone(), &self.path)))
    }

    pub async fn open(&self, mode: VfsOpenMode) -> VfsResult<VfsStream> {
        self.vfs.open(&self.path, mode).await
    }

    pub async fn read_range(&self, range: ByteRange) -> VfsResult<Vec<u8>> {
        self.vfs.read_range(&self.path, range).await
    }

    pub async fn read_all(&self) -> VfsResult<Vec<u8>> {
        self.vfs.read_all(&self.path).await
    }

    /// Whole file as UTF-8, lossily.
    pub async fn read_string(&self) -> VfsResult<String> {
        let data = self.read_all().await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    pub async fn write_all(&self, data: impl AsRef<[u8]>) -> VfsResult<()> {
        self.vfs.write_all(&self.path, data.as_ref()).await
    }

    pub async fn stat(&self) -> VfsResult<VfsStat> {
        self.vfs.stat(&self.path).await
    }

    pub async fn exists(&self) -> VfsResult<bool> {
        self.vfs.exists(&self.path).await
    }

    pub async fn is_dir(&self) -> VfsResult<bool> {
        let stat = self.stat().await?;
        Ok(stat.exists && stat.is_directory)
    }

    pub async fn size(&self) -> VfsResult<u64> {
        Ok(self.stat().await?.size)
    }

    /// Children as handles on the same backend.
    pub async fn list(&self) -> VfsResult<BoxStream<'static, VfsFile>> {
        let vfs = self.vfs.clone();
        let listing = self.vfs.list(&self.path).await?;
        Ok(listing
            .map(move |path| VfsFile::new(vfs.clone(), path))
            .boxed())
    }

    /// Child names, collected.
    pub async fn list_names(&self) -> VfsResult<Vec<String>> {
        let listing = self.vfs.list(&self.path).await?;
        Ok(listing
            .map(|path| vpath::base_name(&path).to_string())
            .collect()
            .await)
    }

    pub async fn mkdir(&self) -> VfsResult<bool> {
        self.vfs.mkdir(&self.path, &[]).await
    }

    pub async fn mkdir_with(&self, attributes: &[VfsAttribute]) -> VfsResult<bool> {
        self.vfs.mkdir(&self.path, attributes).await
    }

    pub async fn touch(&self, mtime: SystemTime, atime: SystemTime) -> VfsResult<()> {
        self.vfs.touch(&self.path, mtime, atime).await
    }

    pub async fn delete(&self) -> VfsResult<bool> {
        self.vfs.delete(&self.path).await
    }

    pub async fn rmdir(&self) -> VfsResult<bool> {
        self.vfs.rmdir(&self.path).await
    }

    /// Rename to `dst` within the same backend.
    pub async fn rename_to(&self, dst: &str) -> VfsResult<bool> {
        self.vfs.rename(&self.path, dst).await
    }

    pub async fn set_size(&self, size: u64) -> VfsResult<()> {
        self.vfs.set_size(&self.path, size).await
    }

    /// Run a command with this path as working directory.
    pub async fn exec(
        &self,
        cmd_and_args: &[String],
        env: &HashMap<String, String>,
        handler: &mut dyn ProcessHandler,
    ) -> VfsResult<i32> {
        self.vfs.exec(&self.path, cmd_and_args, env, handler).await
    }

    pub async fn watch(&self, handler: WatchHandler) -> VfsResult<WatchHandle> {
        self.vfs.watch(&self.path, handler).await
    }
}
