//! Read-only backend over a packaged asset bundle.
//!
//! A bundle only knows entry names, entry lengths and how to open a
//! sequential reader; there is no random access. Directories are implied by
//! entry names (`icons/app.png` implies `icons`).

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::vfs::blocking;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{Vfs, VfsListing};
use crate::vfs::path as vpath;
use crate::vfs::stream::{MemoryStream, VfsStream};
use crate::vfs::types::{ByteRange, VfsAttribute, VfsOpenMode, VfsStat};

/// Source of packaged, read-only entries.
pub trait AssetBundle: Send + Sync {
    /// Length of `name` in bytes, or `None` if there is no such entry.
    fn entry_len(&self, name: &str) -> io::Result<Option<u64>>;

    /// Sequential reader positioned at the start of `name`.
    fn open_entry(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;

    /// All entry names, when the bundle can enumerate them.
    fn entries(&self) -> Option<Vec<String>> {
        None
    }
}

/// Bundle held in memory, typically built from `include_bytes!`.
#[derive(Debug, Default, Clone)]
pub struct StaticBundle {
    entries: HashMap<String, Arc<[u8]>>,
}

impl StaticBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style.
    pub fn with(mut self, name: &str, data: impl Into<Arc<[u8]>>) -> Self {
        self.insert(name, data);
        self
    }

    pub fn insert(&mut self, name: &str, data: impl Into<Arc<[u8]>>) {
        self.entries
            .insert(vpath::normalize_lossy(name), data.into());
    }
}

impl AssetBundle for StaticBundle {
    fn entry_len(&self, name: &str) -> io::Result<Option<u64>> {
        Ok(self.entries.get(name).map(|d| d.len() as u64))
    }

    fn open_entry(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let data = self
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn entries(&self) -> Option<Vec<String>> {
        Some(self.entries.keys().cloned().collect())
    }
}

/// A directory on disk exposed as a bundle.
///
/// Only regular files count as entries; the tree is walked on demand.
#[derive(Debug, Clone)]
pub struct DirBundle {
    root: PathBuf,
}

impl DirBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, name: &str) -> io::Result<PathBuf> {
        let normalized = vpath::normalize(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::PermissionDenied, name.to_string()))?;
        Ok(self.root.join(normalized))
    }

    fn walk(dir: &Path, prefix: &str, out: &mut Vec<String>) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = vpath::join(prefix, &name);
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                Self::walk(&entry.path(), &rel, out)?;
            } else if file_type.is_file() {
                out.push(rel);
            }
        }
        Ok(())
    }
}

impl AssetBundle for DirBundle {
    fn entry_len(&self, name: &str) -> io::Result<Option<u64>> {
        match std::fs::metadata(self.entry_path(name)?) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn open_entry(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(self.entry_path(name)?)?))
    }

    fn entries(&self) -> Option<Vec<String>> {
        let mut out = Vec::new();
        match Self::walk(&self.root, "", &mut out) {
            Ok(()) => Some(out),
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "cannot enumerate bundle");
                None
            }
        }
    }
}

/// Read-only [`Vfs`] over an [`AssetBundle`].
pub struct AssetBackend {
    bundle: Arc<dyn AssetBundle>,
}

impl std::fmt::Debug for AssetBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetBackend").finish_non_exhaustive()
    }
}

impl AssetBackend {
    pub fn new(bundle: impl AssetBundle + 'static) -> Self {
        Self {
            bundle: Arc::new(bundle),
        }
    }

    pub fn from_arc(bundle: Arc<dyn AssetBundle>) -> Self {
        Self { bundle }
    }

    fn read_only(op: &str, path: &str) -> VfsError {
        VfsError::access_denied(format!("{op} on read-only asset bundle: {path}"))
    }

    /// Bundle entry name for `path`. Every operation resolves through here
    /// so `stat` and `read_range` agree on which entry a path names.
    fn entry_name(path: &str) -> VfsResult<String> {
        vpath::normalize(path)
            .ok_or_else(|| VfsError::access_denied(format!("{path} escapes bundle root")))
    }

    /// Read `[start, end)` of `name` from a sequential reader.
    fn read_entry(bundle: &dyn AssetBundle, name: &str, range: ByteRange) -> VfsResult<Vec<u8>> {
        let len = bundle
            .entry_len(name)
            .map_err(|e| VfsError::from_io(name, e))?
            .ok_or_else(|| VfsError::not_found(name))?;
        let (start, end) = range.clamp(len);

        let mut reader = bundle
            .open_entry(name)
            .map_err(|e| VfsError::from_io(name, e))?;
        let skipped = io::copy(&mut (&mut reader).take(start), &mut io::sink())?;

        let mut out = Vec::with_capacity((end - start) as usize);
        if skipped == start {
            reader.take(end - start).read_to_end(&mut out)?;
        }
        Ok(out)
    }

    /// Entry names under `dir` (normalized, root is empty).
    async fn names_under(&self, dir: &str) -> VfsResult<Option<Vec<String>>> {
        let bundle = self.bundle.clone();
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        blocking::run(move || {
            Ok(bundle.entries().map(|entries| {
                entries
                    .into_iter()
                    .filter(|e| e.starts_with(&prefix))
                    .collect()
            }))
        })
        .await
    }
}

#[async_trait]
impl Vfs for AssetBackend {
    fn name(&self) -> &str {
        "asset"
    }

    async fn open(&self, path: &str, mode: VfsOpenMode) -> VfsResult<VfsStream> {
        if mode.is_write() {
            return Err(Self::read_only("open for write", path));
        }
        let name = Self::entry_name(path)?;
        let data = self.read_range(&name, ByteRange::FULL).await?;
        Ok(VfsStream::new(
            MemoryStream::read_only(data),
            format!("asset({name})"),
        ))
    }

    async fn read_range(&self, path: &str, range: ByteRange) -> VfsResult<Vec<u8>> {
        let bundle = self.bundle.clone();
        let name = Self::entry_name(path)?;
        blocking::run(move || Self::read_entry(bundle.as_ref(), &name, range)).await
    }

    async fn stat(&self, path: &str) -> VfsResult<VfsStat> {
        let name = Self::entry_name(path)?;
        let bundle = self.bundle.clone();
        let len = {
            let name = name.clone();
            blocking::run(move || {
                bundle
                    .entry_len(&name)
                    .map_err(|e| VfsError::from_io(name.clone(), e))
            })
            .await?
        };

        let epoch = SystemTime::UNIX_EPOCH;
        if let Some(size) = len {
            return Ok(VfsStat::existing(path, false, size, epoch, epoch, epoch));
        }

        let is_dir = name.is_empty()
            || self
                .names_under(&name)
                .await?
                .is_some_and(|names| !names.is_empty());
        Ok(if is_dir {
            VfsStat::existing(path, true, 0, epoch, epoch, epoch)
        } else {
            VfsStat::missing(path)
        })
    }

    async fn list(&self, path: &str) -> VfsResult<VfsListing> {
        let dir = Self::entry_name(path)?;
        let children: BTreeSet<String> = self
            .names_under(&dir)
            .await?
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| {
                let rest = if dir.is_empty() {
                    entry.as_str()
                } else {
                    &entry[dir.len() + 1..]
                };
                rest.split('/').next().filter(|s| !s.is_empty()).map(str::to_string)
            })
            .collect();

        let listed: Vec<String> = children
            .into_iter()
            .map(|child| vpath::join(path, &child))
            .collect();
        Ok(Box::pin(futures::stream::iter(listed)))
    }

    async fn set_size(&self, path: &str, _size: u64) -> VfsResult<()> {
        Err(Self::read_only("set_size", path))
    }

    async fn mkdir(&self, path: &str, _attributes: &[VfsAttribute]) -> VfsResult<bool> {
        Err(Self::read_only("mkdir", path))
    }

    async fn touch(&self, path: &str, _mtime: SystemTime, _atime: SystemTime) -> VfsResult<()> {
        Err(Self::read_only("touch", path))
    }

    async fn delete(&self, path: &str) -> VfsResult<bool> {
        Err(Self::read_only("delete", path))
    }

    async fn rmdir(&self, path: &str) -> VfsResult<bool> {
        Err(Self::read_only("rmdir", path))
    }

    async fn rename(&self, src: &str, _dst: &str) -> VfsResult<bool> {
        Err(Self::read_only("rename", src))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::ErrorKind;
    use futures::StreamExt;

    fn bundle() -> AssetBackend {
        AssetBackend::new(
            StaticBundle::new()
                .with("hello.txt", b"hello world".as_slice())
                .with("icons/app.png", b"PNG".as_slice())
                .with("icons/small/app.png", b"png".as_slice()),
        )
    }

    #[tokio::test]
    async fn test_read_range_clamps() {
        let fs = bundle();
        assert_eq!(fs.read_range("/hello.txt", ByteRange::new(6, 10)).await.unwrap(), b"world");
        assert_eq!(fs.read_range("hello.txt", ByteRange::new(-5, 4)).await.unwrap(), b"hello");
        assert!(fs.read_range("hello.txt", ByteRange::new(20, 30)).await.unwrap().is_empty());
        assert!(fs.read_range("hello.txt", ByteRange::new(5, 2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let fs = bundle();
        let err = fs.read_range("nope", ByteRange::FULL).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!fs.stat("nope").await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_open_read_only() {
        let fs = bundle();
        let mut stream = fs.open("hello.txt", VfsOpenMode::Read).await.unwrap();
        assert_eq!(stream.read_to_end().await.unwrap(), b"hello world");
        assert!(stream.write_at(0, b"x").await.is_err());

        let err = fs.open("hello.txt", VfsOpenMode::Write).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_mutations_denied() {
        let fs = bundle();
        assert_eq!(fs.mkdir("d", &[]).await.unwrap_err().kind(), ErrorKind::AccessDenied);
        assert_eq!(fs.delete("hello.txt").await.unwrap_err().kind(), ErrorKind::AccessDenied);
        assert_eq!(fs.set_size("hello.txt", 0).await.unwrap_err().kind(), ErrorKind::AccessDenied);
        assert_eq!(
            fs.rename("hello.txt", "x").await.unwrap_err().kind(),
            ErrorKind::AccessDenied
        );
        let mut handler = crate::process::CapturingHandler::new();
        let err = fs
            .exec("", &["true".to_string()], &HashMap::new(), &mut handler)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
    }

    #[tokio::test]
    async fn test_stat_and_list_directories() {
        let fs = bundle();
        let stat = fs.stat("icons").await.unwrap();
        assert!(stat.exists && stat.is_directory);
        let stat = fs.stat("hello.txt").await.unwrap();
        assert_eq!(stat.size, 11);
        assert_eq!(stat.modified_time, SystemTime::UNIX_EPOCH);

        let mut root: Vec<String> = fs.list("").await.unwrap().collect().await;
        root.sort();
        assert_eq!(root, vec!["hello.txt", "icons"]);
        let icons: Vec<String> = fs.list("icons").await.unwrap().collect().await;
        assert_eq!(icons, vec!["icons/app.png", "icons/small"]);
    }

    #[tokio::test]
    async fn test_unnormalized_paths_name_one_entry() {
        let fs = bundle();
        for path in ["./hello.txt", "icons//app.png", "icons/./app.png", "/icons/small/../app.png"] {
            let stat = fs.stat(path).await.unwrap();
            assert!(stat.exists, "stat {path}");
            let data = fs.read_range(path, ByteRange::FULL).await.unwrap();
            assert_eq!(data.len() as u64, stat.size, "read {path}");
            let mut stream = fs.open(path, VfsOpenMode::Read).await.unwrap();
            assert_eq!(stream.read_to_end().await.unwrap(), data);
        }

        let merged = crate::vfs::MergedVfs::new(vec![Arc::new(bundle()) as Arc<dyn Vfs>]);
        assert_eq!(merged.read_all("icons//app.png").await.unwrap(), b"PNG");

        let err = fs.stat("../hello.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_dir_bundle() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/data.bin"), b"0123456789").unwrap();

        let fs = AssetBackend::new(DirBundle::new(dir.path()));
        assert_eq!(
            fs.read_range("sub/data.bin", ByteRange::with_len(3, 4)).await.unwrap(),
            b"3456"
        );
        assert!(fs.stat("sub").await.unwrap().is_directory);
        assert_eq!(
            fs.read_range("../escape", ByteRange::FULL).await.unwrap_err().kind(),
            ErrorKind::AccessDenied
        );
    }
}
