//! Local filesystem backend.
//!
//! Every operation maps onto blocking `std::fs` calls executed on tokio's
//! blocking pool, so disk latency never stalls the caller's worker thread.
//!
//! This backend does not police `..`; wrap it in a
//! [`JailVfs`](crate::vfs::JailVfs) to confine callers to a subtree.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::process::{self, ProcessHandler};
use crate::vfs::blocking;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{Vfs, VfsListing, WatchHandle, WatchHandler};
use crate::vfs::path as vpath;
use crate::vfs::stream::{StreamBase, VfsStream};
use crate::vfs::types::{ByteRange, VfsAttribute, VfsOpenMode, VfsStat};

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/home/amy/project`, then `read_range("src/main.rs", ..)` reads
/// `/home/amy/project/src/main.rs`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time when it exists
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a backend path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let relative = vpath::normalize_lossy(path);
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

/// Errors that boolean operations report as `false` instead of failing.
fn is_expected_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::DirectoryNotEmpty
            | io::ErrorKind::CrossesDevices
            | io::ErrorKind::NotADirectory
            | io::ErrorKind::IsADirectory
            | io::ErrorKind::AlreadyExists
    )
}

fn bool_op(path: &str, op: &str, result: io::Result<()>) -> VfsResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if is_expected_failure(&e) => {
            tracing::debug!(path, op, error = %e, "local op failed");
            Ok(false)
        }
        Err(e) => Err(VfsError::Io(e)),
    }
}

fn metadata_to_stat(path: &str, meta: &fs::Metadata) -> VfsStat {
    // One host timestamp stands in for all three times.
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    VfsStat::existing(path, meta.is_dir(), meta.len(), modified, modified, modified)
}

#[async_trait]
impl Vfs for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn open(&self, path: &str, mode: VfsOpenMode) -> VfsResult<VfsStream> {
        let full = self.resolve(path);
        let label = format!("local({})", full.display());
        let vfs_path = path.to_string();

        let (file, position) = blocking::run(move || {
            if mode.must_not_exist() && full.exists() {
                return Err(VfsError::already_exists(vfs_path));
            }

            let file = if mode.is_write() {
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .create_new(mode.must_not_exist())
                    .truncate(false)
                    .open(&full)
            } else {
                File::open(&full)
            }
            .map_err(|e| VfsError::from_io(&vfs_path, e))?;

            if mode.truncate() {
                file.set_len(0)?;
            }
            let position = if mode == VfsOpenMode::Append {
                file.metadata()?.len()
            } else {
                0
            };
            Ok((file, position))
        })
        .await?;

        Ok(VfsStream::new(LocalStream::new(file), label).with_position(position))
    }

    async fn read_range(&self, path: &str, range: ByteRange) -> VfsResult<Vec<u8>> {
        let full = self.resolve(path);
        let vfs_path = path.to_string();
        blocking::run(move || {
            let mut file = File::open(&full).map_err(|e| VfsError::from_io(&vfs_path, e))?;
            let file_len = file.metadata()?.len();
            let (start, end) = range.clamp(file_len);

            file.seek(SeekFrom::Start(start))?;
            let mut out = Vec::with_capacity((end - start) as usize);
            // A short read truncates the result.
            file.take(end - start).read_to_end(&mut out)?;
            Ok(out)
        })
        .await
    }

    async fn stat(&self, path: &str) -> VfsResult<VfsStat> {
        let full = self.resolve(path);
        let vfs_path = path.to_string();
        blocking::run(move || match fs::metadata(&full) {
            Ok(meta) => Ok(metadata_to_stat(&vfs_path, &meta)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(VfsStat::missing(vfs_path))
            }
            Err(e) => Err(VfsError::Io(e)),
        })
        .await
    }

    async fn list(&self, path: &str) -> VfsResult<VfsListing> {
        let full = self.resolve(path);
        let parent = path.to_string();
        let children = blocking::run(move || {
            let dir = match fs::read_dir(&full) {
                Ok(dir) => dir,
                Err(e) if is_expected_failure(&e) => {
                    tracing::debug!(path = %full.display(), error = %e, "listing as empty");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(VfsError::Io(e)),
            };

            let mut children = Vec::new();
            for entry in dir {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                children.push(vpath::join(&parent, &name));
            }
            Ok(children)
        })
        .await?;

        Ok(Box::pin(futures::stream::iter(children)))
    }

    async fn set_size(&self, path: &str, size: u64) -> VfsResult<()> {
        let full = self.resolve(path);
        let vfs_path = path.to_string();
        blocking::run(move || {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&full)
                .map_err(|e| VfsError::from_io(&vfs_path, e))?;
            file.set_len(size)?;
            Ok(())
        })
        .await
    }

    async fn mkdir(&self, path: &str, attributes: &[VfsAttribute]) -> VfsResult<bool> {
        let full = self.resolve(path);
        let mode = attributes.iter().find_map(|a| match a {
            VfsAttribute::Mode(m) => Some(*m),
        });

        blocking::run(move || {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                if let Some(mode) = mode {
                    builder.mode(mode);
                }
            }
            #[cfg(not(unix))]
            let _ = mode;

            if let Err(e) = builder.create(&full) {
                tracing::debug!(path = %full.display(), error = %e, "mkdir failed");
            }
            Ok(full.is_dir())
        })
        .await
    }

    async fn touch(&self, path: &str, mtime: SystemTime, atime: SystemTime) -> VfsResult<()> {
        let full = self.resolve(path);
        let vfs_path = path.to_string();
        blocking::run(move || {
            let file = File::open(&full).map_err(|e| VfsError::from_io(&vfs_path, e))?;
            file.set_times(FileTimes::new().set_modified(mtime).set_accessed(atime))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, path: &str) -> VfsResult<bool> {
        let full = self.resolve(path);
        let vfs_path = path.to_string();
        blocking::run(move || {
            let result = if full.is_dir() {
                fs::remove_dir(&full)
            } else {
                fs::remove_file(&full)
            };
            bool_op(&vfs_path, "delete", result)
        })
        .await
    }

    async fn rmdir(&self, path: &str) -> VfsResult<bool> {
        let full = self.resolve(path);
        let vfs_path = path.to_string();
        blocking::run(move || bool_op(&vfs_path, "rmdir", fs::remove_dir(&full))).await
    }

    async fn rename(&self, src: &str, dst: &str) -> VfsResult<bool> {
        let from = self.resolve(src);
        let to = self.resolve(dst);
        let vfs_path = src.to_string();
        blocking::run(move || bool_op(&vfs_path, "rename", fs::rename(&from, &to))).await
    }

    async fn watch(&self, path: &str, handler: WatchHandler) -> VfsResult<WatchHandle> {
        let _ = (path, handler);
        Err(VfsError::Unimplemented("watch"))
    }

    async fn exec(
        &self,
        path: &str,
        cmd_and_args: &[String],
        env: &HashMap<String, String>,
        handler: &mut dyn ProcessHandler,
    ) -> VfsResult<i32> {
        process::exec(self.resolve(path), cmd_and_args, env, handler).await
    }
}

/// Stream over an open host file.
///
/// Seek and transfer happen under one lock so positional calls from
/// different tasks cannot interleave between the two.
struct LocalStream {
    file: Arc<Mutex<Option<File>>>,
}

impl LocalStream {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(Some(file))),
        }
    }

    async fn with_file<T, F>(&self, f: F) -> VfsResult<T>
    where
        F: FnOnce(&mut File) -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let file = self.file.clone();
        blocking::run(move || {
            let mut guard = file.lock();
            let file = guard.as_mut().ok_or(VfsError::Closed)?;
            Ok(f(file)?)
        })
        .await
    }
}

#[async_trait]
impl StreamBase for LocalStream {
    async fn read(&self, position: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let len = buf.len();
        let data = self
            .with_file(move |file| {
                file.seek(SeekFrom::Start(position))?;
                let mut tmp = vec![0u8; len];
                let n = file.read(&mut tmp)?;
                tmp.truncate(n);
                Ok(tmp)
            })
            .await?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    async fn write(&self, position: u64, buf: &[u8]) -> VfsResult<usize> {
        let data = buf.to_vec();
        self.with_file(move |file| {
            file.seek(SeekFrom::Start(position))?;
            file.write_all(&data)?;
            Ok(data.len())
        })
        .await
    }

    async fn set_len(&self, len: u64) -> VfsResult<()> {
        self.with_file(move |file| file.set_len(len)).await
    }

    async fn len(&self) -> VfsResult<u64> {
        self.with_file(|file| Ok(file.metadata()?.len())).await
    }

    async fn close(&self) -> VfsResult<()> {
        let file = self.file.lock().take().ok_or(VfsError::Closed)?;
        // Dropping the handle closes it; flushing first surfaces write errors.
        blocking::run(move || {
            let mut file = file;
            file.flush()?;
            Ok(())
        })
        .await
    }
}
