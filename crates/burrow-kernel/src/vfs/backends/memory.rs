//! In-memory filesystem backend.
//!
//! Used for the cache root and for testing. All data is ephemeral.

use async_trait::async_trait;
use parking_lot::RwLock as BufferLock;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::{Vfs, VfsListing};
use crate::vfs::path as vpath;
use crate::vfs::stream::{MemoryStream, SharedBuffer, VfsStream, resize_buffer};
use crate::vfs::types::{ByteRange, VfsAttribute, VfsOpenMode, VfsStat};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File {
        data: SharedBuffer,
        times: Times,
    },
    Directory {
        times: Times,
    },
}

#[derive(Debug, Clone, Copy)]
struct Times {
    created: SystemTime,
    modified: SystemTime,
    accessed: SystemTime,
}

impl Times {
    fn now() -> Self {
        let now = SystemTime::now();
        Self {
            created: now,
            modified: now,
            accessed: now,
        }
    }
}

impl Entry {
    fn new_file() -> Self {
        Entry::File {
            data: Arc::new(BufferLock::new(Vec::new())),
            times: Times::now(),
        }
    }

    fn new_directory() -> Self {
        Entry::Directory {
            times: Times::now(),
        }
    }

    fn times_mut(&mut self) -> &mut Times {
        match self {
            Entry::File { times, .. } => times,
            Entry::Directory { times } => times,
        }
    }

    fn stat(&self, path: &str) -> VfsStat {
        match self {
            Entry::File { data, times } => VfsStat::existing(
                path,
                false,
                data.read().len() as u64,
                times.created,
                times.modified,
                times.accessed,
            ),
            Entry::Directory { times } => VfsStat::existing(
                path,
                true,
                0,
                times.created,
                times.modified,
                times.accessed,
            ),
        }
    }
}

/// In-memory filesystem backend.
///
/// Thread-safe via internal `RwLock`. All data is lost when dropped.
/// Streams opened on a file share its buffer, so their writes are visible
/// to later `read_range` calls.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(String::new(), Entry::new_directory());
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn read_entries(
        &self,
    ) -> VfsResult<std::sync::RwLockReadGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .read()
            .map_err(|_| VfsError::other("lock poisoned"))
    }

    fn write_entries(
        &self,
    ) -> VfsResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .write()
            .map_err(|_| VfsError::other("lock poisoned"))
    }

    /// Ensure all parent directories exist. Fails if a parent is a file.
    fn ensure_parents(entries: &mut HashMap<String, Entry>, path: &str) -> VfsResult<()> {
        let mut current = String::new();
        let parent = vpath::parent(path);
        if parent.is_empty() {
            return Ok(());
        }
        for segment in parent.split('/') {
            current = vpath::join(&current, segment);
            match entries
                .entry(current.clone())
                .or_insert_with(Entry::new_directory)
            {
                Entry::Directory { .. } => {}
                Entry::File { .. } => return Err(VfsError::not_a_directory(current)),
            }
        }
        Ok(())
    }

    fn has_children(entries: &HashMap<String, Entry>, dir: &str) -> bool {
        entries
            .keys()
            .any(|k| !k.is_empty() && k != dir && vpath::parent(k) == dir)
    }
}

#[async_trait]
impl Vfs for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, path: &str, mode: VfsOpenMode) -> VfsResult<VfsStream> {
        let normalized = vpath::normalize_lossy(path);
        let mut entries = self.write_entries()?;

        let data = match entries.get(&normalized) {
            Some(_) if mode.must_not_exist() => {
                return Err(VfsError::already_exists(normalized));
            }
            Some(Entry::Directory { .. }) => {
                return Err(VfsError::is_a_directory(normalized));
            }
            Some(Entry::File { data, .. }) => data.clone(),
            None if !mode.is_write() => return Err(VfsError::not_found(normalized)),
            None => {
                Self::ensure_parents(&mut entries, &normalized)?;
                let data: SharedBuffer = Arc::new(BufferLock::new(Vec::new()));
                entries.insert(
                    normalized.clone(),
                    Entry::File {
                        data: data.clone(),
                        times: Times::now(),
                    },
                );
                data
            }
        };

        if mode.truncate() {
            data.write().clear();
        }
        let position = if mode == VfsOpenMode::Append {
            data.read().len() as u64
        } else {
            0
        };

        let stream = if mode.is_write() {
            MemoryStream::new(data)
        } else {
            MemoryStream::new(data).into_read_only()
        };
        Ok(VfsStream::new(stream, format!("memory({normalized})")).with_position(position))
    }

    async fn read_range(&self, path: &str, range: ByteRange) -> VfsResult<Vec<u8>> {
        let normalized = vpath::normalize_lossy(path);
        let entries = self.read_entries()?;

        match entries.get(&normalized) {
            Some(Entry::File { data, .. }) => {
                let data = data.read();
                let (start, end) = range.clamp(data.len() as u64);
                Ok(data[start as usize..end as usize].to_vec())
            }
            Some(Entry::Directory { .. }) => Err(VfsError::is_a_directory(normalized)),
            None => Err(VfsError::not_found(normalized)),
        }
    }

    async fn stat(&self, path: &str) -> VfsResult<VfsStat> {
        let normalized = vpath::normalize_lossy(path);
        let entries = self.read_entries()?;
        Ok(match entries.get(&normalized) {
            Some(entry) => entry.stat(path),
            None => VfsStat::missing(path),
        })
    }

    async fn list(&self, path: &str) -> VfsResult<VfsListing> {
        let normalized = vpath::normalize_lossy(path);
        let entries = self.read_entries()?;

        let children: Vec<String> = match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => entries
                .keys()
                .filter(|k| !k.is_empty() && k.as_str() != normalized && vpath::parent(k) == normalized)
                .map(|k| vpath::join(path, vpath::base_name(k)))
                .collect(),
            _ => Vec::new(),
        };

        Ok(Box::pin(futures::stream::iter(children)))
    }

    async fn set_size(&self, path: &str, size: u64) -> VfsResult<()> {
        let normalized = vpath::normalize_lossy(path);
        let mut entries = self.write_entries()?;

        if !entries.contains_key(&normalized) {
            Self::ensure_parents(&mut entries, &normalized)?;
            entries.insert(normalized.clone(), Entry::new_file());
        }
        match entries.get_mut(&normalized) {
            Some(Entry::File { data, times }) => {
                resize_buffer(&mut data.write(), size)?;
                times.modified = SystemTime::now();
                Ok(())
            }
            _ => Err(VfsError::is_a_directory(normalized)),
        }
    }

    async fn mkdir(&self, path: &str, _attributes: &[VfsAttribute]) -> VfsResult<bool> {
        let normalized = vpath::normalize_lossy(path);
        let mut entries = self.write_entries()?;

        if Self::ensure_parents(&mut entries, &normalized).is_err() {
            return Ok(false);
        }
        let entry = entries
            .entry(normalized)
            .or_insert_with(Entry::new_directory);
        Ok(matches!(entry, Entry::Directory { .. }))
    }

    async fn touch(&self, path: &str, mtime: SystemTime, atime: SystemTime) -> VfsResult<()> {
        let normalized = vpath::normalize_lossy(path);
        let mut entries = self.write_entries()?;

        let entry = entries
            .get_mut(&normalized)
            .ok_or_else(|| VfsError::not_found(normalized.clone()))?;
        let times = entry.times_mut();
        times.modified = mtime;
        times.accessed = atime;
        Ok(())
    }

    async fn delete(&self, path: &str) -> VfsResult<bool> {
        let normalized = vpath::normalize_lossy(path);
        if normalized.is_empty() {
            return Ok(false);
        }
        let mut entries = self.write_entries()?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) if Self::has_children(&entries, &normalized) => Ok(false),
            Some(_) => {
                entries.remove(&normalized);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rmdir(&self, path: &str) -> VfsResult<bool> {
        let normalized = vpath::normalize_lossy(path);
        if normalized.is_empty() {
            return Ok(false);
        }
        let mut entries = self.write_entries()?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) if !Self::has_children(&entries, &normalized) => {
                entries.remove(&normalized);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rename(&self, src: &str, dst: &str) -> VfsResult<bool> {
        let from = vpath::normalize_lossy(src);
        let to = vpath::normalize_lossy(dst);
        if from.is_empty() || to.is_empty() || to.starts_with(&format!("{from}/")) {
            return Ok(false);
        }
        let mut entries = self.write_entries()?;

        // Same rules as a host rename: a file may replace a file and a
        // directory may replace an empty directory.
        match (entries.get(&from), entries.get(&to)) {
            (None, _) => return Ok(false),
            _ if from == to => return Ok(true),
            (Some(Entry::File { .. }), Some(Entry::Directory { .. }))
            | (Some(Entry::Directory { .. }), Some(Entry::File { .. })) => return Ok(false),
            (Some(Entry::Directory { .. }), Some(Entry::Directory { .. }))
                if Self::has_children(&entries, &to) =>
            {
                return Ok(false);
            }
            _ => {}
        }
        if Self::ensure_parents(&mut entries, &to).is_err() {
            return Ok(false);
        }
        let Some(entry) = entries.remove(&from) else {
            return Ok(false);
        };

        // Directories carry their whole subtree along.
        if matches!(entry, Entry::Directory { .. }) {
            let prefix = format!("{from}/");
            let children: Vec<String> = entries
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();

            for child in children {
                if let Some(child_entry) = entries.remove(&child) {
                    let moved = vpath::join(&to, &child[prefix.len()..]);
                    entries.insert(moved, child_entry);
                }
            }
        }

        entries.insert(to, entry);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn listed(fs: &MemoryBackend, path: &str) -> Vec<String> {
        let mut names: Vec<String> = fs.list(path).await.unwrap().collect().await;
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryBackend::new();
        fs.write_all("test.txt", b"hello world").await.unwrap();

        let data = fs.read_all("test.txt").await.unwrap();
        assert_eq!(data, b"hello world");
        let data = fs.read_range("test.txt", ByteRange::new(6, 100)).await.unwrap();
        assert_eq!(data, b"world");
    }

    #[tokio::test]
    async fn test_stream_shares_buffer() {
        let fs = MemoryBackend::new();
        let stream = fs.open("a.bin", VfsOpenMode::Create).await.unwrap();
        stream.write_at(2, b"xy").await.unwrap();

        let data = fs.read_range("a.bin", ByteRange::with_len(2, 2)).await.unwrap();
        assert_eq!(data, b"xy");
        assert_eq!(fs.stat("a.bin").await.unwrap().size, 4);
    }

    #[tokio::test]
    async fn test_open_modes() {
        let fs = MemoryBackend::new();
        assert!(matches!(
            fs.open("missing", VfsOpenMode::Read).await,
            Err(VfsError::NotFound(_))
        ));

        fs.write_all("f", b"abc").await.unwrap();
        assert!(matches!(
            fs.open("f", VfsOpenMode::CreateNew).await,
            Err(VfsError::AlreadyExists(_))
        ));
        assert_eq!(fs.read_all("f").await.unwrap(), b"abc");

        let stream = fs.open("f", VfsOpenMode::Append).await.unwrap();
        assert_eq!(stream.position(), 3);

        let reader = fs.open("f", VfsOpenMode::Read).await.unwrap();
        assert!(reader.write_at(0, b"z").await.is_err());
    }

    #[tokio::test]
    async fn test_mkdir_list_and_nested_create() {
        let fs = MemoryBackend::new();
        assert!(fs.mkdir("dir", &[]).await.unwrap());
        assert!(fs.mkdir("dir", &[]).await.unwrap());
        fs.write_all("dir/sub/file.txt", b"x").await.unwrap();
        fs.write_all("root.txt", b"y").await.unwrap();

        assert_eq!(listed(&fs, "").await, vec!["dir", "root.txt"]);
        assert_eq!(listed(&fs, "dir").await, vec!["dir/sub"]);
        assert!(fs.stat("dir/sub").await.unwrap().is_directory);
        assert!(!fs.mkdir("root.txt", &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_and_rmdir() {
        let fs = MemoryBackend::new();
        fs.write_all("d/f", b"").await.unwrap();

        assert!(!fs.rmdir("d").await.unwrap());
        assert!(!fs.delete("d").await.unwrap());
        assert!(fs.delete("d/f").await.unwrap());
        assert!(!fs.delete("d/f").await.unwrap());
        assert!(fs.rmdir("d").await.unwrap());
        assert!(!fs.rmdir("").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let fs = MemoryBackend::new();
        fs.write_all("a/b/c.txt", b"deep").await.unwrap();

        assert!(fs.rename("a", "z").await.unwrap());
        assert_eq!(fs.read_all("z/b/c.txt").await.unwrap(), b"deep");
        assert!(!fs.exists("a/b/c.txt").await.unwrap());
        assert!(!fs.rename("nothing", "else").await.unwrap());
        assert!(!fs.rename("z", "z/inner").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_onto_existing() {
        let fs = MemoryBackend::new();
        fs.write_all("src.txt", b"new").await.unwrap();
        fs.write_all("full/child.txt", b"kept").await.unwrap();
        fs.write_all("old.txt", b"old").await.unwrap();
        fs.mkdir("empty", &[]).await.unwrap();
        fs.write_all("tree/leaf", b"leaf").await.unwrap();

        assert!(!fs.rename("src.txt", "full").await.unwrap());
        assert!(fs.stat("full").await.unwrap().is_directory);
        assert_eq!(fs.read_all("full/child.txt").await.unwrap(), b"kept");
        assert!(!fs.rename("tree", "full").await.unwrap());
        assert!(!fs.rename("tree", "old.txt").await.unwrap());

        assert!(fs.rename("src.txt", "old.txt").await.unwrap());
        assert_eq!(fs.read_all("old.txt").await.unwrap(), b"new");
        assert!(fs.rename("tree", "empty").await.unwrap());
        assert_eq!(fs.read_all("empty/leaf").await.unwrap(), b"leaf");
        assert!(fs.rename("empty", "empty").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_size_too_large() {
        let fs = MemoryBackend::new();
        fs.write_all("f", b"abc").await.unwrap();
        assert!(fs.set_size("f", u64::MAX).await.is_err());
        assert_eq!(fs.read_all("f").await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_touch_and_stat() {
        let fs = MemoryBackend::new();
        fs.write_all("t", b"").await.unwrap();
        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(42);
        fs.touch("t", when, when).await.unwrap();

        let stat = fs.stat("t").await.unwrap();
        assert_eq!(stat.modified_time, when);
        assert_eq!(stat.last_access_time, when);
        assert!(!fs.stat("nope").await.unwrap().exists);
        assert!(fs.touch("nope", when, when).await.is_err());
    }

    #[tokio::test]
    async fn test_set_size() {
        let fs = MemoryBackend::new();
        fs.set_size("grow", 5).await.unwrap();
        assert_eq!(fs.read_all("grow").await.unwrap(), vec![0u8; 5]);
        fs.set_size("grow", 2).await.unwrap();
        assert_eq!(fs.stat("grow").await.unwrap().size, 2);
    }
}
