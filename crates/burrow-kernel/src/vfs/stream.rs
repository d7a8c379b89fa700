//! Stream primitive.
//!
//! [`StreamBase`] is the position-explicit contract backends implement: no
//! hidden cursor, so concurrent readers at different offsets never disturb
//! each other. [`VfsStream`] layers a cursor on top for sequential use.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::io;
use std::sync::Arc;

use super::error::{VfsError, VfsResult};

/// Position-addressed operations over an open resource.
#[async_trait]
pub trait StreamBase: Send + Sync {
    /// Read into `buf` starting at `position`.
    ///
    /// Returns fewer bytes than `buf.len()` only at end-of-resource or on a
    /// short underlying read. Returns 0 at or past the end.
    async fn read(&self, position: u64, buf: &mut [u8]) -> VfsResult<usize>;

    /// Write `buf` at `position`, extending the resource if needed.
    async fn write(&self, position: u64, buf: &[u8]) -> VfsResult<usize>;

    /// Truncate or extend to exactly `len` bytes.
    async fn set_len(&self, len: u64) -> VfsResult<()>;

    /// Current length in bytes.
    async fn len(&self) -> VfsResult<u64>;

    /// Release the underlying resource. Later calls fail with `Closed`.
    async fn close(&self) -> VfsResult<()>;
}

/// An open file: a [`StreamBase`] plus a cursor.
pub struct VfsStream {
    base: Box<dyn StreamBase>,
    position: u64,
    label: String,
}

impl std::fmt::Debug for VfsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsStream")
            .field("label", &self.label)
            .field("position", &self.position)
            .finish()
    }
}

impl VfsStream {
    pub fn new(base: impl StreamBase + 'static, label: impl Into<String>) -> Self {
        Self {
            base: Box::new(base),
            position: 0,
            label: label.into(),
        }
    }

    /// Start the cursor at `position` (used for append mode).
    pub fn with_position(mut self, position: u64) -> Self {
        self.position = position;
        self
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    /// Backend and path this stream was opened from.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Read at the cursor and advance it.
    pub async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let n = self.base.read(self.position, buf).await?;
        self.position += n as u64;
        Ok(n)
    }

    /// Write at the cursor and advance it.
    pub async fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let n = self.base.write(self.position, buf).await?;
        self.position += n as u64;
        Ok(n)
    }

    /// Positional read; the cursor is untouched.
    pub async fn read_at(&self, position: u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.base.read(position, buf).await
    }

    /// Positional write; the cursor is untouched.
    pub async fn write_at(&self, position: u64, buf: &[u8]) -> VfsResult<usize> {
        self.base.write(position, buf).await
    }

    /// Read until `buf` is full or end-of-resource. Returns bytes read.
    pub async fn read_exact_at(&self, position: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .base
                .read(position + filled as u64, &mut buf[filled..])
                .await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Read everything from the cursor to the end.
    pub async fn read_to_end(&mut self) -> VfsResult<Vec<u8>> {
        let len = self.base.len().await?;
        let remaining = len.saturating_sub(self.position) as usize;
        let mut out = vec![0u8; remaining];
        let n = self.read_exact_at(self.position, &mut out).await?;
        out.truncate(n);
        self.position += n as u64;
        Ok(out)
    }

    /// Write all of `buf` at the cursor.
    pub async fn write_all(&mut self, mut buf: &[u8]) -> VfsResult<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            if n == 0 {
                return Err(VfsError::other("write returned zero bytes"));
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    pub async fn len(&self) -> VfsResult<u64> {
        self.base.len().await
    }

    pub async fn set_len(&self, len: u64) -> VfsResult<()> {
        self.base.set_len(len).await
    }

    /// Close and release the underlying resource.
    pub async fn close(self) -> VfsResult<()> {
        self.base.close().await
    }
}

/// Shared byte buffer used by in-memory streams.
pub type SharedBuffer = Arc<RwLock<Vec<u8>>>;

fn too_large(len: u64) -> VfsError {
    VfsError::Io(io::Error::new(
        io::ErrorKind::FileTooLarge,
        format!("{len} bytes does not fit in memory"),
    ))
}

/// Resize `data` to exactly `len` bytes, zero-filling any growth.
///
/// Sizes past the address space or the allocator's reach come back as an
/// error instead of aborting.
pub(crate) fn resize_buffer(data: &mut Vec<u8>, len: u64) -> VfsResult<()> {
    let target = usize::try_from(len).map_err(|_| too_large(len))?;
    if target > data.len() {
        data.try_reserve_exact(target - data.len())
            .map_err(|_| too_large(len))?;
    }
    data.resize(target, 0);
    Ok(())
}

/// Stream over an in-memory buffer.
///
/// The buffer is shared, so a backend can hand out streams whose writes are
/// visible to later reads of the same entry.
#[derive(Debug)]
pub struct MemoryStream {
    data: SharedBuffer,
    read_only: bool,
    closed: RwLock<bool>,
}

impl MemoryStream {
    pub fn new(data: SharedBuffer) -> Self {
        Self {
            data,
            read_only: false,
            closed: RwLock::new(false),
        }
    }

    /// Read-only stream over owned bytes.
    pub fn read_only(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(bytes)),
            read_only: true,
            closed: RwLock::new(false),
        }
    }

    /// Same buffer, writes refused.
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn check_open(&self) -> VfsResult<()> {
        if *self.closed.read() {
            Err(VfsError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> VfsResult<()> {
        self.check_open()?;
        if self.read_only {
            Err(VfsError::access_denied("stream is read-only"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StreamBase for MemoryStream {
    async fn read(&self, position: u64, buf: &mut [u8]) -> VfsResult<usize> {
        self.check_open()?;
        let data = self.data.read();
        let start = (position.min(data.len() as u64)) as usize;
        let end = (start + buf.len()).min(data.len());
        let n = end - start;
        buf[..n].copy_from_slice(&data[start..end]);
        Ok(n)
    }

    async fn write(&self, position: u64, buf: &[u8]) -> VfsResult<usize> {
        self.check_writable()?;
        let end = position
            .checked_add(buf.len() as u64)
            .ok_or_else(|| too_large(u64::MAX))?;
        let mut data = self.data.write();
        if end > data.len() as u64 {
            resize_buffer(&mut data, end)?;
        }
        // The buffer holds at least `end` bytes now, so both bounds fit.
        let end = end as usize;
        let start = end - buf.len();
        data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    async fn set_len(&self, len: u64) -> VfsResult<()> {
        self.check_writable()?;
        resize_buffer(&mut self.data.write(), len)
    }

    async fn len(&self) -> VfsResult<u64> {
        self.check_open()?;
        Ok(self.data.read().len() as u64)
    }

    async fn close(&self) -> VfsResult<()> {
        let mut closed = self.closed.write();
        if *closed {
            return Err(VfsError::Closed);
        }
        *closed = true;
        Ok(())
    }
}
