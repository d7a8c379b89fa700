//! Virtual filesystem abstraction.
//!
//! Key components:
//!
//! - [`Vfs`] - Core trait every backend and decorator implements
//! - [`VfsStream`] / [`StreamBase`] - Position-explicit streams with a cursor on top
//! - [`LocalBackend`] - Host directory tree, with process execution
//! - [`AssetBackend`] - Read-only packaged resources
//! - [`MemoryBackend`] - In-memory filesystem (cache, testing)
//! - [`MergedVfs`] - First-match overlay of several backends
//! - [`JailVfs`] - Confines a backend to a subtree
//! - [`VfsFile`] - Path handle bound to a backend
//!
//! ## Design Decisions
//!
//! - **String paths**: Slash-separated and relative to the backend root,
//!   identical on every host.
//! - **Blocking offload**: Disk and bundle I/O run on the blocking pool via
//!   [`blocking::run`]; async callers never block a worker.
//! - **Missing is not an error for `stat`**: it reports `exists == false`.
//!   Boolean mutations report expected failures as `false`.

pub mod backends;
pub mod blocking;
mod error;
mod file;
mod jail;
mod merged;
mod ops;
pub mod path;
mod stream;
mod types;

pub use backends::{AssetBackend, AssetBundle, DirBundle, LocalBackend, MemoryBackend, StaticBundle};
pub use error::{ErrorKind, VfsError, VfsResult};
pub use file::VfsFile;
pub use jail::JailVfs;
pub use merged::MergedVfs;
pub use ops::{Vfs, VfsListing, WatchHandle, WatchHandler};
pub use stream::{MemoryStream, SharedBuffer, StreamBase, VfsStream};
pub use types::{ByteRange, FileEvent, FileEventKind, VfsAttribute, VfsOpenMode, VfsStat};
