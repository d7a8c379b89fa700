//! # burrow-kernel
//!
//! Virtual filesystem layer for burrow.
//!
//! Every storage kind sits behind one async [`Vfs`] trait:
//! - Local directories, with command execution rooted in them
//! - Read-only asset bundles
//! - In-memory trees
//! - Merged overlays and jails that compose any of the above
//!
//! [`roots`] hands out the well-known roots (resources, cache, temp, ...)
//! as [`VfsFile`] handles.

pub mod constants;
pub mod process;
pub mod roots;
pub mod vfs;

pub use process::{CapturingHandler, ProcessHandler};
pub use roots::{Role, RootSpec, Roots, RootsConfig, RootsError};
pub use vfs::{
    AssetBackend, AssetBundle, ByteRange, DirBundle, ErrorKind, JailVfs, LocalBackend,
    MemoryBackend, MergedVfs, StaticBundle, Vfs, VfsError, VfsFile, VfsOpenMode, VfsResult,
    VfsStat, VfsStream,
};
