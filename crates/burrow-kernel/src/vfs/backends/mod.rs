//! VFS backends.
//!
//! Backends implement [`Vfs`](super::Vfs) for different storage types.

mod asset;
mod local;
mod memory;

pub use asset::{AssetBackend, AssetBundle, DirBundle, StaticBundle};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
