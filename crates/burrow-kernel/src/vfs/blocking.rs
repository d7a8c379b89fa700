//! Offloading blocking work from async callers.

use super::error::{VfsError, VfsResult};

/// Run a blocking closure on tokio's blocking pool and await it.
///
/// The caller's worker thread is never blocked; one blocking-pool thread is
/// occupied for the duration of `f`.
pub async fn run<T, F>(f: F) -> VfsResult<T>
where
    F: FnOnce() -> VfsResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VfsError::other(format!("spawn_blocking: {}", e)))?
}
