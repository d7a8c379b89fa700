//! Process executor.
//!
//! Runs an external command in a working directory and streams its stdout
//! and stderr to a [`ProcessHandler`] while it runs.
//!
//! Pipes are blocking-read primitives, so the pump works in two phases on
//! the blocking pool:
//!
//! 1. **Live**: repeatedly take whatever bytes are available right now on
//!    each pipe (pipes are switched to non-blocking on unix), sleeping
//!    [`EXEC_POLL_INTERVAL`] when both were empty.
//! 2. **Drain**: once the child has exited and a poll came back empty, read
//!    each pipe to end-of-stream and stop.
//!
//! A single blocking read per pipe would deadlock when the child fills one
//! pipe while we wait on the other; the poll loop never waits on either.
//!
//! Chunks are forwarded over a channel so handler callbacks run on the
//! caller's task. There is no timeout: a child that never exits keeps the
//! pump alive.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::constants::{EXEC_POLL_INTERVAL, PIPE_READ_CHUNK};
use crate::vfs::blocking;
use crate::vfs::{VfsError, VfsResult};

/// Receives process output as it arrives.
///
/// Order within each stream is preserved; the two streams interleave at
/// chunk granularity with no ordering guarantee between them.
#[async_trait]
pub trait ProcessHandler: Send {
    async fn on_out(&mut self, data: Vec<u8>);
    async fn on_err(&mut self, data: Vec<u8>);
}

/// Handler that buffers both streams.
#[derive(Debug, Default, Clone)]
pub struct CapturingHandler {
    pub out: Vec<u8>,
    pub err: Vec<u8>,
    /// Number of `on_out` calls received.
    pub out_chunks: usize,
    /// Number of `on_err` calls received.
    pub err_chunks: usize,
}

impl CapturingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn out_string(&self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }

    pub fn err_string(&self) -> String {
        String::from_utf8_lossy(&self.err).into_owned()
    }
}

#[async_trait]
impl ProcessHandler for CapturingHandler {
    async fn on_out(&mut self, data: Vec<u8>) {
        self.out_chunks += 1;
        self.out.extend_from_slice(&data);
    }

    async fn on_err(&mut self, data: Vec<u8>) {
        self.err_chunks += 1;
        self.err.extend_from_slice(&data);
    }
}

#[derive(Debug)]
enum ProcessEvent {
    Out(Vec<u8>),
    Err(Vec<u8>),
}

/// Command line actually spawned for `cmd_and_args` on this host.
///
/// Windows needs `cmd /c` so builtins and scripts resolve.
pub fn host_command(cmd_and_args: &[String]) -> Vec<String> {
    if cfg!(windows) {
        let mut wrapped = vec!["cmd".to_string(), "/c".to_string()];
        wrapped.extend(cmd_and_args.iter().cloned());
        wrapped
    } else {
        cmd_and_args.to_vec()
    }
}

/// Spawn `cmd_and_args` in `cwd` and pump its output into `handler`.
///
/// `env` entries are added on top of the inherited environment. Returns
/// the exit code; a non-zero code is not an error. A child killed by a
/// signal reports `-1`.
pub async fn exec(
    cwd: PathBuf,
    cmd_and_args: &[String],
    env: &HashMap<String, String>,
    handler: &mut dyn ProcessHandler,
) -> VfsResult<i32> {
    exec_with_interval(cwd, cmd_and_args, env, handler, EXEC_POLL_INTERVAL).await
}

/// [`exec`] with an explicit live-phase poll interval.
#[tracing::instrument(skip(cwd, env, handler), fields(cwd = %cwd.display()))]
pub async fn exec_with_interval(
    cwd: PathBuf,
    cmd_and_args: &[String],
    env: &HashMap<String, String>,
    handler: &mut dyn ProcessHandler,
    poll_interval: Duration,
) -> VfsResult<i32> {
    let argv = host_command(cmd_and_args);
    let env = env.clone();
    tracing::debug!(command = ?argv, "spawning");

    let child = blocking::run(move || spawn(&cwd, &argv, &env)).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let pump = tokio::task::spawn_blocking(move || {
        let mut child = child;
        pump(&mut child, tx, poll_interval)
    });

    while let Some(event) = rx.recv().await {
        match event {
            ProcessEvent::Out(data) => handler.on_out(data).await,
            ProcessEvent::Err(data) => handler.on_err(data).await,
        }
    }

    let code = pump
        .await
        .map_err(|e| VfsError::other(format!("spawn_blocking: {}", e)))??;
    tracing::debug!(code, "exec finished");
    Ok(code)
}

fn spawn(cwd: &Path, argv: &[String], env: &HashMap<String, String>) -> VfsResult<Child> {
    let Some((program, args)) = argv.split_first() else {
        return Err(VfsError::SpawnFailed {
            command: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command line"),
        });
    };

    Command::new(program)
        .args(args)
        .current_dir(cwd)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| VfsError::SpawnFailed {
            command: program.clone(),
            source,
        })
}

/// Run the pump; on failure the child is killed and reaped before the
/// error is returned.
fn pump(
    child: &mut Child,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    poll_interval: Duration,
) -> VfsResult<i32> {
    pump_output(child, tx, poll_interval).inspect_err(|e| {
        tracing::debug!(pid = child.id(), error = %e, "pump failed, killing child");
        let _ = child.kill();
        let _ = child.wait();
    })
}

fn pump_output(
    child: &mut Child,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    poll_interval: Duration,
) -> VfsResult<i32> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| VfsError::other("child stdout not piped"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| VfsError::other("child stderr not piped"))?;

    let live_polling = set_nonblocking(&stdout, true)? && set_nonblocking(&stderr, true)?;
    let mut draining = false;

    loop {
        let out = read_chunk(&mut stdout, draining, live_polling)?;
        let err = read_chunk(&mut stderr, draining, live_polling)?;
        let quiet = out.is_empty() && err.is_empty();

        // A closed receiver means the caller went away; keep draining so the
        // child is still reaped.
        if !out.is_empty() {
            let _ = tx.send(ProcessEvent::Out(out));
        }
        if !err.is_empty() {
            let _ = tx.send(ProcessEvent::Err(err));
        }

        if draining {
            break;
        }

        if quiet {
            if child.try_wait()?.is_some() {
                draining = true;
                set_nonblocking(&stdout, false)?;
                set_nonblocking(&stderr, false)?;
                continue;
            }
            std::thread::sleep(poll_interval);
        }
    }

    let status = child.wait()?;
    Ok(status.code().unwrap_or(-1))
}

/// Bytes currently available on `reader`, or everything up to EOF when
/// `read_rest` is set.
fn read_chunk(reader: &mut impl Read, read_rest: bool, live_polling: bool) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    if read_rest {
        reader.read_to_end(&mut out)?;
        return Ok(out);
    }
    if !live_polling {
        return Ok(out);
    }

    let mut buf = [0u8; PIPE_READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

/// Toggle `O_NONBLOCK` on a pipe. Returns whether live polling is possible.
#[cfg(unix)]
fn set_nonblocking(fd: &impl std::os::fd::AsFd, on: bool) -> io::Result<bool> {
    use rustix::fs::{OFlags, fcntl_getfl, fcntl_setfl};

    let mut flags = fcntl_getfl(fd)?;
    flags.set(OFlags::NONBLOCK, on);
    fcntl_setfl(fd, flags)?;
    Ok(true)
}

// Without a non-blocking pipe primitive the live phase only watches for
// exit; all output arrives in the drain phase.
#[cfg(not(unix))]
fn set_nonblocking<T>(_fd: &T, _on: bool) -> io::Result<bool> {
    Ok(false)
}
