//! burrow binary
//!
//! Command-line access to burrow's filesystem roots.
//!
//! ## Usage
//!
//! ```bash
//! burrow ls                              # list the working directory root
//! burrow --root temp write notes.txt < notes.txt
//! burrow --root resources cat logo.svg
//! burrow --config roots.ron --jail exec build -- make -j4
//! burrow roots                           # show every role and its backend
//! ```

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use strum::IntoEnumIterator;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use burrow_kernel::roots::{self, Role, RootsConfig};
use burrow_kernel::{ByteRange, ProcessHandler, VfsFile};

/// Browse and modify burrow filesystem roots.
#[derive(Parser, Debug)]
#[command(name = "burrow")]
#[command(about = "Command-line access to burrow filesystem roots")]
struct Args {
    /// RON roots configuration (defaults to $BURROW_ROOTS if set)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Root to operate in
    #[arg(short, long, global = true, default_value = "root_local")]
    root: Role,

    /// Reject paths that climb above the root
    #[arg(long, global = true)]
    jail: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show metadata for a path
    Stat { path: String },
    /// List a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },
    /// Print a file, or an inclusive byte range of it
    Cat {
        path: String,
        #[arg(long, default_value_t = 0)]
        start: i64,
        #[arg(long)]
        end: Option<i64>,
    },
    /// Replace a file with stdin
    Write { path: String },
    /// Create a directory and its ancestors
    Mkdir { path: String },
    /// Delete a file (or an empty directory with --dir)
    Rm {
        path: String,
        #[arg(long)]
        dir: bool,
    },
    /// Rename within the root
    Mv { src: String, dst: String },
    /// Set modification and access time to now
    Touch { path: String },
    /// Run a command with a directory as working directory
    Exec {
        /// Working directory within the root
        path: String,
        /// Extra environment, KEY=VALUE
        #[arg(short, long = "env")]
        env: Vec<String>,
        /// Command and arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Show every role and the backend behind it
    Roots,
}

/// Streams process output straight to our own stdout/stderr.
struct StdioHandler;

#[async_trait]
impl ProcessHandler for StdioHandler {
    async fn on_out(&mut self, data: Vec<u8>) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(&data);
        let _ = out.flush();
    }

    async fn on_err(&mut self, data: Vec<u8>) {
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(&data);
        let _ = err.flush();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("burrow: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = match &args.config {
        Some(path) => Some(
            RootsConfig::load(path)
                .with_context(|| format!("loading roots config {}", path.display()))?,
        ),
        None => RootsConfig::from_env().context("loading roots config from $BURROW_ROOTS")?,
    };
    if let Some(config) = config {
        roots::configure(config)?;
    }

    let mut root = roots::get(args.root);
    if args.jail {
        root = root.jail();
    }
    tracing::debug!(role = %args.root, root = ?root, "resolved root");

    match args.command {
        Command::Stat { path } => cmd_stat(&root.child(&path)).await,
        Command::Ls { path } => cmd_ls(&root.child(&path)).await,
        Command::Cat { path, start, end } => {
            let range = ByteRange::new(start, end.unwrap_or(i64::MAX));
            let data = root
                .child(&path)
                .read_range(range)
                .await
                .with_context(|| format!("reading {path}"))?;
            std::io::stdout().write_all(&data)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Write { path } => {
            let mut data = Vec::new();
            std::io::stdin().read_to_end(&mut data)?;
            root.child(&path)
                .write_all(&data)
                .await
                .with_context(|| format!("writing {path}"))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Mkdir { path } => report(root.child(&path).mkdir().await?, "mkdir", &path),
        Command::Rm { path, dir } => {
            let file = root.child(&path);
            let removed = if dir {
                file.rmdir().await?
            } else {
                file.delete().await?
            };
            report(removed, "rm", &path)
        }
        Command::Mv { src, dst } => report(root.child(&src).rename_to(&dst).await?, "mv", &src),
        Command::Touch { path } => {
            let now = SystemTime::now();
            root.child(&path)
                .touch(now, now)
                .await
                .with_context(|| format!("touching {path}"))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Exec { path, env, command } => cmd_exec(&root.child(&path), &env, &command).await,
        Command::Roots => cmd_roots().await,
    }
}

fn report(ok: bool, op: &str, path: &str) -> Result<ExitCode> {
    if ok {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("burrow: {op} {path}: failed");
        Ok(ExitCode::FAILURE)
    }
}

async fn cmd_stat(file: &VfsFile) -> Result<ExitCode> {
    let stat = file.stat().await?;
    if !stat.exists {
        eprintln!("burrow: {}: not found", file.path());
        return Ok(ExitCode::FAILURE);
    }
    let modified = stat
        .modified_time
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("path:     {}", stat.path);
    println!("kind:     {}", if stat.is_directory { "directory" } else { "file" });
    println!("size:     {}", stat.size);
    println!("modified: {modified}");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_ls(dir: &VfsFile) -> Result<ExitCode> {
    let mut children: Vec<VfsFile> = dir.list().await?.collect().await;
    children.sort_by(|a, b| a.path().cmp(b.path()));
    for child in children {
        let suffix = if child.is_dir().await? { "/" } else { "" };
        println!("{}{suffix}", child.base_name());
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_exec(dir: &VfsFile, env: &[String], command: &[String]) -> Result<ExitCode> {
    let mut vars = HashMap::new();
    for entry in env {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("invalid --env entry {entry:?}, expected KEY=VALUE");
        };
        vars.insert(key.to_string(), value.to_string());
    }

    let code = dir
        .exec(command, &vars, &mut StdioHandler)
        .await
        .with_context(|| format!("running {}", command.join(" ")))?;
    tracing::debug!(code, "command exited");
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

async fn cmd_roots() -> Result<ExitCode> {
    for role in Role::iter() {
        let root = roots::get(role);
        println!("{:<18} {}", role.to_string(), root.vfs().name());
    }
    Ok(ExitCode::SUCCESS)
}
