//! Kernel tunables.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Sleep between process-output polls when neither pipe had data.
pub const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Read buffer size for process pipes.
pub const PIPE_READ_CHUNK: usize = 8192;

/// Environment variable naming a RON roots configuration file.
pub const ROOTS_CONFIG_ENV: &str = "BURROW_ROOTS";

/// Directory name used under platform data directories.
pub const APP_DIR_NAME: &str = "burrow";
