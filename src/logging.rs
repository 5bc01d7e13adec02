//! Tracing subscriber setup
//!
//! The filter comes from `PRICEBADGE_LOG` (e.g. `PRICEBADGE_LOG=debug`) and
//! defaults to `info`. The terminal UI owns stdout, so in that mode logs are
//! appended to a file instead of stderr.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives
pub const LOG_ENV: &str = "PRICEBADGE_LOG";

/// File name used for logs in terminal UI mode
pub const LOG_FILE: &str = "pricebadge.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Logs to stderr
pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Appends logs to `<dir>/pricebadge.log`, creating the directory if needed
pub fn init_file(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}
