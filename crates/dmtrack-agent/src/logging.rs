//! File logging for the agent (the host has no console)

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Log file written next to the agent module
pub const LOG_FILE_NAME: &str = "dmtrack-agent.log";

pub fn log_path(module_dir: &Path) -> PathBuf {
    module_dir.join(LOG_FILE_NAME)
}

/// Install a global subscriber appending to `path`.
///
/// `RUST_LOG` overrides the default `dmtrack=info` level. Fails if the file
/// cannot be opened; a subscriber already installed is left in place.
pub fn init_file_logging(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dmtrack=info,dmtrack_agent=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}
