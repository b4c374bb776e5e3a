//! Logging setup shared by the binaries
//!
//! Logging starts before settings are read so config warnings are visible,
//! then switches to the configured level.

use crate::error::RecsysError;
use crate::Result;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

/// Handle to the installed filter
pub struct LogLevel {
    handle: reload::Handle<EnvFilter, Registry>,

    /// Set by `--debug`; configured levels are ignored
    pinned: bool,
}

/// Install the global subscriber, writing to stderr
pub fn init(debug: bool) -> LogLevel {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::new(format!("cinematch={}", level));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    LogLevel { handle, pinned: debug }
}

impl LogLevel {
    /// Switch to the configured level unless `--debug` was given
    pub fn apply(&self, level: &str) -> Result<()> {
        if self.pinned {
            return Ok(());
        }
        let filter = filter_for(level)?;
        self.handle
            .reload(filter)
            .map_err(|e| RecsysError::invalid_input(format!("Failed to set log level {level}: {e}")))
    }
}

fn filter_for(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(format!("cinematch={}", level.trim().to_lowercase()))
        .map_err(|e| RecsysError::invalid_input(format!("Invalid log level {level:?}: {e}")))
}
