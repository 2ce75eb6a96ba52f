// src/logging.rs

//! Logging setup for `jobflow` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from, in order:
//! 1. the `--log-level` CLI flag, applied to every target;
//! 2. the `JOBFLOW_LOG` environment variable, which takes full `EnvFilter`
//!    directives (`info,jobflow::engine=debug`);
//! 3. `info`.
//!
//! Logs go to STDERR. Stdout carries the dry-run listing and the final job
//! summary.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable holding the default filter directives.
pub const LOG_ENV: &str = "JOBFLOW_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install the log subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(directive(level));
    }
    env.and_then(|raw| EnvFilter::try_new(raw.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_wins_over_the_environment() {
        let rendered = build_filter(Some(LogLevel::Trace), Some("error")).to_string();
        assert!(rendered.contains("trace"), "{rendered}");
        assert!(!rendered.contains("error"), "{rendered}");
    }

    #[test]
    fn environment_directives_are_kept() {
        let filter = build_filter(None, Some("warn,jobflow::engine=debug"));
        let rendered = filter.to_string();
        assert!(rendered.contains("jobflow::engine=debug"), "{rendered}");
    }

    #[test]
    fn unreadable_environment_falls_back_to_info() {
        for env in [Some("jobflow=loud"), None] {
            let rendered = build_filter(None, env).to_string();
            assert!(rendered.contains("info"), "{rendered}");
            assert!(!rendered.contains("jobflow"), "{rendered}");
        }
    }
}
