// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::exec::parse_failure;

/// Command-line arguments for `jobflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobflow",
    version,
    about = "Validate and run workflow jobs with LOOP / IF / REPLICATE control flow.",
    long_about = None
)]
pub struct CliArgs {
    /// Job definition file (TOML). May be given several times.
    #[arg(long = "job", value_name = "PATH", required = true)]
    pub jobs: Vec<PathBuf>,

    /// Owner recorded on submitted jobs.
    #[arg(long, value_name = "NAME", default_value = "jobflow")]
    pub owner: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Run native commands and shell scripts as local processes instead of
    /// simulating them.
    #[arg(long)]
    pub execute: bool,

    /// Simulated run time of each task, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub task_duration_ms: u64,

    /// Make a task fail when simulated: `NAME` fails every time,
    /// `NAME:COUNT` fails COUNT times then succeeds.
    #[arg(long = "fail", value_name = "NAME[:COUNT]", value_parser = parse_failure)]
    pub failures: Vec<(String, Option<u32>)>,

    /// Delay before the first re-execution of a task in error, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub restart_delay_ms: Option<u64>,

    /// Host label recorded on started tasks.
    #[arg(long, value_name = "NAME")]
    pub host: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
