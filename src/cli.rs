// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::OutputFormat;

/// Command-line arguments for `hostdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "hostdag",
    version,
    about = "Plan and run multi-host operations as a dependency graph.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    ///
    /// Default: `Hostdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Hostdag.toml")]
    pub config: String,

    /// Plan every module and print the topological layers without running
    /// anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Report format written to stdout.
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub output: OutputFormat,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `HOSTDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Override `[config].max_parallel_nodes`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_parallel_nodes: Option<u32>,

    /// Override `[config].max_parallel_hosts`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_parallel_hosts: Option<u32>,

    /// Skip steps marked `online_only`.
    #[arg(long)]
    pub offline: bool,

    /// Set a run-scoped flag before planning (repeatable).
    #[arg(long = "flag", value_name = "NAME")]
    pub flags: Vec<String>,

    /// Run only this module of the pipeline.
    #[arg(long, value_name = "NAME")]
    pub module: Option<String>,
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
