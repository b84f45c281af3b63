//! CLI argument parsing for synthtrace

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the event listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable listing lines (default)
    Text,
    /// JSON document for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "synthtrace")]
#[command(version)]
#[command(about = "Define synthetic trace events and inspect their record formats", long_about = None)]
pub struct Cli {
    /// File of definition commands, one per line ('-' or omitted reads stdin)
    #[arg(value_name = "FILE")]
    pub commands: Option<PathBuf>,

    /// Load limits and channel settings from a TOML file
    #[arg(short = 'C', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Show the derived print format of each event
    #[arg(long = "show-formats")]
    pub show_formats: bool,

    /// Emit one zero-valued record per event and print its rendering
    #[arg(long = "sample")]
    pub sample: bool,

    /// Prefix rendered sample fields with their printf conversion
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
