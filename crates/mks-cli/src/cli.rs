//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use mks_core::LevelFilter;

#[derive(Parser)]
#[command(
    name = "markable-studio",
    version,
    about = "Inspect and maintain markable annotation projects",
    long_about = "Inspect and maintain markable annotation projects.\n\n\
                  A project is a .mmax descriptor naming a base data file and\n\
                  a stack of markable levels with their schemes."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show levels, markable counts and load issues.
    Summary(ProjectArgs),

    /// Show the markables covering a token on every level.
    At(AtArgs),

    /// Find markables by attribute value.
    Query(QueryArgs),

    /// Check indices, relations and attribute values.
    Check(ProjectArgs),

    /// Write levels back to disk.
    Resave(ResaveArgs),
}

#[derive(Args)]
pub struct ProjectArgs {
    /// Path to the .mmax project file.
    #[arg(value_name = "PROJECT")]
    pub project: PathBuf,

    /// Settings file (default: markable-studio.toml next to the project).
    #[arg(long = "settings", value_name = "PATH")]
    pub settings: Option<PathBuf>,
}

#[derive(Args)]
pub struct AtArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Token ID, e.g. word_12.
    #[arg(value_name = "TOKEN")]
    pub token: String,

    /// Which levels to report.
    #[arg(long = "levels", value_enum, default_value = "all")]
    pub levels: LevelFilterArg,
}

#[derive(Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Attribute filter: key=value, key!=value, key~regex or key.
    #[arg(long = "where", short = 'w', value_name = "FILTER")]
    pub filters: Vec<String>,

    /// Restrict the search to a level (repeatable).
    #[arg(long = "level", short = 'l', value_name = "LEVEL")]
    pub levels: Vec<String>,

    /// Stop after this many hits.
    #[arg(long = "limit", value_name = "N")]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct ResaveArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Only this level (repeatable; default: all levels).
    #[arg(long = "level", short = 'l', value_name = "LEVEL")]
    pub levels: Vec<String>,

    /// Write levels even without unsaved edits.
    #[arg(long = "force")]
    pub force: bool,

    /// Do not keep a .bak copy of the previous file.
    #[arg(long = "no-backup")]
    pub no_backup: bool,
}

/// CLI level filter choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LevelFilterArg {
    All,
    Active,
    Visible,
}

impl From<LevelFilterArg> for LevelFilter {
    fn from(value: LevelFilterArg) -> Self {
        match value {
            LevelFilterArg::All => LevelFilter::All,
            LevelFilterArg::Active => LevelFilter::Active,
            LevelFilterArg::Visible => LevelFilter::Visible,
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
