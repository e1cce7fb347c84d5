//! Markable Studio CLI.

use std::io::{self, IsTerminal};

use clap::{ColorChoice, Parser};
use mks_cli::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use mks_cli::commands::{run_at, run_check, run_query, run_resave, run_summary};
use mks_cli::logging::{LogConfig, LogFormat, init_logging};
use mks_cli::summary::{print_at, print_check, print_query, print_resave, print_summary};
use mks_persistence::PersistenceError;
use tracing::level_filters::LevelFilter;

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let result = match &cli.command {
        Command::Summary(args) => run_summary(args).map(|summary| {
            print_summary(&summary);
            i32::from(summary.levels.iter().any(|level| level.read_only))
        }),
        Command::At(args) => run_at(args).map(|report| {
            print_at(&report);
            0
        }),
        Command::Query(args) => run_query(args).map(|hits| {
            print_query(&hits);
            0
        }),
        Command::Check(args) => run_check(args).map(|report| {
            print_check(&report);
            i32::from(!report.is_clean())
        }),
        Command::Resave(args) => run_resave(args).map(|report| {
            print_resave(&report);
            i32::from(report.refused() > 0)
        }),
    };
    let exit_code = match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            if let Some(hint) = error.downcast_ref::<PersistenceError>().and_then(PersistenceError::suggestion) {
                eprintln!("hint: {hint}");
            }
            1
        }
    };
    std::process::exit(exit_code);
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
