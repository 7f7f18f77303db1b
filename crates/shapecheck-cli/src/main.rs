//! shapecheck CLI tool.
//!
//! Usage:
//! ```bash
//! shapecheck analyze [OPTIONS] [PROJECT]
//! shapecheck list-checks
//! shapecheck dump <FILE>
//! shapecheck configure create
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use shapecheck_core::ExitStatus;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod checks;
mod commands;
mod config;
mod config_resolver;

/// Structural style checks for Python projects
#[derive(Parser)]
#[command(name = "shapecheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration directory containing config.yml
    #[arg(long, global = true, value_name = "DIR")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run checks against a project
    Analyze {
        /// Project directory to scan
        #[arg(default_value = ".")]
        project: PathBuf,

        /// Additional directories to scan (can be specified multiple times)
        #[arg(short = 's', long = "search-path", value_name = "DIR")]
        search_paths: Vec<PathBuf>,

        /// Checks file to use instead of the configured ones (repeatable)
        #[arg(long = "checks-file", value_name = "FILE")]
        checks_files: Vec<PathBuf>,

        /// Exclude patterns (can be specified multiple times)
        #[arg(short, long, value_name = "GLOB")]
        exclude: Vec<String>,

        /// Number of worker threads
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List the configured checks
    ListChecks {
        /// Checks file to use instead of the configured ones (repeatable)
        #[arg(long = "checks-file", value_name = "FILE")]
        checks_files: Vec<PathBuf>,
    },

    /// Print the tree a Python file is matched against, as XML
    Dump {
        /// Python source file
        file: PathBuf,
    },

    /// Manage configuration directories
    Configure {
        #[command(subcommand)]
        action: ConfigureAction,
    },
}

#[derive(Subcommand)]
enum ConfigureAction {
    /// Write a starter config.yml and checks.yml
    Create {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,

        /// Target directory (default: ./.shapecheck)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
}

/// Output format for run reports.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
    /// One-line-per-match compact format.
    Compact,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let status = match cli.command {
        Commands::Analyze {
            project,
            search_paths,
            checks_files,
            exclude,
            jobs,
            format,
        } => commands::analyze::run(&commands::analyze::AnalyzeOptions {
            project,
            search_paths,
            config: cli.config,
            checks_files,
            exclude,
            jobs,
            format,
            verbose: cli.verbose,
        })?,
        Commands::ListChecks { checks_files } => {
            commands::list_checks::run(cli.config.as_deref(), &checks_files)?;
            ExitStatus::Success
        }
        Commands::Dump { file } => commands::dump::run(&file)?,
        Commands::Configure {
            action: ConfigureAction::Create { force, dir },
        } => {
            commands::configure::create(dir.as_deref(), force)?;
            ExitStatus::Success
        }
    };

    if status != ExitStatus::Success {
        std::process::exit(status.code());
    }
    Ok(())
}
