//! Analyze command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use shapecheck_core::{Analyzer, ExitStatus};
use shapecheck_python::PythonExtractor;

use super::{load_settings, output, CONFIG_FAILURE};
use crate::OutputFormat;

/// Options for one `analyze` invocation.
pub struct AnalyzeOptions {
    /// Project root to scan.
    pub project: PathBuf,
    /// Additional roots.
    pub search_paths: Vec<PathBuf>,
    /// `--config` directory.
    pub config: Option<PathBuf>,
    /// `--checks-file` overrides.
    pub checks_files: Vec<PathBuf>,
    /// Extra exclude globs.
    pub exclude: Vec<String>,
    /// Worker threads.
    pub jobs: Option<usize>,
    /// Output format.
    pub format: OutputFormat,
    /// List matches under each rule.
    pub verbose: bool,
}

/// Runs the analyze command.
pub fn run(options: &AnalyzeOptions) -> Result<ExitStatus> {
    let settings = load_settings(options.config.as_deref(), &options.checks_files)?;

    let mut builder = Analyzer::builder()
        .root(&options.project)
        .roots(&options.search_paths)
        .extractor(PythonExtractor::new())
        .rules(settings.rules)
        .excludes(&options.exclude);

    if let Some(config) = &settings.config {
        builder = builder
            .excludes(&config.exclude)
            .respect_gitignore(config.respect_gitignore);
        if let Some(threads) = config.parallelism {
            builder = builder.parallelism(threads);
        }
    }
    if let Some(threads) = options.jobs {
        builder = builder.parallelism(threads);
    }

    let analyzer = builder.build().context(CONFIG_FAILURE)?;
    tracing::debug!(
        "Checking {} rule(s) over {} root(s)",
        analyzer.rule_count(),
        analyzer.roots().len()
    );
    let report = analyzer.analyze()?;

    output::print(&report, options.format, options.verbose)?;
    Ok(report.exit_status())
}
