//! Shared output formatting for run reports.

use std::path::{Path, PathBuf};

use anyhow::Result;
use shapecheck_core::{ParseError, ParseErrorKind, RuleOutcome, RuleResult, RunReport};

use crate::OutputFormat;

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Print a run report in the specified format.
pub fn print(report: &RunReport, format: OutputFormat, verbose: bool) -> Result<()> {
    let base = std::env::current_dir()
        .ok()
        .and_then(|dir| dir.canonicalize().ok());
    match format {
        OutputFormat::Text => print_text(report, verbose, base.as_deref()),
        OutputFormat::Json => return print_json(report),
        OutputFormat::Compact => print!("{}", render_compact(report, base.as_deref())),
    }
    Ok(())
}

/// Renders `path` relative to `base` when it lies beneath it.
fn display_path(path: &Path, base: Option<&Path>) -> String {
    base.and_then(|b| path.strip_prefix(b).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}

fn status_label(result: &RuleResult) -> String {
    match result.outcome {
        RuleOutcome::Passed => format!("{GREEN}PASS{RESET}"),
        RuleOutcome::Failed { .. } => format!("{RED}FAIL{RESET}"),
        RuleOutcome::Errored { .. } => format!("{YELLOW}ERROR{RESET}"),
    }
}

fn rule_line(result: &RuleResult) -> String {
    let head = format!(
        "{} [{}/{}] {}",
        status_label(result),
        result.code,
        result.id,
        result.name
    );
    match &result.outcome {
        RuleOutcome::Passed => format!("{head}: {} match(es) in {}", result.total, result.count),
        RuleOutcome::Failed { violated } => format!(
            "{head}: {} match(es), outside {} (violated {violated})",
            result.total, result.count
        ),
        RuleOutcome::Errored { message } => format!("{head}: {message}"),
    }
}

fn summary_line(report: &RunReport) -> String {
    let summary = report.summary();
    let color = if report.passed { GREEN } else { RED };
    format!(
        "{color}{} passed, {} failed, {} errored; {} parse error(s), {} rejected root(s) in {} file(s){RESET}",
        summary.passed,
        summary.failed,
        summary.errored,
        report.parse_errors.len(),
        report.rejected.len(),
        report.files_scanned
    )
}

fn print_text(report: &RunReport, verbose: bool, base: Option<&Path>) {
    for result in &report.rules {
        println!("{}", rule_line(result));
        if verbose {
            for record in &result.matches {
                println!(
                    "  {}:{}:{} {}",
                    display_path(&record.file, base),
                    record.line,
                    record.column,
                    record.snippet.as_deref().unwrap_or(&record.node)
                );
            }
        }
    }

    if !report.parse_errors.is_empty() {
        println!();
        for error in &report.parse_errors {
            print_parse_error(error, base);
        }
    }

    for root in &report.rejected {
        println!(
            "{RED}rejected{RESET} {}: not an existing directory",
            root.display()
        );
    }

    println!();
    println!("{}", summary_line(report));
}

/// Renders syntax errors with source context; read errors stay one line.
fn print_parse_error(error: &ParseError, base: Option<&Path>) {
    let source = match error.kind {
        ParseErrorKind::Syntax => std::fs::read_to_string(&error.path).ok(),
        ParseErrorKind::Read => None,
    };
    match source {
        Some(text) => {
            let mut shown = error.clone();
            shown.path = PathBuf::from(display_path(&error.path, base));
            println!("{:?}", miette::Report::new(shown.to_diagnostic(text)));
        }
        None => println!(
            "{RED}error{RESET} {}: {}",
            display_path(&error.path, base),
            error.message
        ),
    }
}

fn print_json(report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{json}");
    Ok(())
}

fn render_compact(report: &RunReport, base: Option<&Path>) -> String {
    let mut out = String::new();
    for result in &report.rules {
        for record in &result.matches {
            out.push_str(&format!(
                "{}:{}:{}: [{}/{}] {}\n",
                display_path(&record.file, base),
                record.line,
                record.column,
                result.code,
                result.id,
                result.name
            ));
        }
    }
    for result in report.rules.iter().filter(|r| !r.passed()) {
        let detail = match &result.outcome {
            RuleOutcome::Failed { violated } => {
                format!("{} match(es) outside {} ({violated})", result.total, result.count)
            }
            RuleOutcome::Errored { message } => format!("error: {message}"),
            RuleOutcome::Passed => continue,
        };
        out.push_str(&format!(
            "[{}/{}] {}: {detail}\n",
            result.code, result.id, result.name
        ));
    }
    for error in &report.parse_errors {
        out.push_str(&format!("{}\n", display_parse_error(error, base)));
    }
    for root in &report.rejected {
        out.push_str(&format!("{}: rejected root\n", root.display()));
    }
    out
}

fn display_parse_error(error: &ParseError, base: Option<&Path>) -> String {
    let path = display_path(&error.path, base);
    match error.kind {
        ParseErrorKind::Syntax => format!(
            "{path}:{}:{}: parse error: {}",
            error.line, error.column, error.message
        ),
        ParseErrorKind::Read => format!("{path}: read error: {}", error.message),
    }
}
