//! Dump command implementation: prints a file's lowered tree as XML.

use std::path::Path;

use anyhow::{Context, Result};
use shapecheck_core::{ExitStatus, Extractor, ParseError};
use shapecheck_python::PythonExtractor;

/// Runs the dump command.
pub fn run(file: &Path) -> Result<ExitStatus> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let source = text.strip_prefix('\u{feff}').unwrap_or(&text);

    match PythonExtractor::new().extract(source) {
        Ok(tree) => {
            print!("{}", tree.to_xml());
            Ok(ExitStatus::Success)
        }
        Err(e) => {
            let error = ParseError::syntax(file.to_path_buf(), e.line, e.column, e.message);
            eprintln!("{:?}", miette::Report::new(error.to_diagnostic(source.to_string())));
            Ok(ExitStatus::Failure)
        }
    }
}
