//! Configure command implementation.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::config_resolver::{CONFIG_FILE_NAME, PROJECT_CONFIG_DIR};

const CHECKS_FILE_NAME: &str = "checks.yml";

const DEFAULT_CONFIG: &str = r"# shapecheck configuration
shapecheck:
  # Checks files, relative to this directory
  checks-file:
    - checks.yml

  # Glob patterns to exclude from analysis
  exclude:
    - '**/.venv/**'
    - '**/__pycache__/**'

  # Respect .gitignore files
  respect-gitignore: false

  # Worker threads (default: one per core)
  # parallelism: 4
";

const DEFAULT_CHECKS: &str = r#"# Each check selects nodes of Python's ast with an XPath pattern and
# bounds how many matches the whole project may have.
#
# count.min defaults to 1, count.max to unbounded.
checks:
  - name: Classes are defined
    code: CDF
    id: C001
    pattern: ".//ClassDef"

  - name: Non-test functions exist
    code: FDF
    id: F001
    pattern: ".//FunctionDef[not(contains(@name, 'test_'))]"
    count:
      min: 1
      max: null

  - name: No bare except clauses
    code: EXC
    id: E001
    pattern: ".//ExceptHandler[not(type)]"
    count:
      min: 0
      max: 0
"#;

/// Runs `configure create`.
pub fn create(dir: Option<&Path>, force: bool) -> Result<()> {
    let dir = dir.unwrap_or_else(|| Path::new(PROJECT_CONFIG_DIR));
    let config_path = dir.join(CONFIG_FILE_NAME);

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    std::fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let checks_path = dir.join(CHECKS_FILE_NAME);
    if force || !checks_path.exists() {
        std::fs::write(&checks_path, DEFAULT_CHECKS)
            .with_context(|| format!("Failed to write {}", checks_path.display()))?;
    }

    println!("Created {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Edit {} to describe your checks", checks_path.display());
    println!("  2. Run: shapecheck analyze .");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn creates_a_loadable_configuration() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("cfg");

        create(Some(&dir), false).unwrap();

        let config = Config::load(&dir).unwrap();
        assert_eq!(config.checks_files, vec![dir.join(CHECKS_FILE_NAME)]);
        let rules = crate::checks::load_files(&config.checks_files).unwrap();
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        create(Some(tmp.path()), false).unwrap();

        let err = create(Some(tmp.path()), false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert!(create(Some(tmp.path()), true).is_ok());
    }
}
