//! Configuration directory resolution with global fallback.
//!
//! Resolves the configuration directory using a deterministic priority order:
//!
//! 1. `--config` flag (explicit directory)
//! 2. `./.shapecheck/` containing `config.yml`
//! 3. `$SHAPECHECK_CONFIG_DIR` or `~/.shapecheck/` containing `config.yml`
//! 4. No configuration found

use std::path::{Path, PathBuf};

/// Config file name within a configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Project-level configuration directory name.
pub const PROJECT_CONFIG_DIR: &str = ".shapecheck";

/// Where the configuration directory was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly specified via `--config` flag.
    Explicit(PathBuf),
    /// Found in the working directory.
    Project(PathBuf),
    /// Loaded from the global configuration directory.
    Global(PathBuf),
    /// No configuration found.
    None,
}

impl ConfigSource {
    /// Returns the resolved directory, if any.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        match self {
            Self::Explicit(p) | Self::Project(p) | Self::Global(p) => Some(p),
            Self::None => None,
        }
    }

    /// Returns `true` if the configuration came from the global directory.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global(_))
    }
}

/// Resolves the configuration directory.
///
/// Explicit beats project beats global; see the module docs.
#[must_use]
pub fn resolve(working_dir: &Path, explicit: Option<&Path>) -> ConfigSource {
    resolve_from(working_dir, explicit, global_config_dir())
}

/// Resolution with the global directory passed in.
fn resolve_from(
    working_dir: &Path,
    explicit: Option<&Path>,
    global_dir: Option<PathBuf>,
) -> ConfigSource {
    if let Some(dir) = explicit {
        return ConfigSource::Explicit(dir.to_path_buf());
    }

    let project = working_dir.join(PROJECT_CONFIG_DIR);
    if project.join(CONFIG_FILE_NAME).is_file() {
        tracing::debug!("Found project config: {}", project.display());
        return ConfigSource::Project(project);
    }

    if let Some(dir) = global_dir {
        if dir.join(CONFIG_FILE_NAME).is_file() {
            tracing::debug!("Found global config: {}", dir.display());
            return ConfigSource::Global(dir);
        }
    }

    ConfigSource::None
}

/// Returns the global configuration directory path.
///
/// Resolution: `$SHAPECHECK_CONFIG_DIR` > `~/.shapecheck/`
#[must_use]
pub fn global_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SHAPECHECK_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    home::home_dir().map(|h| h.join(PROJECT_CONFIG_DIR))
}
