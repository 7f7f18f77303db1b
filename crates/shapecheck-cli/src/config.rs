//! The `config.yml` settings file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config_resolver::CONFIG_FILE_NAME;

/// Errors while loading a configuration directory.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The directory has no `config.yml`.
    #[error("no config.yml in {}", dir.display())]
    Missing {
        /// The configuration directory.
        dir: PathBuf,
    },

    /// `config.yml` could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The settings file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `config.yml` is not valid.
    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        /// The settings file.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ConfigFileDto {
    shapecheck: SettingsDto,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SettingsDto {
    #[serde(default)]
    checks_file: Option<OneOrMany>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    respect_gitignore: bool,
    #[serde(default)]
    parallelism: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<PathBuf> {
        match self {
            Self::One(path) => vec![path],
            Self::Many(paths) => paths,
        }
    }
}

/// Settings loaded from a configuration directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The configuration directory.
    pub dir: PathBuf,
    /// Checks files, resolved against `dir`.
    pub checks_files: Vec<PathBuf>,
    /// Exclude globs.
    pub exclude: Vec<String>,
    /// Whether `.gitignore` files are honored.
    pub respect_gitignore: bool,
    /// Worker threads, if configured.
    pub parallelism: Option<usize>,
}

impl Config {
    /// Loads `config.yml` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or invalid.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Err(ConfigError::Missing {
                dir: dir.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(dir, &path, &text)
    }

    fn from_yaml(dir: &Path, path: &Path, text: &str) -> Result<Self, ConfigError> {
        let dto: ConfigFileDto = serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = dto.shapecheck;
        let checks_files: Vec<PathBuf> = settings
            .checks_file
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(|p| if p.is_absolute() { p } else { dir.join(p) })
            .collect();
        Ok(Self {
            dir: dir.to_path_buf(),
            checks_files,
            exclude: settings.exclude,
            respect_gitignore: settings.respect_gitignore,
            parallelism: settings.parallelism,
        })
    }
}
