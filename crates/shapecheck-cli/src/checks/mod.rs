//! Checks files: the YAML rule sets fed into an analysis.

mod dto;
mod loader;

pub use loader::{load_files, LoadError};
