//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors, all fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),

    #[error("missing source folder `{0}`")]
    MissingSource(PathBuf),

    #[error("overlapping source/target folders `{0}` <-> `{1}`")]
    Overlapping(PathBuf, PathBuf),

    #[error("missing layout `{0}` (must be a file inside the source folder)")]
    MissingLayout(PathBuf),

    #[error("layout `{0}` has no file extension")]
    LayoutExtension(PathBuf),
}
