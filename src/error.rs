// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a command. Remote data problems never end up here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("invalid date '{0}', expected today, yesterday or YYYY-MM-DD")]
    InvalidDate(String),

    #[error("lookback of {0} days reaches before the earliest representable date")]
    InvalidLookback(u32),

    #[error("invalid reporting UTC offset of {0} minutes")]
    InvalidOffset(i32),

    /// A location needed by the command is neither on the command line nor in the config
    #[error("no {0} given and none configured")]
    MissingLocation(&'static str),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A remote collaborator could not answer. The pipeline treats this as "no data".
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}
