use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} is not a DICOM JSON dataset: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory available on this platform")]
    NoConfigDir,
    #[error("config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no last opened file recorded")]
    NoLastFile,
    #[error("last opened file no longer exists: {0}")]
    MissingLastFile(PathBuf),
}
