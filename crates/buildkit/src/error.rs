use std::path::PathBuf;

use thiserror::Error;

use crate::downloader::HashError;
use crate::http::HttpError;
use crate::tree::SubstitutionError;

/// Errors raised while loading, resolving or materializing config bundles.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Config bundle not found: {name}")]
    NotFound { name: String },

    #[error("Cyclic base bundle chain: {}", chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("Invalid base bundle {name}: {reason}")]
    InvalidBaseBundle { name: String, reason: String },

    #[error("Bundle already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Resources directory not found: {}", path.display())]
    ResourcesMissing { path: PathBuf },

    #[error("Failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BundleError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BundleError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        BundleError::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while loading `buildkit.toml` and environment overrides.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Errors surfaced by user bundle generation.
pub type GenerateError = BundleError;

/// Errors raised by the source retrieval pipeline and its stages.
#[derive(Error, Debug)]
pub enum RetrievalError {
    // Filesystem preconditions
    #[error("Buildspace tree already exists: {}", path.display())]
    TreeAlreadyExists { path: PathBuf },

    #[error("Buildspace tree does not exist: {}", path.display())]
    TreeMissing { path: PathBuf },

    #[error("Buildspace downloads does not exist: {}", path.display())]
    DownloadsDirMissing { path: PathBuf },

    #[error("Buildspace downloads is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    // Integrity
    #[error("Archive path is not a regular file: {}", path.display())]
    NotAFile { path: PathBuf },

    #[error("Checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Unsafe entry {entry} in archive {}", archive.display())]
    UnsafeArchiveEntry { archive: PathBuf, entry: String },

    // Targets and stages
    #[error("Unknown archive type: {}", path.display())]
    UnknownArchiveType { path: PathBuf },

    #[error("Invalid retrieval target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Invalid hash for {target}: {source}")]
    InvalidHash {
        target: String,
        #[source]
        source: HashError,
    },

    #[error("Download failed for {target}: {source}")]
    Download {
        target: String,
        #[source]
        source: HttpError,
    },

    #[error("Failed to extract {}: {reason}", archive.display())]
    Extraction { archive: PathBuf, reason: String },

    #[error("Failed to prune {}: {source}", path.display())]
    Prune {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pruning pattern {pattern}: {reason}")]
    PrunePattern { pattern: String, reason: String },

    #[error("Domain substitution failed: {0}")]
    Substitution(#[from] SubstitutionError),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Bundle {name} is read-only; generate a user bundle to substitute its patches")]
    BundleReadOnly { name: String },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RetrievalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RetrievalError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
