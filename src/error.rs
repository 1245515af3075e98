//! Error types for visualization exports.

use crate::models::ExportReport;
use crate::sql_augmenter::SqlAugmentError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while obtaining the visualization document.
///
/// Any of these aborts the export before a single sub-layer fetch is launched.
#[derive(Error, Debug)]
pub enum DocumentLoadError {
    /// Connection failure, timeout or body read failure
    #[error("Request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Server answered with a non-success status
    #[error("Request for {url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    /// Local document does not exist
    #[error("Visualization document not found: {0}")]
    NotFound(PathBuf),
    /// Reading or persisting the document failed
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Body was not valid JSON
    #[error("Invalid visualization JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// Source string could not be interpreted
    #[error("Invalid visualization source: {0}")]
    InvalidSource(String),
}

/// Failure of a single sub-layer export.
#[derive(Error, Debug)]
pub enum SublayerError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("SQL API returned status {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("Layer is missing SQL API options: {0}")]
    InvalidLayer(String),
    #[error("Sublayer has no SQL query")]
    MissingSql,
    #[error("Sublayer has no CartoCSS style")]
    MissingStyle,
    #[error("SQL parse error: {0}")]
    SqlParse(#[from] SqlAugmentError),
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SublayerError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SublayerError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Top-level export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to load visualization: {0}")]
    DocumentLoad(#[from] DocumentLoadError),
    /// Document loaded, but at least one sub-layer export failed
    #[error("{} of {} sublayer exports failed", .0.failures.len(), .0.attempted)]
    SublayersFailed(ExportReport),
}

impl ExportError {
    /// The partial report, when the failure happened after fan-out.
    pub fn report(&self) -> Option<&ExportReport> {
        match self {
            ExportError::SublayersFailed(report) => Some(report),
            _ => None,
        }
    }
}
