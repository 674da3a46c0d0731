//! Centralized error types for takeout-xref.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the takeout-xref library.
#[derive(Error, Debug)]
pub enum XrefError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The XML export is not well formed.
    #[error("Malformed XML in '{path}' at byte {position}: {reason}")]
    Xml {
        path: PathBuf,
        position: u64,
        reason: String,
    },

    /// A node the export format requires is missing.
    #[error("Missing required node '{node}' in '{path}' (document #{document})")]
    MissingNode {
        path: PathBuf,
        node: &'static str,
        document: usize,
    },

    /// A `DateTime` tag value did not match the export's date pattern.
    #[error("Tag '{tag}' has an invalid DateTime value '{value}'")]
    InvalidDateTime { tag: String, value: String },

    /// A host format version string could not be parsed.
    #[error("Invalid format version: {0}")]
    InvalidVersion(String),

    /// None of the supplied XML files could be parsed.
    #[error("No XML file could be parsed ({failed} failed)")]
    NoXmlParsed { failed: usize },

    /// The run could not be prepared (output directory, worker pool).
    #[error("Setup failed: {0}")]
    Setup(String),

    /// The host case store or annotator reported a failure.
    #[error("Host error: {0}")]
    Host(String),

    /// A report file could not be written or read back.
    #[error("Report error: {0}")]
    Report(String),
}

/// Convenience alias for `Result<T, XrefError>`.
pub type Result<T> = std::result::Result<T, XrefError>;

impl XrefError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `XrefError`
/// when no path context is available (rare, prefer `XrefError::io`).
impl From<std::io::Error> for XrefError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
