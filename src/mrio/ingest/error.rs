use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error type covering the failure cases that abort a parse. No partial
/// system is ever returned alongside one of these.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Wrapper for IO failures such as reading files or listing folders.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON configuration or parameter files fail to parse.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the delimited text reader.
    #[error("delimited text error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors bubbled up from the spreadsheet reader.
    #[error("spreadsheet read error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// Errors raised while opening or reading zip archives.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Raised when a configured filename or label pattern is not a valid regex.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The layout of a delimited file or sheet could not be determined.
    #[error("could not detect layout of {path}: {reason}")]
    FormatDetection { path: String, reason: String },

    /// A required logical table has no matching file at the location.
    #[error("no source file for table '{table}' found in {location}")]
    MissingSourceFile { table: String, location: PathBuf },

    /// The raw data does not have the shape the adapter expects.
    #[error("structure mismatch in '{table}': {reason}")]
    StructureMismatch { table: String, reason: String },

    /// The source release or layout is not handled by the adapter.
    #[error("unsupported {source_name} version: {detail}")]
    UnsupportedVersion { source_name: String, detail: String },

    /// `I - A` could not be inverted reliably.
    #[error("singular matrix: condition number {condition:e} exceeds threshold {threshold:e}")]
    SingularMatrix { condition: f64, threshold: f64 },

    /// Raised when caller supplied parameters are inconsistent.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl IngestError {
    pub(crate) fn structure(table: impl Into<String>, reason: impl Into<String>) -> Self {
        IngestError::StructureMismatch {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn format(path: impl Into<String>, reason: impl Into<String>) -> Self {
        IngestError::FormatDetection {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Non-fatal degradations. A parse that records one of these still returns a
/// system; the same information is mirrored in the provenance log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// An optional satellite account was left out.
    ExtensionUnavailable { extension: String, reason: String },
    /// Several files matched one logical table; the first one was used.
    AmbiguousSourceFile {
        table: String,
        candidates: Vec<String>,
        chosen: String,
    },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::ExtensionUnavailable { extension, reason } => {
                write!(f, "extension '{extension}' not included: {reason}")
            }
            ParseWarning::AmbiguousSourceFile {
                table,
                candidates,
                chosen,
            } => write!(
                f,
                "multiple files found for {table}: {} - using {chosen}",
                candidates.join(", ")
            ),
        }
    }
}
