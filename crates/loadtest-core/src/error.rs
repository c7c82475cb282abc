use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the load-test analysis pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot table could not be parsed as a header-based table.
    #[error("Malformed table {path}: {reason}")]
    MalformedTable { path: PathBuf, reason: String },

    /// A column required by the canonical schema has no accepted alias.
    #[error("Missing column {column} in {table}")]
    MissingColumn { table: String, column: String },

    /// A timestamp string did not match any recognised format.
    #[error("Invalid timestamp format: {0}")]
    TimestampParse(String),

    /// A value that must be a finite, non-negative number was not.
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// A single chart could not be drawn or written.
    #[error("Failed to render chart {chart}: {reason}")]
    Render { chart: String, reason: String },

    /// The HTML report template could not be rendered.
    #[error("Report template error: {0}")]
    Template(String),

    /// No run directory was given and none could be discovered.
    #[error("No results directory found under {0}")]
    NoRunDirectory(PathBuf),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the loadtest crates.
pub type Result<T> = std::result::Result<T, PipelineError>;
