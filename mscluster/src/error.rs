use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by filters, scorers and clustering engines.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is out of its valid range.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },

    /// The spectrum has no peaks left after the storage filter.
    #[error("spectrum {id} has no peaks after filtering")]
    EmptySpectrum { id: String },

    /// A cluster without members was offered to an engine.
    #[error("cluster {id} has no members")]
    EmptyCluster { id: String },

    /// The incremental engine received a precursor m/z below the previous arrival.
    #[error("cluster {id} arrived out of order: precursor m/z {current} after {previous}")]
    OutOfOrder {
        id: String,
        previous: f64,
        current: f64,
    },

    /// Malformed input values, e.g. a non-finite precursor m/z.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A statistical distribution could not be constructed.
    #[error("statistics error: {0}")]
    Statistics(String),

    /// Malformed JSON configuration or distribution table.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// File I/O error with path context.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The worker pool for sharded clustering could not be built.
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter { name, message: message.into() }
    }
}
