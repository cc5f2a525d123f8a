use thiserror::Error;

/// Boxed cause carried by [`PipelineError::SourceUnavailable`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures that abort ingestion of a source.
///
/// Per-cell sanitization failures are *not* represented here: a bad cell is
/// dropped and counted (see [`crate::data::sanitize::Rejection`]).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The file or URL could not be reached or read.
    #[error("source unavailable: {location}: {source}")]
    SourceUnavailable {
        location: String,
        #[source]
        source: BoxError,
    },

    /// The content was read but does not have the expected tabular shape.
    #[error("parse error in {location}: {message}")]
    Parse { location: String, message: String },

    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("rolling window {window} is outside 1..={max}")]
    InvalidWindow { window: usize, max: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn unavailable(location: impl Into<String>, source: impl Into<BoxError>) -> Self {
        PipelineError::SourceUnavailable {
            location: location.into(),
            source: source.into(),
        }
    }

    pub fn parse(location: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Parse {
            location: location.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
