//! Error types for the prediction client

use std::time::Duration;

use thiserror::Error;

/// Result type alias for the prediction client
pub type Result<T> = std::result::Result<T, PredictError>;

/// Main error type for the prediction client.
///
/// Failures carry their HTTP status as a typed field from the point where the
/// response was read, so retry classification never has to inspect messages.
#[derive(Debug, Error)]
pub enum PredictError {
    /// The deadline elapsed before the operation finished
    #[error("request timed out after {budget:?}")]
    Timeout { budget: Duration },

    /// A 5xx response or a connection-level failure
    #[error("{}", transient_message(*status, message))]
    Transient {
        status: Option<u16>,
        message: String,
    },

    /// A non-success response the server will keep refusing (4xx)
    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The retry budget ran out; carries the final failure
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<PredictError>,
    },

    /// One chunk of a bulk run failed terminally
    #[error("bulk prediction failed at chunk {chunk} (samples from {start}): {source}")]
    BulkFailure {
        chunk: usize,
        start: usize,
        #[source]
        source: Box<PredictError>,
    },

    /// The server answered a chunk with the wrong number of predictions
    #[error("chunk {chunk} expected {expected} predictions, server returned {actual}")]
    Misaligned {
        chunk: usize,
        expected: usize,
        actual: usize,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Invalid client or run configuration
    #[error("Configuration error: {message}")]
    Config { message: String },
}

fn transient_message(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("server error ({code}): {message}"),
        None => format!("network error: {message}"),
    }
}

impl PredictError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// HTTP status code attached to this failure, looking through wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } => *status,
            Self::Rejected { status, .. } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            Self::BulkFailure { source, .. } => source.status(),
            _ => None,
        }
    }

    /// The innermost failure once retry and bulk wrappers are peeled off.
    pub fn root(&self) -> &PredictError {
        match self {
            Self::Exhausted { last, .. } => last.root(),
            Self::BulkFailure { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for PredictError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transient {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
