use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// An application-level failure carried across the wire as a rejected
/// deferred value.
#[derive(ThisError, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct Rejection {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl Rejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), digest: None }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }
}

impl From<&FlightError> for Rejection {
    fn from(error: &FlightError) -> Self {
        match error {
            FlightError::Rejected(rejection) => rejection.clone(),
            other => Rejection::new(other.to_string()).with_digest(other.code()),
        }
    }
}

#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum FlightError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid element: {0}")]
    InvalidNode(String),

    #[error("Unsupported element kind: {0}")]
    UnsupportedElement(String),

    #[error("Value is not serializable: {0}")]
    NotSerializable(String),

    #[error("Malformed stream: {0}")]
    Malformed(String),

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream cancelled")]
    Cancelled,

    #[error("Stream ended with {0} unsettled deferred value(s)")]
    Incomplete(usize),

    #[error("row of {len} bytes exceeds the limit of {limit} bytes")]
    RowTooLarge { len: usize, limit: usize },

    #[error("Decode task failed: {0}")]
    TaskFailed(String),
}

impl FlightError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidNode(_) => "INVALID_NODE",
            Self::UnsupportedElement(_) => "UNSUPPORTED_ELEMENT",
            Self::NotSerializable(_) => "NOT_SERIALIZABLE",
            Self::Malformed(_) => "MALFORMED_STREAM",
            Self::Rejected(_) => "REJECTED",
            Self::Io(_) => "IO_ERROR",
            Self::Network(_) => "NETWORK",
            Self::Cancelled => "CANCELLED",
            Self::Incomplete(_) => "INCOMPLETE_STREAM",
            Self::RowTooLarge { .. } => "ROW_TOO_LARGE",
            Self::TaskFailed(_) => "TASK_FAILED",
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invalid_node(message: impl Into<String>) -> Self {
        Self::InvalidNode(message.into())
    }

    pub fn unsupported_element(message: impl Into<String>) -> Self {
        Self::UnsupportedElement(message.into())
    }

    pub fn not_serializable(message: impl Into<String>) -> Self {
        Self::NotSerializable(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn row_too_large(len: usize, limit: usize) -> Self {
        Self::RowTooLarge { len, limit }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Errors caused by the shape of the tree or the stream rather than by
    /// application code.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::InvalidNode(_)
                | Self::UnsupportedElement(_)
                | Self::NotSerializable(_)
                | Self::Malformed(_)
                | Self::RowTooLarge { .. }
        )
    }
}

impl From<std::io::Error> for FlightError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for FlightError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed(format!("invalid JSON payload: {error}"))
    }
}

impl From<reqwest::Error> for FlightError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}
