//! Error taxonomy shared by the loaders, the estimator, and the gateway.

use std::path::PathBuf;

use serde::Serialize;

/// Fatal failure while loading a static data source at startup.
///
/// Per-entry problems never produce this error; they are collected as
/// skipped entries or dropped-row counts by the individual loaders.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The source could not be read.
    #[error("cannot read \"{}\": {source}", path.display())]
    Io {
        /// Path that failed to open or read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source is not valid JSON.
    #[error("invalid JSON in {what}: {source}")]
    Json {
        /// Which source failed (`"city catalog"`, `"boundary geometry"`).
        what: &'static str,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The source is valid JSON or CSV but not of the expected shape.
    #[error("malformed {what}: {message}")]
    Malformed {
        /// Which source failed.
        what: &'static str,
        /// Description of the structural problem.
        message: String,
    },

    /// The tabular source is missing a required column.
    #[error("forecast dataset is missing required column `{0}`")]
    MissingColumn(&'static str),

    /// The tabular source could not be read as CSV.
    #[error("forecast dataset is not readable CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Rejected argument, raised before any I/O takes place.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid input `{field}`: {message}")]
pub struct InvalidInput {
    /// Name of the offending argument.
    pub field: &'static str,
    /// Human-readable constraint description.
    pub message: String,
}

impl InvalidInput {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Failure to set up a prediction gateway at startup.
#[derive(Debug, thiserror::Error)]
pub enum GatewayInitError {
    /// The endpoint is not an absolute `http` or `https` URL.
    #[error("invalid prediction endpoint \"{endpoint}\": {message}")]
    Endpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// What is wrong with it.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Typed failure outcome of a prediction request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictionError {
    /// The region or date was rejected before the request was sent.
    #[error(transparent)]
    InvalidInput(#[from] InvalidInput),

    /// Connection failure or timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("prediction service returned HTTP {status}: {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Success status, but the body lacks the required numeric fields.
    #[error("malformed prediction response: {0}")]
    MalformedResponse(String),
}

impl PredictionError {
    /// Reduces the error to the kind carried by a settled snapshot.
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidInput(_) => FailureKind::InvalidInput,
            Self::Network(_) => FailureKind::NetworkError,
            Self::Server { .. } => FailureKind::ServerError,
            Self::MalformedResponse(_) => FailureKind::MalformedResponse,
        }
    }
}

/// Failure kind published to consumers in place of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad region or date.
    InvalidInput,
    /// Connection failure or timeout.
    NetworkError,
    /// Non-success HTTP status.
    ServerError,
    /// Response body missing required fields.
    MalformedResponse,
}
