// Error types
// -----------
// Library modules return these typed errors; the binary and the UI layer
// wrap them in `anyhow` with extra context before printing.

use thiserror::Error;

/// Failures talking to the storage API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{endpoint} returned {status}: {summary}")]
    Status {
        endpoint: String,
        status: u16,
        summary: String,
    },

    /// The response body did not have the expected shape.
    #[error("could not decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// A union value came back with a tag we do not handle.
    #[error("unexpected {endpoint} response: {detail}")]
    Unexpected { endpoint: String, detail: String },

    /// No token configured, or it cannot be sent as a header.
    #[error("access token is missing or malformed")]
    InvalidToken,
}

impl ApiError {
    /// Whether the server rejected the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::InvalidToken | ApiError::Status { status: 401, .. })
    }
}

/// Top-level error for a purge run.
#[derive(Error, Debug)]
pub enum PurgeError {
    #[error("invalid regex '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
