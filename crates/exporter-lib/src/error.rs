//! Error types for the exporter
//!
//! Three families, matching how far a failure is allowed to travel:
//! - [`ConfigError`]: fatal, raised before the scrape loop starts
//! - [`ClientError`]: transport and decode failures, isolated to one fetch
//! - [`ExtractError`]: a decoded MBean reading with no usable number in it

use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration {value:?}: {source}")]
    InvalidDuration {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("failed to parse PuppetDB URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0} is not a valid http scheme")]
    UnsupportedScheme(String),

    #[error("https requires a {0}")]
    MissingTlsMaterial(&'static str),

    #[error("failed to load {what} from {}: {source}", path.display())]
    TlsMaterial {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {what}: {source}")]
    InvalidTls {
        what: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Errors talking to the PuppetDB API
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to call {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("failed to decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("invalid request to {endpoint}: {reason}")]
    InvalidRequest { endpoint: String, reason: String },
}

impl ClientError {
    /// Value of the `error_type` label on the scrape error counter
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Transport { .. } => "connection_error",
            ClientError::Status { .. } => "http_status",
            ClientError::Decode { .. } => "decode_error",
            ClientError::InvalidRequest { .. } => "invalid_request",
        }
    }
}

/// A reading that could not be reduced to a number
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    #[error("no suitable value found in MBean reading for {0}")]
    UnrecognizedShape(String),

    #[error("remote error reading {mbean}: {message}")]
    Remote { mbean: String, message: String },

    #[error("cannot parse string value {0:?}")]
    Unparseable(String),

    #[error("unsupported value type {0}")]
    UnsupportedType(&'static str),

    #[error("field {0} not found in MBean reading")]
    MissingField(String),
}

impl ExtractError {
    pub fn kind(&self) -> &'static str {
        "shape_error"
    }
}

/// Failure of a single MBean read: either the fetch or the extraction
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl ReadError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReadError::Client(e) => e.kind(),
            ReadError::Extract(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_kinds() {
        let status = ClientError::Status {
            endpoint: "/status/v1/services".to_string(),
            status: 503,
        };
        assert_eq!(status.kind(), "http_status");
        assert_eq!(status.to_string(), "/status/v1/services returned status 503");

        let decode = ClientError::Decode {
            endpoint: "/pdb/query/v4/nodes".to_string(),
            reason: "expected value".to_string(),
        };
        assert_eq!(decode.kind(), "decode_error");
    }

    #[test]
    fn test_read_error_kind_follows_source() {
        let err: ReadError = ExtractError::UnrecognizedShape("java.lang:type=Memory".into()).into();
        assert_eq!(err.kind(), "shape_error");

        let err: ReadError = ClientError::InvalidRequest {
            endpoint: "x".into(),
            reason: "bad".into(),
        }
        .into();
        assert_eq!(err.kind(), "invalid_request");
    }
}
