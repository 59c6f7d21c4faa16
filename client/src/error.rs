//! Error taxonomy shared by every call made through this crate.
use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the Cloud Storage Service client.
#[derive(Debug, Error)]
pub enum Error {
    /// The authorization server rejected the client-credentials exchange.
    #[error("authentication failed at {endpoint} (HTTP {status}): {body}")]
    Auth {
        endpoint: String,
        status: u16,
        /// Raw error payload returned by the authorization server
        body: String,
    },

    /// A data endpoint returned a non-2xx response.
    #[error("HTTP {status} from {method} {endpoint}: {body}")]
    Http {
        method: String,
        endpoint: String,
        status: u16,
        body: String,
    },

    /// A response body did not have the expected shape.
    #[error("malformed response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    /// A local sink could not be written.
    #[error("I/O error writing {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The request could not be sent or its body could not be read (including timeouts).
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Invalid client, credential or export configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn io<S: Into<String>>(target: S, source: std::io::Error) -> Self {
        Error::Io {
            target: target.into(),
            source,
        }
    }

    pub fn decode<S: Into<String>, M: ToString>(endpoint: S, message: M) -> Self {
        Error::Decode {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Return the HTTP status code associated with this error, if it was caused by an HTTP
    /// response (from either the authorization server or a data endpoint).
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::Auth { status, .. } | Error::Http { status, .. } => {
                StatusCode::from_u16(*status).ok()
            }
            Error::Transport { source, .. } => source.status(),
            _ => None,
        }
    }

    /// True if this error was caused by a request timing out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport { source, .. } if source.is_timeout())
    }
}
