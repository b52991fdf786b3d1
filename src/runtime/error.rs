use std::path::PathBuf;

use hyper::StatusCode;

use crate::container;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to socket `{path}`: {source}")]
    SocketConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to establish http connection: {0}")]
    Handshake(#[source] hyper::Error),
    #[error("failed to build request for `{path}`: {source}")]
    InvalidRequest {
        path: String,
        #[source]
        source: hyper::http::Error,
    },
    #[error("request to `{path}` failed: {source}")]
    Request {
        path: String,
        #[source]
        source: hyper::Error,
    },
    #[error("failed to read response body of `{path}`: {source}")]
    Body {
        path: String,
        #[source]
        source: hyper::Error,
    },
    #[error("no such container: {id}")]
    NotFound { id: String },
    #[error("unexpected status {status} for `{path}`: {message}")]
    Status {
        path: String,
        status: StatusCode,
        message: String,
    },
    #[error("failed to decode response of `{path}`: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Container(#[from] container::Error),
}

impl Error {
    /// Whether the error reports a container that does not exist (anymore).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
