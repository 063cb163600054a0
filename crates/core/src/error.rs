//! Unified error types for imgcache.
//!
//! Every variant renders with a stable code prefix so log lines and tool
//! responses can be matched on without parsing free text.
//!
//! Most manager operations never surface these: fetch failures become
//! `false` or a failed count, and store failures on read paths become misses.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error type for the image cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL list).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL could not be parsed or uses an unsupported scheme.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The response was received but is not a usable image.
    #[error("FETCH_FAILED: {0}")]
    FetchFailed(String),

    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Declared or streamed body exceeded the byte limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Non-success HTTP status.
    #[error("HTTP_ERROR: status {0}")]
    HttpStatus(u16),

    /// Connection, TLS or body read failure.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Metadata store operation failed.
    #[error("CACHE_ERROR: {0}")]
    Store(tokio_rusqlite::Error),

    /// Metadata schema could not be brought up to date.
    #[error("CACHE_ERROR: schema: {0}")]
    Schema(String),

    /// Filesystem operation on the content store failed.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// JSON-RPC error code reported to MCP clients.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Error::InvalidInput(_) => -32602,
            Error::InvalidUrl(_) => -32003,
            Error::FetchFailed(_) | Error::FetchTimeout(_) | Error::Network(_) => -32006,
            Error::FetchTooLarge(_) => -32007,
            Error::HttpStatus(_) => -32008,
            Error::Store(_) | Error::Schema(_) => -32002,
            Error::Io(_) => -32013,
        }
    }

    /// True for failures of the remote side rather than local state.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Error::FetchFailed(_)
                | Error::FetchTimeout(_)
                | Error::FetchTooLarge(_)
                | Error::HttpStatus(_)
                | Error::Network(_)
        )
    }
}

/// Unwraps errors raised inside a `Connection::call` closure.
impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(inner) => inner,
            tokio_rusqlite::Error::Close(close) => Error::Store(tokio_rusqlite::Error::Close(close)),
            _ => Error::Store(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Store(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        McpError { code: ErrorCode(err.rpc_code()), message: err.to_string().into(), data: None }
    }
}
