use thiserror::Error;

/// Errors raised by the upstream event source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The connection failed or a request could not be completed.
    #[error("upstream transport error: {0}")]
    Transport(String),
    /// The subscription was closed by the server.
    #[error("upstream subscription closed")]
    Closed,
    /// An event could not be decoded. The subscription itself is still usable.
    #[error("malformed upstream event: {0}")]
    Malformed(String),
}

impl From<jsonrpsee::core::ClientError> for UpstreamError {
    fn from(err: jsonrpsee::core::ClientError) -> Self {
        Self::Transport(err.to_string())
    }
}
