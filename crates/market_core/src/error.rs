use thiserror::Error;

/// Failure taxonomy shared by every component of the client layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No response was received (DNS, refused connection, offline, timeout).
    #[error("{0}")]
    Network(String),
    /// The request could not be built, so nothing was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// A response arrived with a status outside `200..300`.
    #[error("{message}")]
    Http { status: u16, message: String },
    /// The operation was superseded or explicitly cancelled.
    #[error("cancelled")]
    Cancelled,
    /// Local field validation failed; never touches the network.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    /// A batch was rejected before dispatch because it would exceed capacity.
    #[error("cannot add {requested} images: {accepted} of {max} already used")]
    Capacity {
        requested: usize,
        accepted: usize,
        max: usize,
    },
    /// The response body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
    /// The backend answered with `success: false`.
    #[error("{0}")]
    Api(String),
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    /// HTTP status of the failure, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
