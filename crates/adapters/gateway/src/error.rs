//! Gateway adapter error types.

use rulehub_app::ports::GatewayError;

/// Errors of the discovery client.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The HTTP client could not be built.
    #[error("cannot build HTTP client")]
    Client(#[source] reqwest::Error),

    /// The request failed before a complete answer was received.
    #[error("request to the gateway failed")]
    Request(#[source] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("gateway answered with status {0}")]
    Status(reqwest::StatusCode),

    /// The answer is not a list of Thing descriptions.
    #[error("gateway answer is not a list of things")]
    Decode(#[source] serde_json::Error),
}

impl From<HttpError> for GatewayError {
    fn from(err: HttpError) -> Self {
        if matches!(err, HttpError::Decode(_)) {
            Self::Decode(Box::new(err))
        } else {
            Self::Transport(Box::new(err))
        }
    }
}
