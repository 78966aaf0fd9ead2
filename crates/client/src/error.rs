use skillswap_core::InvalidId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejected locally, before anything went over the network.
    #[error("{0}")]
    Validation(String),

    #[error("Not authorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict {
        message: String,
        current_status: Option<String>,
    },

    #[error("Request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Socket not connected")]
    NotConnected,

    #[error("Timed out waiting for the server")]
    Timeout,

    #[error("Socket authentication failed: {0}")]
    Auth(String),

    #[error("Socket error: {0}")]
    Socket(String),

    /// An `error` event answering one of our requests.
    #[error("{0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl From<InvalidId> for ClientError {
    fn from(err: InvalidId) -> Self {
        ClientError::Validation(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::{http::StatusCode, Error};

        match err {
            Error::Http(response) if response.status() == StatusCode::UNAUTHORIZED => {
                ClientError::Auth("token rejected".to_string())
            }
            other => ClientError::Socket(other.to_string()),
        }
    }
}

impl ClientError {
    /// The status the server reported when refusing a transition.
    pub fn current_status(&self) -> Option<&str> {
        match self {
            ClientError::Conflict { current_status, .. } => current_status.as_deref(),
            _ => None,
        }
    }
}
