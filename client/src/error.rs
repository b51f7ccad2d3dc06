use thiserror::Error;
use war_api::error::WarError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed with status {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Http { status: u16, message: Option<String> },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("authentication required")]
    AuthRequired,

    #[error("socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("socket protocol error: {0}")]
    Protocol(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("session closed")]
    SessionClosed,

    #[error(transparent)]
    Api(#[from] WarError),
}

impl ClientError {
    /// Status codes the backend uses for a missing or rejected token.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ClientError::AuthRequired => true,
            ClientError::Http { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
