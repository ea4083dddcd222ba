use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("not connected")]
    NotConnected,
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),
}
