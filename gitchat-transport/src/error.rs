use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("endpoint not connected: {0}")]
    NotConnected(String),
    #[error("already connected to endpoint: {0}")]
    AlreadyConnected(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("transport is shutting down")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
