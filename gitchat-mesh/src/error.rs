use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("no peer record for endpoint {0}")]
    UnknownPeer(String),
    #[error("group not found: {0}")]
    UnknownGroup(String),
    #[error("wrong password for group {0}")]
    WrongPassword(String),
    #[error("already a member of group {0}")]
    AlreadyMember(String),
    #[error("no connected peers")]
    NoPeers,
    #[error(transparent)]
    Transport(#[from] gitchat_transport::TransportError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Persistence failures are logged and swallowed by the engine (spec §7
/// `StorageError`); this type exists so the store trait has something
/// concrete to return.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
