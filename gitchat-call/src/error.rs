use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("no connected peers")]
    NoPeers,
    #[error("camera/microphone permission not granted")]
    PermissionDenied,
    #[error("already in a call")]
    AlreadyInCall,
    #[error("not in a call")]
    NotInCall,
    #[error("phase-2 handover timed out: {0}")]
    Phase2Timeout(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Mesh(#[from] gitchat_mesh::MeshError),
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
}
