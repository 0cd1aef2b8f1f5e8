use thiserror::Error;

/// Errors surfaced while decoding or encoding a [`crate::packet::MeshPacket`].
///
/// A decode failure is never propagated past the transport boundary (the
/// router drops the frame and logs); this type exists so callers that *do*
/// want the reason (tests, diagnostics) can see it.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown packet type tag: {0}")]
    UnknownTag(u8),
}

/// Errors raised by identity/key-material helpers (group symmetric key,
/// group id generation inputs).
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid key length: expected {expected}, got {got}")]
    BadLen { expected: usize, got: usize },
}
