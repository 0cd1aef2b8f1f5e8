//! Wire format and plain-data types shared across the mesh: chat messages,
//! groups, peers, the packet envelope/codec, and the dedup set.
//!
//! This crate has no I/O and no async runtime dependency; it is the part of
//! GitChat that every other crate (and every test) can construct in
//! isolation.

pub mod dedup;
pub mod error;
pub mod group;
pub mod ids;
pub mod message;
pub mod packet;
pub mod peer;

pub use dedup::SeenSet;
pub use error::{CodecError, IdentityError};
pub use group::MeshGroup;
pub use message::{ChatMessage, MessageType, BROADCAST};
pub use packet::MeshPacket;
pub use peer::{EstimatedDistance, MeshPeer};
