//! Chat message type exchanged over the mesh and held by the persistent store.
//!
//! `id` is caller-generated and immutable; it is the only thing dedup and
//! the store key on. `body` only ever changes through a subsequent edit;
//! `is_deleted = true` is terminal (see spec §3).

use serde::{Deserialize, Serialize};

/// Distinguishes how a message's `body` should be interpreted by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    ImageFile,
    Link,
}

/// The broadcast recipient sentinel used in [`ChatMessage::to`].
pub const BROADCAST: &str = "broadcast";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub timestamp: u64,
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub is_relayed: bool,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub message_type: MessageType,
}

impl ChatMessage {
    /// New outbound message, not yet relayed. `id` is generated by the caller
    /// (the reference client uses a v4 UUID; see [`crate::ids::generate_message_id`]).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        body: impl Into<String>,
        timestamp: u64,
        ttl: u32,
        group_id: Option<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            body: body.into(),
            timestamp,
            ttl,
            group_id,
            is_relayed: false,
            is_edited: false,
            is_deleted: false,
            message_type,
        }
    }

    /// Produce the relay copy of this message: TTL decremented, flagged as
    /// relayed, identity (`id`) preserved. Caller must have already checked
    /// `ttl > 0`.
    pub fn into_relay(mut self) -> Self {
        self.ttl = self.ttl.saturating_sub(1);
        self.is_relayed = true;
        self
    }

    pub fn is_group(&self) -> bool {
        self.group_id.as_deref().is_some_and(|g| !g.is_empty())
    }
}
