//! UI-facing event surface (spec §6): three broadcast streams plus the
//! system refresh signal `ClearMessages` produces.

use gitchat_core::{ChatMessage, MeshGroup};
use tokio::sync::broadcast;

/// A call-signaling packet handed to the Call Orchestrator, tagged with its
/// kind and the endpoint it arrived from (spec §4.4 CallOffer/.../CallEnd).
#[derive(Debug, Clone, PartialEq)]
pub enum CallSignal {
    Offer { source_endpoint: String, from: String, video: bool, intent: bool },
    Answer { source_endpoint: String, from: String, accepted: bool },
    Ice { source_endpoint: String, from: String, ready: Option<bool>, candidate: Option<String> },
    End { source_endpoint: String, from: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    MessagesCleared { group_id: Option<String> },
}

const CHANNEL_CAPACITY: usize = 256;

pub struct MeshEvents {
    pub messages: broadcast::Sender<ChatMessage>,
    pub group_invites: broadcast::Sender<MeshGroup>,
    pub call_signals: broadcast::Sender<CallSignal>,
    pub system: broadcast::Sender<SystemEvent>,
}

impl MeshEvents {
    pub fn new() -> Self {
        Self {
            messages: broadcast::channel(CHANNEL_CAPACITY).0,
            group_invites: broadcast::channel(CHANNEL_CAPACITY).0,
            call_signals: broadcast::channel(CHANNEL_CAPACITY).0,
            system: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }
}

impl Default for MeshEvents {
    fn default() -> Self {
        Self::new()
    }
}
