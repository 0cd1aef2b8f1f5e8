//! The mesh wire envelope: `{"type": <int>, "payload": {...}}`, plus the
//! legacy bare-message fallback (spec §3, §4.2, §6).
//!
//! Integer tags follow enum declaration order below; this file is the single
//! place that order is allowed to matter, so don't reorder variants without
//! checking every deployed peer understands the new tag for whatever moved.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;
use crate::group::MeshGroup;
use crate::message::ChatMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupJoinAckPayload {
    pub group_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEditPayload {
    pub id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletePayload {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadataPayload {
    pub message_id: String,
    pub payload_id: u64,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub timestamp: u64,
}

/// Carried only on chunk index 0 (spec §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageChunkMeta {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageChunkPayload {
    pub message_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ImageChunkMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOfferPayload {
    pub from: String,
    pub video: bool,
    pub intent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswerPayload {
    pub from: String,
    pub accepted: bool,
}

/// Doubles as the phase-2 "ready" handover signal (`ready: true`, no
/// candidate) and as a genuine (unused in-core) ICE relay slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidatePayload {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEndPayload {
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestPayload {
    pub message_ids: Vec<String>,
    pub group_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponsePayload {
    pub messages: Vec<ChatMessage>,
    pub groups: Vec<MeshGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfoPayload {
    pub device_model: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    pub ts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongPayload {
    pub ts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearMessagesPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// The envelope. Variant order is the wire tag (0-indexed); see module docs.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshPacket {
    Message(ChatMessage),
    GroupInvite(MeshGroup),
    GroupJoinAck(GroupJoinAckPayload),
    MessageEdit(MessageEditPayload),
    MessageDelete(MessageDeletePayload),
    ImageMetadata(ImageMetadataPayload),
    ImageChunk(ImageChunkPayload),
    CallOffer(CallOfferPayload),
    CallAnswer(CallAnswerPayload),
    IceCandidate(IceCandidatePayload),
    CallEnd(CallEndPayload),
    SyncRequest(SyncRequestPayload),
    SyncResponse(SyncResponsePayload),
    PeerInfo(PeerInfoPayload),
    Ping(PingPayload),
    Pong(PongPayload),
    ClearMessages(ClearMessagesPayload),
}

impl MeshPacket {
    fn tag(&self) -> u8 {
        match self {
            Self::Message(_) => 0,
            Self::GroupInvite(_) => 1,
            Self::GroupJoinAck(_) => 2,
            Self::MessageEdit(_) => 3,
            Self::MessageDelete(_) => 4,
            Self::ImageMetadata(_) => 5,
            Self::ImageChunk(_) => 6,
            Self::CallOffer(_) => 7,
            Self::CallAnswer(_) => 8,
            Self::IceCandidate(_) => 9,
            Self::CallEnd(_) => 10,
            Self::SyncRequest(_) => 11,
            Self::SyncResponse(_) => 12,
            Self::PeerInfo(_) => 13,
            Self::Ping(_) => 14,
            Self::Pong(_) => 15,
            Self::ClearMessages(_) => 16,
        }
    }

    fn payload_value(&self) -> Result<Value, CodecError> {
        Ok(match self {
            Self::Message(p) => serde_json::to_value(p)?,
            Self::GroupInvite(p) => serde_json::to_value(p)?,
            Self::GroupJoinAck(p) => serde_json::to_value(p)?,
            Self::MessageEdit(p) => serde_json::to_value(p)?,
            Self::MessageDelete(p) => serde_json::to_value(p)?,
            Self::ImageMetadata(p) => serde_json::to_value(p)?,
            Self::ImageChunk(p) => serde_json::to_value(p)?,
            Self::CallOffer(p) => serde_json::to_value(p)?,
            Self::CallAnswer(p) => serde_json::to_value(p)?,
            Self::IceCandidate(p) => serde_json::to_value(p)?,
            Self::CallEnd(p) => serde_json::to_value(p)?,
            Self::SyncRequest(p) => serde_json::to_value(p)?,
            Self::SyncResponse(p) => serde_json::to_value(p)?,
            Self::PeerInfo(p) => serde_json::to_value(p)?,
            Self::Ping(p) => serde_json::to_value(p)?,
            Self::Pong(p) => serde_json::to_value(p)?,
            Self::ClearMessages(p) => serde_json::to_value(p)?,
        })
    }

    /// Encode to canonical JSON: stable field order `type, payload`.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(b"{\"type\":");
        buf.extend_from_slice(self.tag().to_string().as_bytes());
        buf.extend_from_slice(b",\"payload\":");
        serde_json::to_writer(&mut buf, &self.payload_value()?)?;
        buf.push(b'}');
        Ok(buf)
    }

    fn from_tag_and_payload(tag: u8, payload: Value) -> Result<Self, CodecError> {
        Ok(match tag {
            0 => Self::Message(serde_json::from_value(payload)?),
            1 => Self::GroupInvite(serde_json::from_value(payload)?),
            2 => Self::GroupJoinAck(serde_json::from_value(payload)?),
            3 => Self::MessageEdit(serde_json::from_value(payload)?),
            4 => Self::MessageDelete(serde_json::from_value(payload)?),
            5 => Self::ImageMetadata(serde_json::from_value(payload)?),
            6 => Self::ImageChunk(serde_json::from_value(payload)?),
            7 => Self::CallOffer(serde_json::from_value(payload)?),
            8 => Self::CallAnswer(serde_json::from_value(payload)?),
            9 => Self::IceCandidate(serde_json::from_value(payload)?),
            10 => Self::CallEnd(serde_json::from_value(payload)?),
            11 => Self::SyncRequest(serde_json::from_value(payload)?),
            12 => Self::SyncResponse(serde_json::from_value(payload)?),
            13 => Self::PeerInfo(serde_json::from_value(payload)?),
            14 => Self::Ping(serde_json::from_value(payload)?),
            15 => Self::Pong(serde_json::from_value(payload)?),
            16 => Self::ClearMessages(serde_json::from_value(payload)?),
            other => return Err(CodecError::UnknownTag(other)),
        })
    }

    /// Decode an envelope or legacy bare-message frame. Never fails silently
    /// upward past this call — callers at the transport boundary are expected
    /// to log-and-drop on `Err`, per spec §4.2 / §7 `DecodeError`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(map) = value else {
            return Err(CodecError::Malformed(serde::de::Error::custom(
                "top-level frame is not a JSON object",
            )));
        };
        match (map.get("type"), map.get("payload")) {
            (Some(Value::Number(tag)), Some(payload)) => {
                let tag = tag
                    .as_u64()
                    .and_then(|v| u8::try_from(v).ok())
                    .ok_or_else(|| CodecError::Malformed(serde::de::Error::custom("type is not a small integer")))?;
                Self::from_tag_and_payload(tag, payload.clone())
            }
            _ => {
                // Legacy form: the whole object is a bare ChatMessage.
                let msg: ChatMessage = serde_json::from_value(Value::Object(map))?;
                Ok(Self::Message(msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn sample_message() -> ChatMessage {
        ChatMessage::new("m1", "alice", "broadcast", "hi", 123, 3, None, MessageType::Text)
    }

    #[test]
    fn round_trips_every_variant() {
        let packets = vec![
            MeshPacket::Message(sample_message()),
            MeshPacket::GroupInvite(MeshGroup::new("MESH_AAAAAA", "g", "alice", 0, "key", None)),
            MeshPacket::GroupJoinAck(GroupJoinAckPayload { group_id: "MESH_AAAAAA".into(), username: "bob".into() }),
            MeshPacket::MessageEdit(MessageEditPayload { id: "m1".into(), body: "hello".into() }),
            MeshPacket::MessageDelete(MessageDeletePayload { id: "m1".into() }),
            MeshPacket::ImageMetadata(ImageMetadataPayload {
                message_id: "m2".into(),
                payload_id: 7,
                from: "alice".into(),
                to: "broadcast".into(),
                group_id: None,
                timestamp: 1,
            }),
            MeshPacket::ImageChunk(ImageChunkPayload {
                message_id: "m2".into(),
                chunk_index: 0,
                total_chunks: 2,
                data: "abcd".into(),
                meta: Some(ImageChunkMeta { from: "alice".into(), to: "broadcast".into(), group_id: None, timestamp: 1 }),
            }),
            MeshPacket::CallOffer(CallOfferPayload { from: "alice".into(), video: true, intent: true }),
            MeshPacket::CallAnswer(CallAnswerPayload { from: "bob".into(), accepted: true }),
            MeshPacket::IceCandidate(IceCandidatePayload { from: "alice".into(), ready: Some(true), candidate: None }),
            MeshPacket::CallEnd(CallEndPayload { from: "alice".into() }),
            MeshPacket::SyncRequest(SyncRequestPayload { message_ids: vec!["m1".into()], group_ids: vec![] }),
            MeshPacket::SyncResponse(SyncResponsePayload { messages: vec![sample_message()], groups: vec![] }),
            MeshPacket::PeerInfo(PeerInfoPayload { device_model: "Pixel".into(), name: "alice".into() }),
            MeshPacket::Ping(PingPayload { ts: 42 }),
            MeshPacket::Pong(PongPayload { ts: 42 }),
            MeshPacket::ClearMessages(ClearMessagesPayload { group_id: None }),
        ];
        for p in packets {
            let bytes = p.encode().unwrap();
            let back = MeshPacket::decode(&bytes).unwrap();
            assert_eq!(p, back);
        }
    }

    #[test]
    fn legacy_bare_message_decodes_as_message() {
        let msg = sample_message();
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded = MeshPacket::decode(&bytes).unwrap();
        assert_eq!(decoded, MeshPacket::Message(msg));
    }

    #[test]
    fn unknown_tag_is_an_error_not_a_panic() {
        let bytes = br#"{"type":255,"payload":{}}"#;
        assert!(matches!(MeshPacket::decode(bytes), Err(CodecError::UnknownTag(255))));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(MeshPacket::decode(b"not json").is_err());
    }

    #[test]
    fn encoded_field_order_is_type_then_payload() {
        let bytes = MeshPacket::Ping(PingPayload { ts: 1 }).encode().unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.find("\"type\"").unwrap() < s.find("\"payload\"").unwrap());
    }
}
