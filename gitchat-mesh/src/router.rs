//! Decodes inbound bytes and dispatches on packet type (spec §4.4).
//!
//! `handle_inbound` is the single entry point `on_bytes(from_id, bytes)`
//! describes. It mutates shared state (store, peer table, dedup, pending
//! invites, chunk collector) and returns the list of packets that must now
//! be sent, leaving the actual transport I/O to the caller — this keeps the
//! dispatch logic testable without a live [`Transport`](gitchat_transport::Transport).

use std::collections::HashSet;
use std::sync::Arc;

use gitchat_core::packet::{ImageChunkPayload, MeshPacket, PingPayload, PongPayload};
use gitchat_core::{ids, ChatMessage, EstimatedDistance, MessageType, BROADCAST};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::chunk::ChunkCollector;
use crate::error::MeshError;
use crate::events::{CallSignal, MeshEvents, SystemEvent};
use crate::file_transfer::FileTransferTable;
use crate::group_manager::GroupManager;
use crate::peer_table::PeerTable;
use crate::store::Store;
use crate::sync;

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundTarget {
    Peer(String),
    AllExcept(String),
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: OutboundTarget,
    pub packet: MeshPacket,
}

impl Outbound {
    fn to(endpoint_id: impl Into<String>, packet: MeshPacket) -> Self {
        Self { target: OutboundTarget::Peer(endpoint_id.into()), packet }
    }

    fn relay(except: impl Into<String>, packet: MeshPacket) -> Self {
        Self { target: OutboundTarget::AllExcept(except.into()), packet }
    }
}

pub struct GossipRouter {
    self_name: String,
    seen: Mutex<gitchat_core::SeenSet>,
    synced_peers: Mutex<HashSet<String>>,
    chunks: ChunkCollector,
    pub files: FileTransferTable,
    peers: Arc<PeerTable>,
    groups: Arc<GroupManager>,
    store: Arc<dyn Store>,
    sync_batch_cap: usize,
    pub events: MeshEvents,
}

impl GossipRouter {
    pub fn new(self_name: impl Into<String>, dedup_capacity: usize, sync_batch_cap: usize, peers: Arc<PeerTable>, groups: Arc<GroupManager>, store: Arc<dyn Store>) -> Self {
        Self {
            self_name: self_name.into(),
            seen: Mutex::new(gitchat_core::SeenSet::new(dedup_capacity)),
            synced_peers: Mutex::new(HashSet::new()),
            chunks: ChunkCollector::new(),
            files: FileTransferTable::new(),
            peers,
            groups,
            store,
            sync_batch_cap,
            events: MeshEvents::new(),
        }
    }

    /// Mark a peer as synced; returns `true` the first time for that peer,
    /// matching invariant 8 ("exactly once per connection lifetime").
    pub async fn mark_synced(&self, endpoint_id: &str) -> bool {
        self.synced_peers.lock().await.insert(endpoint_id.to_string())
    }

    pub async fn forget_synced(&self, endpoint_id: &str) {
        self.synced_peers.lock().await.remove(endpoint_id);
    }

    /// Drop every per-peer sync guard (spec §5 `stopMesh`).
    pub async fn clear_synced(&self) {
        self.synced_peers.lock().await.clear();
    }

    /// Register a locally originated message id in the seen set before it
    /// ships, so a copy that loops back through the mesh is dropped as a
    /// duplicate instead of re-delivered (spec §3 Dedup Set).
    pub async fn mark_sent(&self, id: &str) {
        self.seen.lock().await.insert(id);
    }

    async fn is_for_me(&self, message: &ChatMessage) -> Result<bool, MeshError> {
        if let Some(group_id) = message.group_id.as_deref().filter(|g| !g.is_empty()) {
            return Ok(self.store.is_group_member(group_id, &self.self_name).await?);
        }
        Ok(message.to == self.self_name || message.to == BROADCAST)
    }

    async fn deliver_if_new(&self, message: ChatMessage) -> Result<(), MeshError> {
        if self.store.has_message(&message.id).await? {
            return Ok(());
        }
        self.store.save_message(message.clone()).await?;
        let _ = self.events.messages.send(message);
        Ok(())
    }

    pub async fn handle_inbound(&self, from_id: &str, bytes: &[u8], now: u64) -> Result<Vec<Outbound>, MeshError> {
        let packet = match MeshPacket::decode(bytes) {
            Ok(p) => p,
            Err(e) => {
                debug!(from = from_id, error = %e, "dropping malformed frame");
                return Ok(Vec::new());
            }
        };
        self.dispatch(from_id, packet, now).await
    }

    async fn dispatch(&self, from_id: &str, packet: MeshPacket, now: u64) -> Result<Vec<Outbound>, MeshError> {
        match packet {
            MeshPacket::Message(message) => self.handle_message(from_id, message).await,
            MeshPacket::MessageEdit(payload) => {
                self.store.edit_message(&payload.id, &payload.body).await?;
                Ok(Vec::new())
            }
            MeshPacket::MessageDelete(payload) => {
                self.store.delete_message(&payload.id).await?;
                Ok(Vec::new())
            }
            MeshPacket::GroupInvite(group) => {
                self.groups.receive_invite(self.store.as_ref(), group).await?;
                Ok(Vec::new())
            }
            MeshPacket::GroupJoinAck(payload) => {
                self.groups.apply_join_ack(self.store.as_ref(), &payload.group_id, &payload.username).await?;
                Ok(Vec::new())
            }
            MeshPacket::ImageMetadata(payload) => {
                if let Some((meta, bytes)) = self.files.record_metadata(payload).await {
                    self.finalize_file_image(meta, bytes).await?;
                }
                Ok(Vec::new())
            }
            MeshPacket::ImageChunk(chunk) => self.handle_image_chunk(chunk).await,
            MeshPacket::CallOffer(payload) => {
                if payload.from != self.self_name {
                    let _ = self.events.call_signals.send(CallSignal::Offer {
                        source_endpoint: from_id.to_string(),
                        from: payload.from,
                        video: payload.video,
                        intent: payload.intent,
                    });
                }
                Ok(Vec::new())
            }
            MeshPacket::CallAnswer(payload) => {
                if payload.from != self.self_name {
                    let _ = self.events.call_signals.send(CallSignal::Answer {
                        source_endpoint: from_id.to_string(),
                        from: payload.from,
                        accepted: payload.accepted,
                    });
                }
                Ok(Vec::new())
            }
            MeshPacket::IceCandidate(payload) => {
                if payload.from != self.self_name {
                    let _ = self.events.call_signals.send(CallSignal::Ice {
                        source_endpoint: from_id.to_string(),
                        from: payload.from,
                        ready: payload.ready,
                        candidate: payload.candidate,
                    });
                }
                Ok(Vec::new())
            }
            MeshPacket::CallEnd(payload) => {
                if payload.from != self.self_name {
                    let _ = self
                        .events
                        .call_signals
                        .send(CallSignal::End { source_endpoint: from_id.to_string(), from: payload.from });
                }
                Ok(Vec::new())
            }
            MeshPacket::SyncRequest(request) => self.handle_sync_request(from_id, request).await,
            MeshPacket::SyncResponse(response) => self.handle_sync_response(response).await,
            MeshPacket::PeerInfo(payload) => {
                self.peers.apply_peer_info(from_id, &payload.device_model, &payload.name).await;
                Ok(Vec::new())
            }
            MeshPacket::Ping(PingPayload { ts }) => Ok(vec![Outbound::to(from_id, MeshPacket::Pong(PongPayload { ts }))]),
            MeshPacket::Pong(PongPayload { ts }) => {
                let rtt = now.saturating_sub(ts);
                self.peers.record_rtt(from_id, rtt).await;
                Ok(Vec::new())
            }
            MeshPacket::ClearMessages(payload) => {
                match payload.group_id.as_deref() {
                    Some(group_id) => self.store.clear_group_messages(group_id).await?,
                    None => self.store.clear_broadcast_messages().await?,
                }
                let _ = self.events.system.send(SystemEvent::MessagesCleared { group_id: payload.group_id });
                Ok(Vec::new())
            }
        }
    }

    async fn handle_message(&self, from_id: &str, message: ChatMessage) -> Result<Vec<Outbound>, MeshError> {
        if !self.seen.lock().await.insert(&message.id) {
            return Ok(Vec::new());
        }
        if self.is_for_me(&message).await? {
            self.store.save_message(message.clone()).await?;
            let _ = self.events.messages.send(message.clone());
        }
        if message.ttl == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![Outbound::relay(from_id, MeshPacket::Message(message.into_relay()))])
    }

    async fn handle_image_chunk(&self, chunk: ImageChunkPayload) -> Result<Vec<Outbound>, MeshError> {
        let message_id = chunk.message_id.clone();
        let Some((meta, body)) = self.chunks.insert(chunk).await else {
            return Ok(Vec::new());
        };
        if !self.seen.lock().await.insert(&message_id) {
            return Ok(Vec::new());
        }
        let message = ChatMessage::new(message_id, meta.from, meta.to, body, meta.timestamp, 0, meta.group_id, MessageType::Image);
        if self.is_for_me(&message).await? {
            self.deliver_if_new(message).await?;
        }
        Ok(Vec::new())
    }

    /// Finalize the file-payload path: copying `_image_bytes` into the
    /// images directory as `<message_id>.jpg` is the responsibility of the
    /// caller (store/assembly layer owns that directory); this synthesizes
    /// the `ChatMessage` pointing at that stable name, never at the inbound
    /// temp path/bytes (spec §4.5/§4.6 — the recorded body must survive
    /// whatever cleanup the transport does to its own temp storage).
    pub async fn finalize_file_image(&self, meta: gitchat_core::packet::ImageMetadataPayload, _image_bytes: Vec<u8>) -> Result<(), MeshError> {
        let path = format!("{}.jpg", meta.message_id);
        let message = ChatMessage::new(meta.message_id, meta.from, meta.to, path, meta.timestamp, 0, meta.group_id, MessageType::ImageFile);
        if self.is_for_me(&message).await? {
            self.deliver_if_new(message).await?;
        }
        Ok(())
    }

    async fn handle_sync_request(&self, from_id: &str, request: gitchat_core::packet::SyncRequestPayload) -> Result<Vec<Outbound>, MeshError> {
        let response = sync::build_sync_response(self.store.as_ref(), &request, self.sync_batch_cap).await?;
        let mut out = vec![Outbound::to(from_id, MeshPacket::SyncResponse(response))];
        if self.mark_synced(from_id).await {
            let reciprocal = sync::build_sync_request(self.store.as_ref()).await?;
            out.push(Outbound::to(from_id, MeshPacket::SyncRequest(reciprocal)));
        }
        Ok(out)
    }

    async fn handle_sync_response(&self, response: gitchat_core::packet::SyncResponsePayload) -> Result<Vec<Outbound>, MeshError> {
        for group in response.groups {
            let already_joined = self.store.get_group(&group.id).await?.is_some();
            if !already_joined {
                self.groups.receive_invite(self.store.as_ref(), group).await?;
            }
        }
        for message in response.messages {
            if self.store.has_message(&message.id).await? {
                continue;
            }
            if !self.seen.lock().await.insert(&message.id) {
                continue;
            }
            if self.is_for_me(&message).await? {
                self.store.save_message(message.clone()).await?;
                let _ = self.events.messages.send(message);
            }
        }
        Ok(Vec::new())
    }

    /// Build the outbound `SyncRequest` triggered once a connection result
    /// lands, guarded by the same `synced_peers` set as the responder side.
    pub async fn build_initial_sync_request(&self, endpoint_id: &str) -> Result<Option<gitchat_core::packet::SyncRequestPayload>, MeshError> {
        if !self.mark_synced(endpoint_id).await {
            return Ok(None);
        }
        Ok(Some(sync::build_sync_request(self.store.as_ref()).await?))
    }

    pub fn generate_message_id(&self) -> String {
        ids::generate_message_id()
    }

    pub fn estimated_distance_for(rtt_ms: u64) -> EstimatedDistance {
        EstimatedDistance::from_rtt_ms(rtt_ms)
    }
}
