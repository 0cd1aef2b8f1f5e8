//! `MeshEngine`: the single supervisor struct the whole mesh core hangs off
//! (spec §9 "model each subsystem as an owned component in a single
//! supervisor struct"). Owns the peer table, dedup/router, group manager,
//! store handle, and the connection supervisor; drives the transport event
//! loop and the ping timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use gitchat_core::packet::{ImageChunkMeta, ImageChunkPayload, MeshPacket, PeerInfoPayload, PingPayload};
use gitchat_core::{ids, ChatMessage, MeshGroup, MeshPeer, MessageType};
use gitchat_transport::tower::{is_tower_eligible_frame, TOWER_ENDPOINT_ID};
use gitchat_transport::{TransferStatus, Transport, TransportEvent};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MeshConfig;
use crate::error::MeshError;
use crate::group_manager::{GroupManager, JoinOutcome};
use crate::peer_table::PeerTable;
use crate::router::{GossipRouter, Outbound, OutboundTarget};
use crate::store::Store;
use crate::supervisor::ConnectionSupervisor;

pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub self_name: String,
    pub is_mesh_active: bool,
    pub connected_peers: Vec<MeshPeer>,
    pub pending_group_invites: Vec<MeshGroup>,
}

pub struct MeshEngine {
    self_name: String,
    device_model: String,
    config: MeshConfig,
    transport: Arc<Mutex<dyn Transport>>,
    tower: Mutex<Option<Arc<Mutex<dyn Transport>>>>,
    tower_connected: AtomicBool,
    peers: Arc<PeerTable>,
    groups: Arc<GroupManager>,
    store: Arc<dyn Store>,
    pub router: Arc<GossipRouter>,
    supervisor: Arc<ConnectionSupervisor>,
    active: AtomicBool,
    ping_timer: Mutex<Option<JoinHandle<()>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    tower_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MeshEngine {
    pub fn new(
        self_name: impl Into<String>,
        device_model: impl Into<String>,
        config: MeshConfig,
        transport: Arc<Mutex<dyn Transport>>,
        store: Arc<dyn Store>,
    ) -> Arc<Self> {
        let self_name = self_name.into();
        let peers = Arc::new(PeerTable::new());
        let groups = Arc::new(GroupManager::new());
        let router = Arc::new(GossipRouter::new(self_name.clone(), config.dedup_capacity, config.sync_batch_cap, Arc::clone(&peers), Arc::clone(&groups), Arc::clone(&store)));
        Arc::new(Self {
            self_name,
            device_model: device_model.into(),
            config,
            transport,
            tower: Mutex::new(None),
            tower_connected: AtomicBool::new(false),
            peers,
            groups,
            store,
            router,
            supervisor: Arc::new(ConnectionSupervisor::new()),
            active: AtomicBool::new(false),
            ping_timer: Mutex::new(None),
            event_loop: Mutex::new(None),
            tower_loop: Mutex::new(None),
        })
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    pub async fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether the optional BLE relay tower (spec §4.8) is currently
    /// subscribed, if one has been attached at all via [`Self::attach_tower`].
    pub async fn is_tower_connected(&self) -> bool {
        self.tower_connected.load(Ordering::SeqCst)
    }

    /// `startMesh`: begin advertising/discovering and start consuming
    /// transport events.
    pub async fn start(self: &Arc<Self>) -> Result<(), MeshError> {
        {
            let mut t = self.transport.lock().await;
            t.start_advertise(&self.self_name).await?;
            t.start_discover().await?;
        }
        self.active.store(true, Ordering::SeqCst);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run_event_loop().await });
        *self.event_loop.lock().await = Some(handle);
        Ok(())
    }

    /// `stopMesh` (spec §5): cancels the ping timer, stops transport
    /// operations, clears the peer table, sync-set, and retry counters.
    pub async fn stop(&self) -> Result<(), MeshError> {
        self.active.store(false, Ordering::SeqCst);
        self.supervisor.cancel_all().await;
        self.stop_ping_timer().await;
        self.transport.lock().await.stop_all().await?;
        self.peers.clear().await;
        self.router.clear_synced().await;
        if let Some(handle) = self.event_loop.lock().await.take() {
            handle.abort();
        }
        if let Some(tower) = self.tower.lock().await.as_ref() {
            let _ = tower.lock().await.stop_all().await;
        }
        self.tower_connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self.tower_loop.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }

    /// Wire up the optional BLE relay tower (spec §4.8). Runs its own
    /// discover/connect/reconnect loop on a second [`Transport`] and feeds
    /// its `MSG` notifications into the same [`GossipRouter`] as any other
    /// inbound bytes; does not register the tower in the [`PeerTable`], so
    /// it never receives the pings/sync/peer-info traffic ordinary peers do
    /// — only the write-through frames named below.
    pub async fn attach_tower(self: &Arc<Self>, tower: Arc<Mutex<dyn Transport>>) {
        *self.tower.lock().await = Some(Arc::clone(&tower));
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run_tower_loop(tower).await });
        *self.tower_loop.lock().await = Some(handle);
    }

    async fn run_tower_loop(self: Arc<Self>, tower: Arc<Mutex<dyn Transport>>) {
        loop {
            if let Err(e) = tower.lock().await.start_discover().await {
                warn!(error = %e, "tower discovery failed");
            }
            let found = loop {
                match tower.lock().await.next_event().await {
                    Some(TransportEvent::EndpointFound { endpoint_id, .. }) => break Some(endpoint_id),
                    Some(_) => continue,
                    None => break None,
                }
            };
            let Some(endpoint_id) = found else { break };
            if tower.lock().await.request_connection(&endpoint_id, &self.self_name).await.is_err() {
                tokio::time::sleep(std::time::Duration::from_millis(self.config.tower_reconnect_delay_ms)).await;
                continue;
            }
            loop {
                match tower.lock().await.next_event().await {
                    Some(TransportEvent::ConnectionResult { accepted: true, .. }) => {
                        self.tower_connected.store(true, Ordering::SeqCst);
                        info!("tower connected");
                    }
                    Some(TransportEvent::BytesReceived { endpoint_id, bytes }) => {
                        match self.router.handle_inbound(&endpoint_id, &bytes, now_ms()).await {
                            Ok(outbound) => {
                                for o in outbound {
                                    self.send_outbound(o).await;
                                }
                            }
                            Err(e) => warn!(error = %e, "error handling tower frame"),
                        }
                    }
                    Some(TransportEvent::Disconnected { .. }) | None => {
                        self.tower_connected.store(false, Ordering::SeqCst);
                        break;
                    }
                    Some(_) => {}
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(self.config.tower_reconnect_delay_ms)).await;
        }
    }

    /// Write-through to the tower for `Message`/`GroupInvite`/`GroupJoinAck`
    /// (spec §4.8): only when the tower is connected and the encoded frame
    /// fits its 512-byte `MSG` characteristic. Not itself subject to dedup
    /// on the outbound side (spec §9 open question 4) — the tower hub
    /// handles echo-absorption by relying on receivers' own dedup.
    async fn write_through_tower(&self, packet: &MeshPacket) {
        if !self.tower_connected.load(Ordering::SeqCst) {
            return;
        }
        if !matches!(packet, MeshPacket::Message(_) | MeshPacket::GroupInvite(_) | MeshPacket::GroupJoinAck(_)) {
            return;
        }
        let Some(tower) = self.tower.lock().await.clone() else { return };
        let Ok(bytes) = packet.encode() else { return };
        if !is_tower_eligible_frame(&bytes) {
            debug!(len = bytes.len(), "frame too large for tower MSG characteristic, skipping write-through");
            return;
        }
        if let Err(e) = tower.lock().await.send_bytes(TOWER_ENDPOINT_ID, bytes).await {
            warn!(error = %e, "tower write-through failed");
        }
    }

    async fn run_event_loop(self: Arc<Self>) {
        loop {
            let event = { self.transport.lock().await.next_event().await };
            let Some(event) = event else { break };
            if let Err(e) = self.handle_transport_event(event).await {
                warn!(error = %e, "error handling transport event");
            }
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) -> Result<(), MeshError> {
        match event {
            TransportEvent::EndpointFound { endpoint_id, endpoint_name } => {
                self.peers.upsert_seen(&endpoint_id, &endpoint_name, now_ms()).await;
                if !self.peers.is_connected(&endpoint_id).await {
                    self.supervisor
                        .spawn_attempt_loop(
                            Arc::clone(&self.transport),
                            Arc::clone(&self.peers),
                            self.config.clone(),
                            endpoint_id,
                            endpoint_name,
                            self.self_name.clone(),
                        )
                        .await;
                }
            }
            TransportEvent::EndpointLost { endpoint_id } => {
                info!(endpoint_id, "endpoint lost during discovery");
            }
            TransportEvent::ConnectionInitiated { endpoint_id, endpoint_name } => {
                self.peers.upsert_seen(&endpoint_id, &endpoint_name, now_ms()).await;
                self.supervisor.cancel(&endpoint_id).await;
                self.transport.lock().await.accept_connection(&endpoint_id).await?;
                // Accepting is immediate and has no separate "we're connected"
                // callback on this side (only the initiator gets
                // ConnectionResult) — run the same side effects here.
                self.on_connected(&endpoint_id).await?;
            }
            TransportEvent::ConnectionResult { endpoint_id, accepted } => {
                self.supervisor.cancel(&endpoint_id).await;
                if accepted {
                    self.on_connected(&endpoint_id).await?;
                }
            }
            TransportEvent::Disconnected { endpoint_id } => {
                self.supervisor.cancel(&endpoint_id).await;
                self.peers.remove(&endpoint_id).await;
                self.router.forget_synced(&endpoint_id).await;
                if !self.peers.any_connected().await {
                    self.stop_ping_timer().await;
                }
            }
            TransportEvent::BytesReceived { endpoint_id, bytes } => {
                let outbound = self.router.handle_inbound(&endpoint_id, &bytes, now_ms()).await?;
                for o in outbound {
                    self.send_outbound(o).await;
                }
            }
            TransportEvent::FileProgress { payload_id, bytes_transferred, total_bytes, status, .. } => {
                self.router.files.record_progress(payload_id, bytes_transferred, total_bytes).await;
                // Clear on SUCCESS and FAILURE (spec §4.6); on FAILURE this
                // also drops whatever pending file bytes/metadata were
                // waiting to be paired.
                if matches!(status, TransferStatus::Success | TransferStatus::Failure) {
                    self.router.files.clear(payload_id).await;
                }
            }
            TransportEvent::FileReceived { payload_id, bytes, .. } => {
                if let Some((meta, image_bytes)) = self.router.files.record_bytes(payload_id, bytes).await {
                    self.router.finalize_file_image(meta, image_bytes).await?;
                }
                self.router.files.clear(payload_id).await;
            }
        }
        Ok(())
    }

    async fn on_connected(&self, endpoint_id: &str) -> Result<(), MeshError> {
        self.peers.mark_connected(endpoint_id, now_ms()).await;
        self.start_ping_timer_if_needed().await;
        let peer_info = MeshPacket::PeerInfo(PeerInfoPayload { device_model: self.device_model.clone(), name: self.self_name.clone() });
        self.send_to(endpoint_id, peer_info).await;
        if let Some(request) = self.router.build_initial_sync_request(endpoint_id).await? {
            self.send_to(endpoint_id, MeshPacket::SyncRequest(request)).await;
        }
        Ok(())
    }

    async fn start_ping_timer_if_needed(&self) {
        let mut guard = self.ping_timer.lock().await;
        if guard.is_some() {
            return;
        }
        let transport = Arc::clone(&self.transport);
        let peers = Arc::clone(&self.peers);
        let interval = self.config.ping_interval_ms;
        *guard = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_millis(interval));
            loop {
                tick.tick().await;
                let ids = peers.connected_ids().await;
                if ids.is_empty() {
                    break;
                }
                let ping = MeshPacket::Ping(PingPayload { ts: now_ms() });
                let Ok(bytes) = ping.encode() else { continue };
                for id in ids {
                    let _ = transport.lock().await.send_bytes(&id, bytes.clone()).await;
                }
            }
        }));
    }

    async fn stop_ping_timer(&self) {
        if let Some(handle) = self.ping_timer.lock().await.take() {
            handle.abort();
        }
    }

    async fn send_to(&self, endpoint_id: &str, packet: MeshPacket) {
        match packet.encode() {
            Ok(bytes) => {
                if let Err(e) = self.transport.lock().await.send_bytes(endpoint_id, bytes).await {
                    warn!(endpoint_id, error = %e, "send failed");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode outbound packet"),
        }
    }

    async fn send_outbound(&self, outbound: Outbound) {
        match &outbound.target {
            OutboundTarget::Peer(id) => self.send_to(id, outbound.packet.clone()).await,
            OutboundTarget::AllExcept(except) => {
                for id in self.peers.connected_ids().await {
                    if &id != except {
                        self.send_to(&id, outbound.packet.clone()).await;
                    }
                }
            }
            OutboundTarget::All => {
                for id in self.peers.connected_ids().await {
                    self.send_to(&id, outbound.packet.clone()).await;
                }
            }
        }
        self.write_through_tower(&outbound.packet).await;
    }

    /// Send a packet to one connected peer. Exposed so the call orchestrator
    /// can address `CallAnswer`/`IceCandidate`/`CallEnd` back to the endpoint
    /// a signal arrived from, without reaching into transport internals.
    pub async fn send_to_peer(&self, endpoint_id: &str, packet: MeshPacket) {
        self.send_to(endpoint_id, packet).await;
    }

    /// Send a packet to every connected peer (`CallOffer` has no addressee;
    /// any connected peer's user may accept it).
    pub async fn broadcast_packet(&self, packet: MeshPacket) {
        self.send_outbound(Outbound { target: OutboundTarget::All, packet }).await;
    }

    /// `sendMessage`: author a new text/link message, deliver it to ourself
    /// immediately, register it against self-echo, and fan it out.
    pub async fn send_text_message(&self, to: &str, body: &str, group_id: Option<String>, message_type: MessageType) -> Result<ChatMessage, MeshError> {
        let message = ChatMessage::new(ids::generate_message_id(), self.self_name.clone(), to, body, now_ms(), self.config.default_ttl, group_id, message_type);
        self.router.mark_sent(&message.id).await;
        self.store.save_message(message.clone()).await?;
        let _ = self.router.events.messages.send(message.clone());
        self.send_outbound(Outbound { target: OutboundTarget::All, packet: MeshPacket::Message(message.clone()) }).await;
        Ok(message)
    }

    /// `sendImage` chunked path (spec §4.6). Saves and emits locally before
    /// the first chunk ships.
    pub async fn send_image_chunked(&self, to: &str, base64_body: &str, group_id: Option<String>) -> Result<ChatMessage, MeshError> {
        let message_id = ids::generate_message_id();
        let now = now_ms();
        let message = ChatMessage::new(message_id.clone(), self.self_name.clone(), to, base64_body, now, 0, group_id.clone(), MessageType::Image);
        self.router.mark_sent(&message_id).await;
        self.store.save_message(message.clone()).await?;
        let _ = self.router.events.messages.send(message.clone());

        let chunk_size = self.config.image_chunk_size;
        let chars: Vec<char> = base64_body.chars().collect();
        let total_chunks = chars.len().div_ceil(chunk_size).max(1) as u32;
        let peer_ids = self.peers.connected_ids().await;
        for (idx, piece) in chars.chunks(chunk_size).enumerate() {
            let data: String = piece.iter().collect();
            let meta = (idx == 0).then(|| ImageChunkMeta { from: self.self_name.clone(), to: to.to_string(), group_id: group_id.clone(), timestamp: now });
            let packet = MeshPacket::ImageChunk(ImageChunkPayload { message_id: message_id.clone(), chunk_index: idx as u32, total_chunks, data, meta });
            for peer in &peer_ids {
                self.send_to(peer, packet.clone()).await;
            }
        }
        Ok(message)
    }

    pub async fn create_group(&self, name: &str, password: Option<String>) -> Result<MeshGroup, MeshError> {
        let group = self.groups.create_group(name, &self.self_name, now_ms(), password);
        self.store.save_group(group.clone()).await?;
        self.send_outbound(Outbound { target: OutboundTarget::All, packet: MeshPacket::GroupInvite(group.clone()) }).await;
        Ok(group)
    }

    pub async fn join_group_with_credentials(&self, group_id: &str, password: Option<&str>) -> Result<JoinOutcome, MeshError> {
        let outcome = self.groups.join_with_credentials(self.store.as_ref(), group_id, &self.self_name, password).await?;
        if outcome == JoinOutcome::Success {
            let ack = MeshPacket::GroupJoinAck(gitchat_core::packet::GroupJoinAckPayload { group_id: group_id.to_string(), username: self.self_name.clone() });
            self.send_outbound(Outbound { target: OutboundTarget::All, packet: ack }).await;
        }
        Ok(outcome)
    }

    pub async fn rename_group(&self, group_id: &str, new_name: &str) -> Result<(), MeshError> {
        self.groups.rename_group(self.store.as_ref(), group_id, new_name).await
    }

    pub async fn leave_group(&self, group_id: &str) -> Result<(), MeshError> {
        self.groups.leave_group(self.store.as_ref(), group_id, &self.self_name).await
    }

    pub async fn clear_group_messages(&self, group_id: &str) -> Result<(), MeshError> {
        self.store.clear_group_messages(group_id).await?;
        let packet = MeshPacket::ClearMessages(gitchat_core::packet::ClearMessagesPayload { group_id: Some(group_id.to_string()) });
        self.send_outbound(Outbound { target: OutboundTarget::All, packet }).await;
        Ok(())
    }

    pub async fn clear_broadcast_messages(&self) -> Result<(), MeshError> {
        self.store.clear_broadcast_messages().await?;
        let packet = MeshPacket::ClearMessages(gitchat_core::packet::ClearMessagesPayload { group_id: None });
        self.send_outbound(Outbound { target: OutboundTarget::All, packet }).await;
        Ok(())
    }

    pub fn peers(&self) -> Arc<PeerTable> {
        Arc::clone(&self.peers)
    }

    pub fn groups(&self) -> Arc<GroupManager> {
        Arc::clone(&self.groups)
    }

    pub fn router(&self) -> Arc<GossipRouter> {
        Arc::clone(&self.router)
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            self_name: self.self_name.clone(),
            is_mesh_active: self.is_active().await,
            connected_peers: self.peers.list().await.into_iter().filter(|p| p.is_connected).collect(),
            pending_group_invites: self.groups.pending().await,
        }
    }
}
