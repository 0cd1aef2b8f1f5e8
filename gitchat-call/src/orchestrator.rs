//! The Call Orchestrator (spec §4.7): owns the call state machine and
//! drives all three handover phases. Phase 1 rides the mesh's existing
//! gossip transport via [`CallSignal`]; Phase 2 and 3 run once the mesh has
//! been stopped and the direct link taken over, exactly the way
//! [`crate::link`]/[`crate::relay`]/[`crate::signal`] were built to support.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gitchat_core::packet::{CallAnswerPayload, CallEndPayload, CallOfferPayload, IceCandidatePayload};
use gitchat_core::MeshPacket;
use gitchat_mesh::{CallSignal, MeshConfig, MeshEngine};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::CallError;
use crate::link::DirectLinkProvider;
use crate::media::MediaEngine;
use crate::relay::UdpRelay;
use crate::signal::{DirectSignal, SignalReader, SignalWriter};
use crate::state::{CallEvent, CallRole, CallState};

struct PendingOffer {
    source_endpoint: String,
    from: String,
    video: bool,
}

struct Inner {
    state: CallState,
    role: Option<CallRole>,
    peer_endpoint: Option<String>,
    pending_offer: Option<PendingOffer>,
    video: bool,
    muted: bool,
    camera_off: bool,
    speaker_on: bool,
    relay: Option<Arc<UdpRelay>>,
    phase2_task: Option<JoinHandle<()>>,
    signal_loop: Option<JoinHandle<()>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: CallState::Idle,
            role: None,
            peer_endpoint: None,
            pending_offer: None,
            video: false,
            muted: false,
            camera_off: false,
            speaker_on: false,
            relay: None,
            phase2_task: None,
            signal_loop: None,
        }
    }
}

/// Supervises one call at a time against a single [`MeshEngine`]. A
/// second call attempt while one is already under way is rejected with
/// [`CallError::AlreadyInCall`] (spec §6 `start_call` pre-checks).
pub struct CallOrchestrator {
    mesh: Arc<MeshEngine>,
    link: Arc<dyn DirectLinkProvider>,
    media: Arc<dyn MediaEngine>,
    config: MeshConfig,
    inner: Mutex<Inner>,
    phase2_started: AtomicBool,
    events_tx: broadcast::Sender<CallEvent>,
}

const EVENT_CHANNEL_CAPACITY: usize = 64;

impl CallOrchestrator {
    pub fn new(mesh: Arc<MeshEngine>, link: Arc<dyn DirectLinkProvider>, media: Arc<dyn MediaEngine>, config: MeshConfig) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self { mesh, link, media, config, inner: Mutex::new(Inner::default()), phase2_started: AtomicBool::new(false), events_tx })
    }

    /// Subscribes to the [`MeshEngine`]'s call-signal stream and starts
    /// dispatching Phase-1 signaling. Call once after the mesh itself has
    /// started.
    pub async fn start(self: &Arc<Self>) {
        let mut signals = self.mesh.router().events.call_signals.subscribe();
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(signal) => orchestrator.handle_signal(signal).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.inner.lock().await.signal_loop = Some(handle);
    }

    pub fn events(&self) -> broadcast::Receiver<CallEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.events_tx.send(event);
    }

    async fn set_state(&self, state: CallState) {
        self.inner.lock().await.state = state;
        self.emit(CallEvent::StateChanged(state));
    }

    pub async fn state(&self) -> CallState {
        self.inner.lock().await.state
    }

    // ---- Call API (spec §6) -------------------------------------------

    /// Pre-checks `connected_peers != ∅` (permission checks live upstream,
    /// at the UI layer that owns the camera/mic prompt) and broadcasts the
    /// offer; any connected peer's user may accept it.
    pub async fn start_call(self: &Arc<Self>, video: bool) -> Result<(), CallError> {
        if self.mesh.peers().connected_ids().await.is_empty() {
            return Err(CallError::NoPeers);
        }
        {
            let mut inner = self.inner.lock().await;
            if inner.state != CallState::Idle {
                return Err(CallError::AlreadyInCall);
            }
            inner.role = Some(CallRole::Caller);
            inner.video = video;
        }
        self.phase2_started.store(false, Ordering::SeqCst);
        self.mesh.broadcast_packet(MeshPacket::CallOffer(CallOfferPayload { from: self.mesh.self_name().to_string(), video, intent: true })).await;
        self.set_state(CallState::Offering).await;
        Ok(())
    }

    pub async fn answer_call(self: &Arc<Self>) -> Result<(), CallError> {
        let (source_endpoint, video) = {
            let inner = self.inner.lock().await;
            let offer = inner.pending_offer.as_ref().ok_or(CallError::NotInCall)?;
            (offer.source_endpoint.clone(), offer.video)
        };
        {
            let mut inner = self.inner.lock().await;
            inner.peer_endpoint = Some(source_endpoint.clone());
            inner.video = video;
        }
        self.mesh.send_to_peer(&source_endpoint, MeshPacket::CallAnswer(CallAnswerPayload { from: self.mesh.self_name().to_string(), accepted: true })).await;
        self.set_state(CallState::Connecting).await;
        self.spawn_callee_phase2(source_endpoint).await;
        Ok(())
    }

    pub async fn reject_call(self: &Arc<Self>) -> Result<(), CallError> {
        let source_endpoint = {
            let mut inner = self.inner.lock().await;
            let offer = inner.pending_offer.take().ok_or(CallError::NotInCall)?;
            offer.source_endpoint
        };
        self.mesh.send_to_peer(&source_endpoint, MeshPacket::CallAnswer(CallAnswerPayload { from: self.mesh.self_name().to_string(), accepted: false })).await;
        self.reset_to_idle().await;
        Ok(())
    }

    /// Idempotent against `Idle` (spec §4.7 "safe against Idle").
    pub async fn end_call(self: &Arc<Self>) {
        let (peer_endpoint, was_idle) = {
            let inner = self.inner.lock().await;
            (inner.peer_endpoint.clone(), inner.state == CallState::Idle)
        };
        if was_idle {
            return;
        }
        if let Some(endpoint) = peer_endpoint {
            self.mesh.send_to_peer(&endpoint, MeshPacket::CallEnd(CallEndPayload { from: self.mesh.self_name().to_string() })).await;
        }
        self.teardown_and_restart_mesh().await;
    }

    pub async fn toggle_mute(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.muted = !inner.muted;
        self.media.set_muted(inner.muted).await;
        inner.muted
    }

    pub async fn toggle_camera(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.camera_off = !inner.camera_off;
        self.media.set_camera_enabled(!inner.camera_off).await;
        inner.camera_off
    }

    pub async fn toggle_speaker(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.speaker_on = !inner.speaker_on;
        self.media.set_speaker_enabled(inner.speaker_on).await;
        inner.speaker_on
    }

    pub async fn switch_camera(&self) {
        self.media.switch_camera().await;
    }

    // ---- Phase 1: mesh-carried signaling -------------------------------

    async fn handle_signal(self: &Arc<Self>, signal: CallSignal) {
        match signal {
            CallSignal::Offer { source_endpoint, from, video, .. } => {
                let mut inner = self.inner.lock().await;
                if inner.state != CallState::Idle {
                    debug!(%from, "dropping incoming offer, already in a call");
                    return;
                }
                inner.role = Some(CallRole::Callee);
                inner.pending_offer = Some(PendingOffer { source_endpoint, from: from.clone(), video });
                drop(inner);
                self.set_state(CallState::Ringing).await;
                self.emit(CallEvent::IncomingOffer { from, video });
            }
            CallSignal::Answer { source_endpoint, accepted, .. } => {
                if !accepted {
                    self.emit(CallEvent::Error("call declined".to_string()));
                    self.reset_to_idle().await;
                    return;
                }
                {
                    let mut inner = self.inner.lock().await;
                    inner.peer_endpoint = Some(source_endpoint.clone());
                }
                self.set_state(CallState::Connecting).await;
                self.send_ready_signals(source_endpoint.clone()).await;
                self.spawn_caller_phase2(source_endpoint).await;
            }
            CallSignal::Ice { source_endpoint, ready: Some(true), .. } => {
                self.spawn_callee_phase2(source_endpoint).await;
            }
            CallSignal::Ice { .. } => {}
            CallSignal::End { .. } => {
                self.teardown_and_restart_mesh().await;
            }
        }
    }

    async fn send_ready_signals(&self, peer_endpoint: String) {
        for _ in 0..3 {
            self.mesh
                .send_to_peer(&peer_endpoint, MeshPacket::IceCandidate(IceCandidatePayload { from: self.mesh.self_name().to_string(), ready: Some(true), candidate: None }))
                .await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    // ---- Phase 2/3 --------------------------------------------------

    async fn spawn_caller_phase2(self: &Arc<Self>, peer_endpoint: String) {
        if self.phase2_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move { orchestrator.run_caller_phase2(peer_endpoint).await });
        self.inner.lock().await.phase2_task = Some(handle);
    }

    async fn spawn_callee_phase2(self: &Arc<Self>, peer_endpoint: String) {
        if self.phase2_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move { orchestrator.run_callee_phase2(peer_endpoint).await });
        self.inner.lock().await.phase2_task = Some(handle);
    }

    async fn run_caller_phase2(self: Arc<Self>, _peer_endpoint: String) {
        tokio::time::sleep(Duration::from_millis(self.config.phase2_caller_grace_ms)).await;
        let _ = self.mesh.stop().await;
        self.link.teardown().await;

        let owner_addr: IpAddr = self.config.group_owner_addr.parse().unwrap_or(IpAddr::from([192, 168, 49, 1]));
        let owner_ip = match self.link.become_owner(owner_addr).await {
            Ok(ip) => ip,
            Err(e) => {
                warn!(error = %e, "failed to become Wi-Fi Direct group owner");
                self.teardown_and_restart_mesh().await;
                return;
            }
        };

        let listener = match TcpListener::bind((owner_ip, self.config.call_tcp_port)).await {
            Ok(l) => l,
            Err(_) => match TcpListener::bind(("0.0.0.0", self.config.call_tcp_port)).await {
                Ok(l) => l,
                Err(e) => {
                    warn!(error = %e, "failed to bind call tcp listener");
                    self.teardown_and_restart_mesh().await;
                    return;
                }
            },
        };

        let accept = timeout(Duration::from_millis(self.config.phase2_tcp_accept_timeout_ms), listener.accept()).await;
        let stream = match accept {
            Ok(Ok((stream, _))) => stream,
            _ => {
                warn!("phase-2 tcp accept timed out");
                self.emit(CallEvent::Error("call setup timed out".to_string()));
                self.teardown_and_restart_mesh().await;
                return;
            }
        };

        self.run_caller_tcp_session(stream, owner_ip).await;
    }

    async fn run_caller_tcp_session(self: Arc<Self>, stream: TcpStream, local_ip: IpAddr) {
        let (read_half, write_half) = stream.into_split();
        let mut writer = SignalWriter::new(write_half);
        let mut reader = SignalReader::new(read_half);

        if writer.send(&DirectSignal::P2pInfo { ip: local_ip.to_string() }).await.is_err() {
            self.teardown_and_restart_mesh().await;
            return;
        }

        loop {
            let signal = match reader.recv().await {
                Ok(Some(s)) => s,
                Ok(None) | Err(_) => break,
            };
            match signal {
                DirectSignal::P2pInfo { ip } => {
                    let Ok(peer_ip) = ip.parse::<IpAddr>() else { continue };
                    let peer_addr = std::net::SocketAddr::new(peer_ip, self.config.call_udp_port);
                    match UdpRelay::bind(self.config.call_udp_port, peer_addr).await {
                        Ok(relay) => {
                            relay.start(self.config.relay_buffer_capacity).await;
                            let relay = Arc::new(relay);
                            self.inner.lock().await.relay = Some(Arc::clone(&relay));
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to bind call udp relay");
                            continue;
                        }
                    }
                    let video = self.inner.lock().await.video;
                    match self.media.create_offer(video).await {
                        Ok(sdp) => {
                            let stripped = crate::signal::strip_candidate_lines(&sdp);
                            if writer.send(&DirectSignal::Offer { sdp: stripped, video }).await.is_err() {
                                break;
                            }
                            let candidate = DirectSignal::synthetic_candidate(self.config.call_udp_port);
                            let _ = writer.send(&candidate).await;
                            if let DirectSignal::IceCandidate { candidate, .. } = &candidate {
                                let _ = self.media.add_ice_candidate(candidate).await;
                            }
                        }
                        Err(e) => warn!(error = %e, "media engine failed to create offer"),
                    }
                }
                DirectSignal::Answer { sdp } => {
                    if self.media.set_remote_description(&sdp).await.is_ok() {
                        self.set_state(CallState::Connected).await;
                    }
                }
                DirectSignal::IceCandidate { candidate, .. } => {
                    let _ = self.media.add_ice_candidate(&candidate).await;
                }
                DirectSignal::CallEnd => break,
                DirectSignal::Offer { .. } => {}
            }
        }
        self.teardown_and_restart_mesh().await;
    }

    async fn run_callee_phase2(self: Arc<Self>, _peer_endpoint: String) {
        tokio::time::sleep(Duration::from_millis(self.config.phase2_callee_grace_ms)).await;
        let _ = self.mesh.stop().await;
        self.link.teardown().await;

        let owner_addr: IpAddr = self.config.group_owner_addr.parse().unwrap_or(IpAddr::from([192, 168, 49, 1]));
        let group_formation_timeout = Duration::from_millis(self.config.phase2_group_formation_timeout_ms);
        let iface_poll = Duration::from_millis(self.config.phase2_iface_poll_ms);
        let iface_timeout = Duration::from_millis(self.config.phase2_iface_timeout_ms);

        let local_ip = match self.link.connect_to_owner(owner_addr, group_formation_timeout, iface_poll, iface_timeout).await {
            Ok(ip) => ip,
            Err(e) => {
                warn!(error = %e, "failed to join Wi-Fi Direct group");
                self.emit(CallEvent::Error("call setup failed".to_string()));
                self.teardown_and_restart_mesh().await;
                return;
            }
        };

        // Source-interface binding is the `DirectLinkProvider`'s job (it
        // hands back the address already acquired on the direct-link
        // interface); a plain connect lets the OS route via that interface.
        let mut stream = None;
        for attempt in 1..=self.config.phase2_tcp_connect_attempts {
            match TcpStream::connect((owner_addr, self.config.call_tcp_port)).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "call tcp connect attempt failed");
                    tokio::time::sleep(Duration::from_millis(self.config.phase2_tcp_connect_gap_ms)).await;
                }
            }
        }
        let Some(stream) = stream else {
            warn!("exhausted call tcp connect attempts");
            self.emit(CallEvent::Error("call setup timed out".to_string()));
            self.teardown_and_restart_mesh().await;
            return;
        };

        // Remote address is already known (the group owner), so the relay
        // can start the moment TCP connects (spec §4.7 "exchange order").
        let peer_addr = std::net::SocketAddr::new(owner_addr, self.config.call_udp_port);
        match UdpRelay::bind(self.config.call_udp_port, peer_addr).await {
            Ok(relay) => {
                relay.start(self.config.relay_buffer_capacity).await;
                self.inner.lock().await.relay = Some(Arc::new(relay));
            }
            Err(e) => warn!(error = %e, "failed to bind call udp relay"),
        }

        self.run_callee_tcp_session(stream, local_ip).await;
    }

    async fn run_callee_tcp_session(self: Arc<Self>, stream: TcpStream, local_ip: IpAddr) {
        let (read_half, write_half) = stream.into_split();
        let mut writer = SignalWriter::new(write_half);
        let mut reader = SignalReader::new(read_half);

        if writer.send(&DirectSignal::P2pInfo { ip: local_ip.to_string() }).await.is_err() {
            self.teardown_and_restart_mesh().await;
            return;
        }

        loop {
            let signal = match reader.recv().await {
                Ok(Some(s)) => s,
                Ok(None) | Err(_) => break,
            };
            match signal {
                DirectSignal::P2pInfo { ip } => debug!(%ip, "caller confirmed its p2p address"),
                DirectSignal::Offer { sdp, video } => match self.media.create_answer(&sdp, video).await {
                    Ok(answer_sdp) => {
                        let stripped = crate::signal::strip_candidate_lines(&answer_sdp);
                        if writer.send(&DirectSignal::Answer { sdp: stripped }).await.is_err() {
                            break;
                        }
                        let candidate = DirectSignal::synthetic_candidate(self.config.call_udp_port);
                        let _ = writer.send(&candidate).await;
                        if let DirectSignal::IceCandidate { candidate, .. } = &candidate {
                            let _ = self.media.add_ice_candidate(candidate).await;
                        }
                        self.set_state(CallState::Connected).await;
                    }
                    Err(e) => warn!(error = %e, "media engine failed to create answer"),
                },
                DirectSignal::IceCandidate { candidate, .. } => {
                    let _ = self.media.add_ice_candidate(&candidate).await;
                }
                DirectSignal::CallEnd => break,
                DirectSignal::Answer { .. } => {}
            }
        }
        self.teardown_and_restart_mesh().await;
    }

    // ---- Teardown -----------------------------------------------------

    async fn reset_to_idle(&self) {
        self.phase2_started.store(false, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        *inner = Inner { signal_loop: inner.signal_loop.take(), ..Inner::default() };
        drop(inner);
        self.set_state(CallState::Idle).await;
    }

    async fn teardown_and_restart_mesh(&self) {
        self.set_state(CallState::Ended).await;
        let relay = self.inner.lock().await.relay.take();
        if let Some(relay) = relay {
            relay.stop().await;
        }
        if let Some(handle) = self.inner.lock().await.phase2_task.take() {
            handle.abort();
        }
        self.media.close().await;
        self.link.teardown().await;
        info!("call ended, settling before mesh restart");
        tokio::time::sleep(Duration::from_millis(self.config.call_teardown_settle_ms)).await;
        if let Err(e) = self.mesh.start().await {
            warn!(error = %e, "failed to restart mesh after call teardown");
        }
        self.reset_to_idle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LoopbackDirectLink;
    use crate::media::NullMediaEngine;
    use gitchat_mesh::InMemoryStore;
    use gitchat_transport::{ClusteredHub, ClusteredRadio, Transport};

    async fn orchestrator_with_no_peers() -> Arc<CallOrchestrator> {
        let hub = ClusteredHub::new();
        let radio = ClusteredRadio::new(Arc::clone(&hub), "solo", "solo").await;
        let transport: Arc<Mutex<dyn Transport>> = Arc::new(Mutex::new(radio));
        let store = Arc::new(InMemoryStore::new());
        let mesh = MeshEngine::new("solo", "TestDevice", MeshConfig::default(), transport, store);
        mesh.start().await.unwrap();
        CallOrchestrator::new(mesh, Arc::new(LoopbackDirectLink), Arc::new(NullMediaEngine), MeshConfig::default())
    }

    #[tokio::test]
    async fn start_call_fails_fast_with_no_connected_peers() {
        let orchestrator = orchestrator_with_no_peers().await;
        let err = orchestrator.start_call(false).await.unwrap_err();
        assert!(matches!(err, CallError::NoPeers));
        assert_eq!(orchestrator.state().await, CallState::Idle);
    }

    #[tokio::test]
    async fn end_call_is_a_no_op_while_idle() {
        let orchestrator = orchestrator_with_no_peers().await;
        orchestrator.end_call().await;
        assert_eq!(orchestrator.state().await, CallState::Idle);
    }

    #[tokio::test]
    async fn answer_call_without_a_pending_offer_is_rejected() {
        let orchestrator = orchestrator_with_no_peers().await;
        let err = orchestrator.answer_call().await.unwrap_err();
        assert!(matches!(err, CallError::NotInCall));
    }

    #[tokio::test]
    async fn toggling_mute_camera_and_speaker_flips_local_state() {
        let orchestrator = orchestrator_with_no_peers().await;
        assert!(orchestrator.toggle_mute().await);
        assert!(!orchestrator.toggle_mute().await);
        assert!(orchestrator.toggle_camera().await);
        assert!(orchestrator.toggle_speaker().await);
    }
}
