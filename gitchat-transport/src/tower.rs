//! The optional BLE relay tower (spec §4.8): a fixed external device that
//! re-broadcasts short JSON frames to every subscribed phone, extending
//! mesh range beyond direct peer-to-peer radio distance.
//!
//! A tower is discovered like any other endpoint but is recognized by its
//! advertised name prefix and, on real hardware, its GATT service UUID.
//! [`TowerLink`] is a second [`Transport`] implementation — a BLE central
//! that dials the tower's fixed `MSG` characteristic — so the mesh engine
//! can treat tower notifications as ordinary inbound bytes through the same
//! `Gossip Router` (spec: "the orchestrator subscribes to MSG and treats
//! incoming notifications as ordinary inbound bytes"). The tower's own
//! idle-scroll/connected/error state machine is informational only; we
//! surface it as [`TowerState`] for a UI to display, nothing in the mesh
//! core branches on it beyond connected-or-not.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::TransportError;
use crate::event::TransportEvent;
use crate::transport::Transport;

/// Advertised name prefix a real endpoint must carry to be treated as a tower.
pub const TOWER_NAME_PREFIX: &str = "GITCHAT-TOWER";

/// GATT service UUID exposed by a physical relay tower.
pub const TOWER_SERVICE_UUID: &str = "19B10000-E8F2-537E-4F6C-D104768A1214";
/// Characteristic carrying forwarded [`MeshPacket`](gitchat_core::MeshPacket) frames.
pub const TOWER_MSG_CHARACTERISTIC_UUID: &str = "19B10001-E8F2-537E-4F6C-D104768A1214";
/// Characteristic carrying peer roster updates.
pub const TOWER_PEER_CHARACTERISTIC_UUID: &str = "19B10002-E8F2-537E-4F6C-D104768A1214";
/// Characteristic carrying tower control commands (reboot, identify, etc).
pub const TOWER_CMD_CHARACTERISTIC_UUID: &str = "19B10003-E8F2-537E-4F6C-D104768A1214";

/// `MSG` characteristic's wire limit (spec §4.1, §6, §7 `PayloadTooLarge`).
pub const TOWER_MSG_MAX_BYTES: usize = 512;

/// One-byte peer count carried on the `PEER` characteristic.
pub type TowerPeerCount = u8;

pub fn is_tower(endpoint_name: &str) -> bool {
    endpoint_name.starts_with(TOWER_NAME_PREFIX)
}

/// Whether a packet type is eligible for tower write-through at all (spec
/// §4.8: "Message, GroupInvite, GroupJoinAck").
pub fn is_tower_eligible_frame(encoded: &[u8]) -> bool {
    encoded.len() <= TOWER_MSG_MAX_BYTES
}

/// The tower's own state machine (spec §4.8), purely informational to the
/// mesh — nothing here changes routing decisions beyond connected-or-not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TowerState {
    IdleScroll,
    Connected,
    Error,
}

struct TowerNode {
    name: String,
    inbox: mpsc::UnboundedSender<TransportEvent>,
}

/// Shared rendezvous point standing in for the physical tower device: every
/// [`TowerLink`] sharing a hub can discover and exchange `MSG` frames
/// through it, and any write is echoed to every other subscriber (spec:
/// "re-broadcasts any MSG write it receives to every subscribed phone").
#[derive(Default)]
pub struct TowerHub {
    name: Mutex<String>,
    present: AtomicBool,
    peers: Mutex<HashMap<String, TowerNode>>,
}

impl TowerHub {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: Mutex::new(name.into()), present: AtomicBool::new(true), peers: Mutex::new(HashMap::new()) })
    }

    /// Simulates powering the tower off — existing subscribers keep their
    /// connection state until they next try to write or discover.
    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    async fn subscribe(&self, id: String, name: String, inbox: mpsc::UnboundedSender<TransportEvent>) {
        self.peers.lock().await.insert(id, TowerNode { name, inbox });
    }

    async fn unsubscribe(&self, id: &str) {
        self.peers.lock().await.remove(id);
    }

    /// Re-broadcast a `MSG` write to every subscribed phone, including the
    /// writer itself (spec §9 open question 4: the tower is not itself
    /// subject to dedup on the outbound side; callers rely on receivers'
    /// dedup to absorb the echo).
    async fn broadcast_msg(&self, bytes: Vec<u8>) {
        for node in self.peers.lock().await.values() {
            let _ = node.inbox.send(TransportEvent::BytesReceived { endpoint_id: TOWER_ENDPOINT_ID.to_string(), bytes: bytes.clone() });
        }
    }
}

/// Canonical pseudo-endpoint id this transport reports the tower under.
pub const TOWER_ENDPOINT_ID: &str = "tower";

/// BLE-central [`Transport`] that dials a [`TowerHub`]. `start_discover`
/// reports the tower (if present) as a single [`TransportEvent::EndpointFound`];
/// `send_bytes` is the `MSG` write, rejected above [`TOWER_MSG_MAX_BYTES`].
/// No file-payload path exists on this transport (spec §4.8 names no such
/// characteristic).
pub struct TowerLink {
    id: String,
    name: String,
    hub: Arc<TowerHub>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    connected: bool,
}

impl TowerLink {
    pub fn new(hub: Arc<TowerHub>, id: impl Into<String>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self { id: id.into(), name: String::new(), hub, events_tx, events_rx, connected: false }
    }

    pub fn state(&self) -> TowerState {
        if !self.hub.present.load(Ordering::SeqCst) {
            TowerState::Error
        } else if self.connected {
            TowerState::Connected
        } else {
            TowerState::IdleScroll
        }
    }
}

impl Drop for TowerLink {
    fn drop(&mut self) {
        let hub = Arc::clone(&self.hub);
        let id = self.id.clone();
        tokio::spawn(async move { hub.unsubscribe(&id).await });
    }
}

#[async_trait]
impl Transport for TowerLink {
    async fn start_advertise(&mut self, _local_name: &str) -> Result<(), TransportError> {
        // A BLE central never advertises; tolerate the call as a no-op so a
        // generic caller can treat every `Transport` impl identically.
        Ok(())
    }

    async fn start_discover(&mut self) -> Result<(), TransportError> {
        if self.hub.present.load(Ordering::SeqCst) {
            let name = self.hub.name.lock().await.clone();
            let _ = self.events_tx.send(TransportEvent::EndpointFound { endpoint_id: TOWER_ENDPOINT_ID.to_string(), endpoint_name: name });
        }
        Ok(())
    }

    async fn stop_all(&mut self) -> Result<(), TransportError> {
        self.hub.unsubscribe(&self.id).await;
        self.connected = false;
        Ok(())
    }

    async fn request_connection(&mut self, endpoint_id: &str, local_name: &str) -> Result<(), TransportError> {
        if endpoint_id != TOWER_ENDPOINT_ID {
            return Err(TransportError::NotConnected(endpoint_id.to_string()));
        }
        if !self.hub.present.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.name = local_name.to_string();
        self.hub.subscribe(self.id.clone(), local_name.to_string(), self.events_tx.clone()).await;
        let _ = self.events_tx.send(TransportEvent::ConnectionResult { endpoint_id: TOWER_ENDPOINT_ID.to_string(), accepted: true });
        Ok(())
    }

    async fn accept_connection(&mut self, _endpoint_id: &str) -> Result<(), TransportError> {
        // The tower never initiates; nothing to accept.
        Ok(())
    }

    async fn reject_connection(&mut self, _endpoint_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&mut self, endpoint_id: &str) -> Result<(), TransportError> {
        if endpoint_id == TOWER_ENDPOINT_ID {
            self.hub.unsubscribe(&self.id).await;
            self.connected = false;
        }
        Ok(())
    }

    async fn send_bytes(&mut self, endpoint_id: &str, bytes: Vec<u8>) -> Result<(), TransportError> {
        if endpoint_id != TOWER_ENDPOINT_ID || !self.connected {
            return Err(TransportError::NotConnected(endpoint_id.to_string()));
        }
        if bytes.len() > TOWER_MSG_MAX_BYTES {
            return Err(TransportError::SendFailed(format!("frame of {} bytes exceeds tower MTU of {TOWER_MSG_MAX_BYTES}", bytes.len())));
        }
        self.hub.broadcast_msg(bytes).await;
        Ok(())
    }

    async fn send_file(&mut self, _endpoint_id: &str, _payload_id: u64, _bytes: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::SendFailed("tower transport carries no file-payload characteristic".to_string()))
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events_rx.recv().await?;
        match &event {
            TransportEvent::ConnectionResult { accepted: true, .. } => {
                self.connected = true;
                debug!(id = %self.id, "subscribed to tower MSG characteristic");
            }
            TransportEvent::Disconnected { .. } => self.connected = false,
            _ => {}
        }
        Some(event)
    }

    fn is_connected(&self, endpoint_id: &str) -> bool {
        endpoint_id == TOWER_ENDPOINT_ID && self.connected
    }

    fn connected_endpoints(&self) -> Vec<String> {
        if self.connected {
            vec![TOWER_ENDPOINT_ID.to_string()]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_tower_by_name_prefix() {
        assert!(is_tower("GITCHAT-TOWER-01"));
        assert!(!is_tower("Alices-Pixel"));
    }

    #[test]
    fn rejects_oversized_frame() {
        assert!(!is_tower_eligible_frame(&vec![0u8; 513]));
        assert!(is_tower_eligible_frame(&vec![0u8; 512]));
    }

    #[tokio::test]
    async fn discover_connect_and_write_through_echoes_to_other_subscriber() {
        let hub = TowerHub::new("GITCHAT-TOWER-01");
        let mut phone_a = TowerLink::new(Arc::clone(&hub), "a");
        let mut phone_b = TowerLink::new(Arc::clone(&hub), "b");

        phone_a.start_discover().await.unwrap();
        let found = phone_a.next_event().await.unwrap();
        assert_eq!(found, TransportEvent::EndpointFound { endpoint_id: TOWER_ENDPOINT_ID.into(), endpoint_name: "GITCHAT-TOWER-01".into() });

        phone_a.request_connection(TOWER_ENDPOINT_ID, "Alice").await.unwrap();
        phone_a.next_event().await.unwrap();
        phone_b.request_connection(TOWER_ENDPOINT_ID, "Bob").await.unwrap();
        phone_b.next_event().await.unwrap();

        phone_a.send_bytes(TOWER_ENDPOINT_ID, b"hi".to_vec()).await.unwrap();
        let echoed_to_b = phone_b.next_event().await.unwrap();
        assert_eq!(echoed_to_b, TransportEvent::BytesReceived { endpoint_id: TOWER_ENDPOINT_ID.into(), bytes: b"hi".to_vec() });
        // open question 4: the tower is not itself dedup'd, so the writer
        // also sees its own frame echoed back.
        let echoed_to_a = phone_a.next_event().await.unwrap();
        assert_eq!(echoed_to_a, TransportEvent::BytesReceived { endpoint_id: TOWER_ENDPOINT_ID.into(), bytes: b"hi".to_vec() });
    }

    #[tokio::test]
    async fn oversized_write_is_rejected_before_reaching_the_hub() {
        let hub = TowerHub::new("GITCHAT-TOWER-01");
        let mut phone = TowerLink::new(Arc::clone(&hub), "a");
        phone.request_connection(TOWER_ENDPOINT_ID, "Alice").await.unwrap();
        phone.next_event().await.unwrap();
        let err = phone.send_bytes(TOWER_ENDPOINT_ID, vec![0u8; 600]).await.unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));
    }

    #[tokio::test]
    async fn absent_tower_yields_no_discovery_event() {
        let hub = TowerHub::new("GITCHAT-TOWER-01");
        hub.set_present(false);
        let mut phone = TowerLink::new(hub, "a");
        phone.start_discover().await.unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_millis(20), phone.next_event()).await;
        assert!(result.is_err(), "no endpoint should have been found while the tower is absent");
    }
}
