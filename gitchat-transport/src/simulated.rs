//! An in-process [`Transport`] that needs no real radio hardware.
//!
//! Every [`ClusteredRadio`] sharing the same [`ClusteredHub`] can discover and
//! talk to each other, which makes this the transport used by every
//! integration test in this workspace and the default for `gitchat-node`
//! when run without a configured real adapter.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::TransportError;
use crate::event::{TransferStatus, TransportEvent};
use crate::transport::Transport;

/// Simulated payload chunk size; purely cosmetic, just big enough to produce
/// more than one [`TransportEvent::FileProgress`] tick on a multi-KB file.
const SIM_CHUNK_SIZE: usize = 16 * 1024;

struct NodeHandle {
    name: String,
    advertising: bool,
    inbox: mpsc::UnboundedSender<TransportEvent>,
}

/// Shared rendezvous point for every [`ClusteredRadio`] in a test or process.
#[derive(Default)]
pub struct ClusteredHub {
    nodes: Mutex<HashMap<String, NodeHandle>>,
}

impl ClusteredHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn register(&self, id: String, name: String, inbox: mpsc::UnboundedSender<TransportEvent>) {
        self.nodes.lock().await.insert(id, NodeHandle { name, advertising: false, inbox });
    }

    async fn unregister(&self, id: &str) {
        self.nodes.lock().await.remove(id);
    }

    async fn set_advertising(&self, id: &str, on: bool) {
        if let Some(n) = self.nodes.lock().await.get_mut(id) {
            n.advertising = on;
        }
    }

    async fn advertisers_except(&self, exclude: &str) -> Vec<(String, String)> {
        self.nodes
            .lock()
            .await
            .iter()
            .filter(|(id, n)| n.advertising && id.as_str() != exclude)
            .map(|(id, n)| (id.clone(), n.name.clone()))
            .collect()
    }

    async fn send_to(&self, target: &str, event: TransportEvent) -> Result<(), TransportError> {
        let nodes = self.nodes.lock().await;
        let handle = nodes.get(target).ok_or_else(|| TransportError::NotConnected(target.to_string()))?;
        handle.inbox.send(event).map_err(|_| TransportError::SendFailed(target.to_string()))
    }
}

pub struct ClusteredRadio {
    id: String,
    name: String,
    hub: Arc<ClusteredHub>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    connections: HashSet<String>,
}

impl ClusteredRadio {
    pub async fn new(hub: Arc<ClusteredHub>, id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        hub.register(id.clone(), name.clone(), events_tx.clone()).await;
        Self { id, name, hub, events_tx, events_rx, connections: HashSet::new() }
    }
}

impl Drop for ClusteredRadio {
    fn drop(&mut self) {
        let hub = Arc::clone(&self.hub);
        let id = self.id.clone();
        tokio::spawn(async move { hub.unregister(&id).await });
    }
}

#[async_trait]
impl Transport for ClusteredRadio {
    async fn start_advertise(&mut self, local_name: &str) -> Result<(), TransportError> {
        self.name = local_name.to_string();
        self.hub.set_advertising(&self.id, true).await;
        debug!(id = %self.id, "advertising as {local_name}");
        Ok(())
    }

    async fn start_discover(&mut self) -> Result<(), TransportError> {
        for (endpoint_id, endpoint_name) in self.hub.advertisers_except(&self.id).await {
            let _ = self.events_tx.send(TransportEvent::EndpointFound { endpoint_id, endpoint_name });
        }
        Ok(())
    }

    async fn stop_all(&mut self) -> Result<(), TransportError> {
        self.hub.set_advertising(&self.id, false).await;
        Ok(())
    }

    async fn request_connection(&mut self, endpoint_id: &str, local_name: &str) -> Result<(), TransportError> {
        if self.connections.contains(endpoint_id) {
            return Err(TransportError::AlreadyConnected(endpoint_id.to_string()));
        }
        self.hub
            .send_to(
                endpoint_id,
                TransportEvent::ConnectionInitiated {
                    endpoint_id: self.id.clone(),
                    endpoint_name: local_name.to_string(),
                },
            )
            .await
    }

    async fn accept_connection(&mut self, endpoint_id: &str) -> Result<(), TransportError> {
        self.connections.insert(endpoint_id.to_string());
        self.hub
            .send_to(endpoint_id, TransportEvent::ConnectionResult { endpoint_id: self.id.clone(), accepted: true })
            .await
    }

    async fn reject_connection(&mut self, endpoint_id: &str) -> Result<(), TransportError> {
        self.hub
            .send_to(endpoint_id, TransportEvent::ConnectionResult { endpoint_id: self.id.clone(), accepted: false })
            .await
    }

    async fn disconnect(&mut self, endpoint_id: &str) -> Result<(), TransportError> {
        self.connections.remove(endpoint_id);
        self.hub.send_to(endpoint_id, TransportEvent::Disconnected { endpoint_id: self.id.clone() }).await
    }

    async fn send_bytes(&mut self, endpoint_id: &str, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.connections.contains(endpoint_id) {
            return Err(TransportError::NotConnected(endpoint_id.to_string()));
        }
        self.hub.send_to(endpoint_id, TransportEvent::BytesReceived { endpoint_id: self.id.clone(), bytes }).await
    }

    async fn send_file(&mut self, endpoint_id: &str, payload_id: u64, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.connections.contains(endpoint_id) {
            return Err(TransportError::NotConnected(endpoint_id.to_string()));
        }
        let total_bytes = bytes.len() as u64;
        let mut sent = 0u64;
        for chunk in bytes.chunks(SIM_CHUNK_SIZE) {
            sent += chunk.len() as u64;
            let _ = self.events_tx.send(TransportEvent::FileProgress {
                endpoint_id: endpoint_id.to_string(),
                payload_id,
                bytes_transferred: sent,
                total_bytes,
                status: TransferStatus::InProgress,
            });
        }
        let result = self
            .hub
            .send_to(endpoint_id, TransportEvent::FileReceived { endpoint_id: self.id.clone(), payload_id, bytes })
            .await;
        let status = if result.is_ok() { TransferStatus::Success } else { TransferStatus::Failure };
        let _ = self.events_tx.send(TransportEvent::FileProgress {
            endpoint_id: endpoint_id.to_string(),
            payload_id,
            bytes_transferred: sent,
            total_bytes,
            status,
        });
        result
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events_rx.recv().await?;
        match &event {
            TransportEvent::ConnectionResult { endpoint_id, accepted: true } => {
                self.connections.insert(endpoint_id.clone());
            }
            TransportEvent::Disconnected { endpoint_id } => {
                self.connections.remove(endpoint_id);
            }
            _ => {}
        }
        Some(event)
    }

    fn is_connected(&self, endpoint_id: &str) -> bool {
        self.connections.contains(endpoint_id)
    }

    fn connected_endpoints(&self) -> Vec<String> {
        self.connections.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discover_then_connect_then_exchange_bytes() {
        let hub = ClusteredHub::new();
        let mut alice = ClusteredRadio::new(Arc::clone(&hub), "alice", "Alice").await;
        let mut bob = ClusteredRadio::new(Arc::clone(&hub), "bob", "Bob").await;

        bob.start_advertise("Bob").await.unwrap();
        alice.start_discover().await.unwrap();
        let found = alice.next_event().await.unwrap();
        assert_eq!(found, TransportEvent::EndpointFound { endpoint_id: "bob".into(), endpoint_name: "Bob".into() });

        alice.request_connection("bob", "Alice").await.unwrap();
        let initiated = bob.next_event().await.unwrap();
        assert_eq!(
            initiated,
            TransportEvent::ConnectionInitiated { endpoint_id: "alice".into(), endpoint_name: "Alice".into() }
        );
        bob.accept_connection("alice").await.unwrap();
        let result = alice.next_event().await.unwrap();
        assert_eq!(result, TransportEvent::ConnectionResult { endpoint_id: "bob".into(), accepted: true });
        assert!(alice.is_connected("bob"));
        assert!(bob.is_connected("alice"));

        alice.send_bytes("bob", b"hello".to_vec()).await.unwrap();
        let received = bob.next_event().await.unwrap();
        assert_eq!(received, TransportEvent::BytesReceived { endpoint_id: "alice".into(), bytes: b"hello".to_vec() });
    }

    #[tokio::test]
    async fn send_bytes_without_connection_fails() {
        let hub = ClusteredHub::new();
        let mut alice = ClusteredRadio::new(Arc::clone(&hub), "alice", "Alice").await;
        let err = alice.send_bytes("bob", b"hi".to_vec()).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected(_)));
    }

    #[tokio::test]
    async fn disconnect_is_observed_on_both_sides() {
        let hub = ClusteredHub::new();
        let mut alice = ClusteredRadio::new(Arc::clone(&hub), "alice", "Alice").await;
        let mut bob = ClusteredRadio::new(Arc::clone(&hub), "bob", "Bob").await;
        alice.request_connection("bob", "Alice").await.unwrap();
        bob.next_event().await.unwrap();
        bob.accept_connection("alice").await.unwrap();
        alice.next_event().await.unwrap();

        alice.disconnect("bob").await.unwrap();
        assert!(!alice.is_connected("bob"));
        let ev = bob.next_event().await.unwrap();
        assert_eq!(ev, TransportEvent::Disconnected { endpoint_id: "alice".into() });
        assert!(!bob.is_connected("alice"));
    }

    #[tokio::test]
    async fn send_file_reports_progress_and_completion() {
        let hub = ClusteredHub::new();
        let mut alice = ClusteredRadio::new(Arc::clone(&hub), "alice", "Alice").await;
        let mut bob = ClusteredRadio::new(Arc::clone(&hub), "bob", "Bob").await;
        alice.request_connection("bob", "Alice").await.unwrap();
        bob.next_event().await.unwrap();
        bob.accept_connection("alice").await.unwrap();
        alice.next_event().await.unwrap();

        let payload = vec![7u8; SIM_CHUNK_SIZE + 10];
        alice.send_file("bob", 1, payload.clone()).await.unwrap();

        let progress = alice.next_event().await.unwrap();
        assert!(matches!(progress, TransportEvent::FileProgress { payload_id: 1, status: TransferStatus::InProgress, .. }));
        let received = bob.next_event().await.unwrap();
        assert_eq!(received, TransportEvent::FileReceived { endpoint_id: "alice".into(), payload_id: 1, bytes: payload });
    }

    #[tokio::test]
    async fn send_file_to_a_disconnected_endpoint_reports_failure_status() {
        let hub = ClusteredHub::new();
        let mut alice = ClusteredRadio::new(Arc::clone(&hub), "alice", "Alice").await;
        let mut bob = ClusteredRadio::new(Arc::clone(&hub), "bob", "Bob").await;
        alice.request_connection("bob", "Alice").await.unwrap();
        bob.next_event().await.unwrap();
        bob.accept_connection("alice").await.unwrap();
        alice.next_event().await.unwrap();

        // bob drops off the hub entirely (simulates the remote disappearing
        // mid-transfer) so the final FileReceived delivery fails.
        hub.unregister("bob").await;
        drop(bob);

        let payload = vec![1u8, 2, 3];
        assert!(alice.send_file("bob", 2, payload).await.is_err());

        let mut saw_failure = false;
        while let Ok(event) = alice.events_rx.try_recv() {
            if let TransportEvent::FileProgress { status: TransferStatus::Failure, payload_id: 2, .. } = event {
                saw_failure = true;
            }
        }
        assert!(saw_failure, "expected a Failure-status FileProgress event");
    }
}
