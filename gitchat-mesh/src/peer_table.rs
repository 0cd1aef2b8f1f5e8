//! Live endpoint-id → [`MeshPeer`] map (spec §3, §4.3).
//!
//! Names arriving out of order (a `ConnectionResult` landing before the
//! `ConnectionInitiated` upsert, or vice versa) must never regress a real
//! name back to a placeholder; `preserved_names` is the parallel map that
//! makes that true regardless of callback order.

use std::collections::HashMap;

use gitchat_core::MeshPeer;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct PeerTable {
    peers: Mutex<HashMap<String, MeshPeer>>,
    preserved_names: Mutex<HashMap<String, String>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `EndpointFound` / `ConnectionInitiated`: create the record if absent.
    /// Never clobbers an existing `is_connected = true` entry's connection
    /// state, but does refresh `last_seen` and the name.
    pub async fn upsert_seen(&self, endpoint_id: &str, endpoint_name: &str, now: u64) {
        self.preserved_names.lock().await.insert(endpoint_id.to_string(), endpoint_name.to_string());
        let mut peers = self.peers.lock().await;
        let entry = peers.entry(endpoint_id.to_string()).or_insert_with(|| MeshPeer::new(endpoint_id, endpoint_name, now));
        entry.last_seen = now;
        if !entry.is_connected {
            entry.endpoint_name = endpoint_name.to_string();
        }
    }

    pub async fn mark_connected(&self, endpoint_id: &str, now: u64) {
        let preserved = self.preserved_names.lock().await.get(endpoint_id).cloned();
        let mut peers = self.peers.lock().await;
        let entry = peers
            .entry(endpoint_id.to_string())
            .or_insert_with(|| MeshPeer::new(endpoint_id, preserved.as_deref().unwrap_or(endpoint_id), now));
        entry.is_connected = true;
        entry.last_seen = now;
        if let Some(name) = preserved {
            if !name.is_empty() {
                entry.endpoint_name = name;
            }
        }
    }

    pub async fn remove(&self, endpoint_id: &str) -> Option<MeshPeer> {
        self.preserved_names.lock().await.remove(endpoint_id);
        self.peers.lock().await.remove(endpoint_id)
    }

    pub async fn record_rtt(&self, endpoint_id: &str, rtt_ms: u64) {
        if let Some(p) = self.peers.lock().await.get_mut(endpoint_id) {
            p.record_rtt(rtt_ms);
        }
    }

    /// `PeerInfo` handler: device model always updates; name only if non-empty.
    pub async fn apply_peer_info(&self, endpoint_id: &str, device_model: &str, endpoint_name: &str) {
        if let Some(p) = self.peers.lock().await.get_mut(endpoint_id) {
            p.device_model = Some(device_model.to_string());
            if !endpoint_name.is_empty() {
                p.endpoint_name = endpoint_name.to_string();
            }
        }
    }

    pub async fn get(&self, endpoint_id: &str) -> Option<MeshPeer> {
        self.peers.lock().await.get(endpoint_id).cloned()
    }

    pub async fn list(&self) -> Vec<MeshPeer> {
        self.peers.lock().await.values().cloned().collect()
    }

    pub async fn is_connected(&self, endpoint_id: &str) -> bool {
        self.peers.lock().await.get(endpoint_id).is_some_and(|p| p.is_connected)
    }

    pub async fn connected_ids(&self) -> Vec<String> {
        self.peers.lock().await.values().filter(|p| p.is_connected).map(|p| p.endpoint_id.clone()).collect()
    }

    pub async fn any_connected(&self) -> bool {
        self.peers.lock().await.values().any(|p| p.is_connected)
    }

    /// Drop every peer record (spec §5 `stopMesh`).
    pub async fn clear(&self) {
        self.peers.lock().await.clear();
        self.preserved_names.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connection_result_landing_before_initiated_is_not_clobbered() {
        let table = PeerTable::new();
        table.mark_connected("ep1", 10).await;
        table.upsert_seen("ep1", "Alice", 11).await;
        let p = table.get("ep1").await.unwrap();
        assert!(p.is_connected);
    }

    #[tokio::test]
    async fn preserved_name_restores_on_connect() {
        let table = PeerTable::new();
        table.upsert_seen("ep1", "Alice", 1).await;
        table.mark_connected("ep1", 2).await;
        assert_eq!(table.get("ep1").await.unwrap().endpoint_name, "Alice");
    }

    #[tokio::test]
    async fn remove_drops_peer_and_connected_ids_empties() {
        let table = PeerTable::new();
        table.mark_connected("ep1", 1).await;
        assert!(table.any_connected().await);
        table.remove("ep1").await;
        assert!(!table.any_connected().await);
    }
}
