//! Process assembly (spec §6 external interfaces): a [`GitChatNode`] wires
//! one [`MeshEngine`] to one [`CallOrchestrator`] over a shared transport
//! and exposes the async command surface a UI or CLI drives — the same
//! role `wichain-backend`'s `AppState` plays for its own `NetworkNode`.

pub mod config;

use std::sync::Arc;

use gitchat_call::{CallOrchestrator, DirectLinkProvider, LoopbackDirectLink, MediaEngine, NullMediaEngine};
use gitchat_core::{ChatMessage, MeshGroup, MeshPeer, MessageType};
use gitchat_mesh::{InMemoryStore, MeshConfig, MeshEngine, MeshError, Store};
use gitchat_transport::Transport;
use serde::Serialize;
use tokio::sync::Mutex;

pub use config::{load_from_file, NodeConfig};

/// Health/status snapshot (spec.md §3 supplemented feature): every field
/// here is already observable individually through the mesh/call APIs —
/// this just bundles them for a UI's single refresh call.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub self_name: String,
    pub is_mesh_active: bool,
    pub connected_peers: Vec<MeshPeer>,
    pub pending_group_invites: Vec<MeshGroup>,
    pub is_tower_connected: bool,
    pub call_state: gitchat_call::CallState,
}

/// One running GitChat node: the mesh engine, the call orchestrator riding
/// on top of it, and whatever transport(s) were supplied at construction.
pub struct GitChatNode {
    mesh: Arc<MeshEngine>,
    call: Arc<CallOrchestrator>,
}

impl GitChatNode {
    /// Assembles a node around caller-supplied transport and store
    /// implementations — production code hands in real radios; tests and
    /// the demo CLI hand in [`gitchat_transport::ClusteredRadio`] /
    /// [`InMemoryStore`].
    pub fn new(self_name: impl Into<String>, device_model: impl Into<String>, config: MeshConfig, transport: Arc<Mutex<dyn Transport>>, store: Arc<dyn Store>) -> Arc<Self> {
        Self::with_call_collaborators(self_name, device_model, config, transport, store, Arc::new(LoopbackDirectLink), Arc::new(NullMediaEngine))
    }

    /// As [`Self::new`], but lets a caller substitute the Wi-Fi Direct and
    /// media-engine collaborators the call orchestrator drives (real ones
    /// on a phone, loopback/null stand-ins everywhere else).
    pub fn with_call_collaborators(
        self_name: impl Into<String>,
        device_model: impl Into<String>,
        config: MeshConfig,
        transport: Arc<Mutex<dyn Transport>>,
        store: Arc<dyn Store>,
        link: Arc<dyn DirectLinkProvider>,
        media: Arc<dyn MediaEngine>,
    ) -> Arc<Self> {
        let mesh = MeshEngine::new(self_name, device_model, config.clone(), transport, store);
        let call = CallOrchestrator::new(Arc::clone(&mesh), link, media, config);
        Arc::new(Self { mesh, call })
    }

    /// Convenience constructor matching [`NodeConfig`] loaded from disk,
    /// still requiring the caller to supply transport/store (those are
    /// process-specific, not config-file concerns).
    pub fn from_config(config: NodeConfig, transport: Arc<Mutex<dyn Transport>>, store: Arc<dyn Store>) -> Arc<Self> {
        Self::new(config.self_name, config.device_model, config.mesh, transport, store)
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), MeshError> {
        self.mesh.start().await?;
        self.call.start().await;
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), MeshError> {
        self.mesh.stop().await
    }

    pub fn mesh(&self) -> Arc<MeshEngine> {
        Arc::clone(&self.mesh)
    }

    pub fn call(&self) -> Arc<CallOrchestrator> {
        Arc::clone(&self.call)
    }

    pub async fn send_text(&self, to: &str, body: &str, group_id: Option<String>) -> Result<ChatMessage, MeshError> {
        self.mesh.send_text_message(to, body, group_id, MessageType::Text).await
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        let engine = self.mesh.snapshot().await;
        NodeSnapshot {
            self_name: engine.self_name,
            is_mesh_active: engine.is_mesh_active,
            connected_peers: engine.connected_peers,
            pending_group_invites: engine.pending_group_invites,
            is_tower_connected: self.mesh.is_tower_connected().await,
            call_state: self.call.state().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitchat_transport::{ClusteredHub, ClusteredRadio};

    #[tokio::test]
    async fn snapshot_reflects_mesh_and_call_state_before_anything_happens() {
        let hub = ClusteredHub::new();
        let radio = ClusteredRadio::new(Arc::clone(&hub), "alice", "alice").await;
        let transport: Arc<Mutex<dyn Transport>> = Arc::new(Mutex::new(radio));
        let store = Arc::new(InMemoryStore::new());
        let node = GitChatNode::new("alice", "TestDevice", MeshConfig::default(), transport, store);
        node.start().await.unwrap();

        let snapshot = node.snapshot().await;
        assert_eq!(snapshot.self_name, "alice");
        assert!(snapshot.is_mesh_active);
        assert!(snapshot.connected_peers.is_empty());
        assert!(!snapshot.is_tower_connected);
        assert_eq!(snapshot.call_state, gitchat_call::CallState::Idle);

        node.stop().await.unwrap();
    }
}
