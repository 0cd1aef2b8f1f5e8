//! Connection-attempt retry loop with exponential backoff + jitter (spec
//! §4.3): resolves the well-known clustered-radio race where both sides of
//! a discovery initiate simultaneously.

use std::sync::Arc;
use std::time::Duration;

use gitchat_transport::{Transport, TransportError};
use rand::Rng;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::MeshConfig;
use crate::peer_table::PeerTable;

/// Tracks in-flight retry loops so a late `ConnectionResult(ok)` or a
/// `Disconnected`/shutdown can cancel them.
#[derive(Default)]
pub struct ConnectionSupervisor {
    attempts: Mutex<std::collections::HashMap<String, watch::Sender<bool>>>,
}

impl ConnectionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the retry loop for `endpoint_id`, if one is running. Call this
    /// on `ConnectionResult(ok)` (observed from either side) or `Disconnected`.
    pub async fn cancel(&self, endpoint_id: &str) {
        if let Some(stop) = self.attempts.lock().await.remove(endpoint_id) {
            let _ = stop.send(true);
        }
    }

    pub async fn cancel_all(&self) {
        let mut attempts = self.attempts.lock().await;
        for (_, stop) in attempts.drain() {
            let _ = stop.send(true);
        }
    }

    /// Spawn the attempt loop for a freshly discovered, not-yet-connected
    /// endpoint. No-ops if a loop for this endpoint is already running.
    pub async fn spawn_attempt_loop(
        self: &Arc<Self>,
        transport: Arc<Mutex<dyn Transport>>,
        peers: Arc<PeerTable>,
        config: MeshConfig,
        endpoint_id: String,
        endpoint_name: String,
        local_name: String,
    ) -> Option<JoinHandle<()>> {
        let mut attempts = self.attempts.lock().await;
        if attempts.contains_key(&endpoint_id) {
            return None;
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        attempts.insert(endpoint_id.clone(), stop_tx);
        drop(attempts);

        let supervisor = Arc::clone(self);
        Some(tokio::spawn(async move {
            for attempt in 1..=config.connection_retry_attempts {
                if *stop_rx.borrow() || peers.is_connected(&endpoint_id).await {
                    break;
                }
                let backoff = config.base_retry_delay_ms * 2u64.pow(attempt - 1);
                let jitter = rand::thread_rng().gen_range(0..config.retry_jitter_ms.max(1));
                let wait = Duration::from_millis(backoff + jitter);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = stop_rx.changed() => break,
                }
                if *stop_rx.borrow() || peers.is_connected(&endpoint_id).await {
                    break;
                }
                let result = transport.lock().await.request_connection(&endpoint_id, &local_name).await;
                match result {
                    Ok(()) => debug!(endpoint_id, attempt, "connection request sent"),
                    Err(TransportError::AlreadyConnected(_)) => break,
                    Err(e) => warn!(endpoint_id, attempt, error = %e, "connection attempt failed"),
                }
            }
            supervisor.attempts.lock().await.remove(&endpoint_id);
            let _ = endpoint_name;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_before_spawn_is_a_no_op() {
        let supervisor = Arc::new(ConnectionSupervisor::new());
        supervisor.cancel("ep1").await;
    }

    #[tokio::test]
    async fn second_spawn_for_same_endpoint_is_skipped() {
        let supervisor = Arc::new(ConnectionSupervisor::new());
        {
            let mut attempts = supervisor.attempts.lock().await;
            attempts.insert("ep1".into(), watch::channel(false).0);
        }
        assert!(supervisor.attempts.lock().await.contains_key("ep1"));
    }
}
