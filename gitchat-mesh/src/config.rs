//! All mesh magic numbers in one place, overridable from `gitchat.toml`.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Default hop budget for a freshly authored message.
    pub default_ttl: u32,
    /// Maximum retry attempts for a connection-initiate loop (spec §4.3).
    pub connection_retry_attempts: u32,
    /// Base delay for attempt *k*: `base_retry_delay_ms * 2^(k-1)`.
    pub base_retry_delay_ms: u64,
    /// Upper bound (exclusive) of the uniform jitter added to each retry wait.
    pub retry_jitter_ms: u64,
    /// Ping cadence once at least one peer is connected.
    pub ping_interval_ms: u64,
    /// Dedup set watermark (spec §9 open question 2).
    pub dedup_capacity: usize,
    /// Base64 characters per image chunk frame (spec §4.6).
    pub image_chunk_size: usize,
    /// Max messages returned in one `SyncResponse` (spec §4.5).
    pub sync_batch_cap: usize,
    /// Tower reconnect delay after a drop (spec §5).
    pub tower_reconnect_delay_ms: u64,
    /// TCP call-signaling port (spec §4.7, §6).
    pub call_tcp_port: u16,
    /// UDP relay port (spec §4.7, §6).
    pub call_udp_port: u16,
    /// Canonical Wi-Fi Direct group-owner address (spec §4.7, §6).
    pub group_owner_addr: String,
    /// Caller: wait after the 3rd ready signal before stopping the mesh.
    pub phase2_caller_grace_ms: u64,
    /// Callee: wait after receiving a ready signal before stopping the mesh.
    pub phase2_callee_grace_ms: u64,
    /// Interface-acquisition poll interval.
    pub phase2_iface_poll_ms: u64,
    /// Interface-acquisition total budget.
    pub phase2_iface_timeout_ms: u64,
    /// Caller's TCP accept budget.
    pub phase2_tcp_accept_timeout_ms: u64,
    /// Callee's async group-formation poll budget.
    pub phase2_group_formation_timeout_ms: u64,
    /// Callee: max TCP connect attempts to the group owner.
    pub phase2_tcp_connect_attempts: u32,
    /// Callee: gap between TCP connect attempts.
    pub phase2_tcp_connect_gap_ms: u64,
    /// Bounded buffer for peer datagrams arriving before the local media port is known.
    pub relay_buffer_capacity: usize,
    /// Settle delay before the mesh restarts after `end_call`.
    pub call_teardown_settle_ms: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            default_ttl: 3,
            connection_retry_attempts: 7,
            base_retry_delay_ms: 1000,
            retry_jitter_ms: 1500,
            ping_interval_ms: 3_000,
            dedup_capacity: gitchat_core::dedup::DEFAULT_CAPACITY,
            image_chunk_size: 28_000,
            sync_batch_cap: 50,
            tower_reconnect_delay_ms: 5_000,
            call_tcp_port: 29876,
            call_udp_port: 59876,
            group_owner_addr: "192.168.49.1".to_string(),
            phase2_caller_grace_ms: 2_000,
            phase2_callee_grace_ms: 4_000,
            phase2_iface_poll_ms: 500,
            phase2_iface_timeout_ms: 15_000,
            phase2_tcp_accept_timeout_ms: 90_000,
            phase2_group_formation_timeout_ms: 40_000,
            phase2_tcp_connect_attempts: 10,
            phase2_tcp_connect_gap_ms: 3_000,
            relay_buffer_capacity: 100,
            call_teardown_settle_ms: 2_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_reference_values() {
        let c = MeshConfig::default();
        assert_eq!(c.default_ttl, 3);
        assert_eq!(c.connection_retry_attempts, 7);
        assert_eq!(c.dedup_capacity, 10_000);
        assert_eq!(c.image_chunk_size, 28_000);
        assert_eq!(c.sync_batch_cap, 50);
        assert_eq!(c.call_tcp_port, 29876);
        assert_eq!(c.call_udp_port, 59876);
        assert_eq!(c.group_owner_addr, "192.168.49.1");
    }
}
