//! Abstracts Wi-Fi Direct group formation (spec §4.7 Phase 2) behind a
//! trait the same way [`gitchat_transport::Transport`] abstracts the
//! discovery/connection radio: the TCP/UDP socket code downstream is real,
//! only "how do we get an IP on the direct-link interface" is pluggable.

use std::net::IpAddr;

use async_trait::async_trait;
use tokio::time::{sleep, Duration};

use crate::error::CallError;

/// One side's role in the Wi-Fi Direct group (spec §4.7: the caller becomes
/// the group owner at a fixed address, the callee discovers and joins it).
#[async_trait]
pub trait DirectLinkProvider: Send + Sync {
    /// Becomes the Wi-Fi Direct group owner, returning the address other
    /// members reach it on (spec: `192.168.49.1`).
    async fn become_owner(&self, owner_addr: IpAddr) -> Result<IpAddr, CallError>;

    /// Discovers and joins the peer's group, polling for an interface
    /// address for up to `iface_timeout` (spec: 15s budget, `iface_poll`
    /// spacing) after group formation itself completes (spec: 40s budget).
    async fn connect_to_owner(
        &self,
        owner_addr: IpAddr,
        group_formation_timeout: Duration,
        iface_poll: Duration,
        iface_timeout: Duration,
    ) -> Result<IpAddr, CallError>;

    /// Tears the group down and releases the interface.
    async fn teardown(&self);
}

/// Reference implementation used in tests and whenever no real Wi-Fi
/// Direct stack is wired in: both roles resolve to loopback immediately.
pub struct LoopbackDirectLink;

#[async_trait]
impl DirectLinkProvider for LoopbackDirectLink {
    async fn become_owner(&self, _owner_addr: IpAddr) -> Result<IpAddr, CallError> {
        Ok(IpAddr::from([127, 0, 0, 1]))
    }

    async fn connect_to_owner(
        &self,
        _owner_addr: IpAddr,
        _group_formation_timeout: Duration,
        _iface_poll: Duration,
        _iface_timeout: Duration,
    ) -> Result<IpAddr, CallError> {
        sleep(Duration::from_millis(1)).await;
        Ok(IpAddr::from([127, 0, 0, 1]))
    }

    async fn teardown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_link_resolves_both_roles_to_localhost() {
        let link = LoopbackDirectLink;
        let owner_addr: IpAddr = [192, 168, 49, 1].into();
        assert_eq!(link.become_owner(owner_addr).await.unwrap(), IpAddr::from([127, 0, 0, 1]));
        let joined = link
            .connect_to_owner(owner_addr, Duration::from_millis(10), Duration::from_millis(1), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(joined, IpAddr::from([127, 0, 0, 1]));
    }
}
