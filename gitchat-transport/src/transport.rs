//! The radio-agnostic capability every endpoint transport implements.
//!
//! Shape mirrors the advertise/discover/connect/payload split used by the
//! reference mobile mesh SDKs this system targets: callers never see sockets,
//! only endpoint ids, byte payloads, and file payloads with progress.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::event::TransportEvent;

#[async_trait]
pub trait Transport: Send {
    /// Begin broadcasting our presence under `local_name` so peers can find us.
    async fn start_advertise(&mut self, local_name: &str) -> Result<(), TransportError>;

    /// Begin scanning for advertising peers. Discoveries arrive as
    /// [`TransportEvent::EndpointFound`] from [`Self::next_event`].
    async fn start_discover(&mut self) -> Result<(), TransportError>;

    /// Stop both advertising and discovery without tearing down existing
    /// connections.
    async fn stop_all(&mut self) -> Result<(), TransportError>;

    /// Ask a discovered endpoint to connect. Resolution arrives as
    /// [`TransportEvent::ConnectionResult`].
    async fn request_connection(&mut self, endpoint_id: &str, local_name: &str) -> Result<(), TransportError>;

    /// Accept an inbound [`TransportEvent::ConnectionInitiated`].
    async fn accept_connection(&mut self, endpoint_id: &str) -> Result<(), TransportError>;

    /// Reject an inbound [`TransportEvent::ConnectionInitiated`].
    async fn reject_connection(&mut self, endpoint_id: &str) -> Result<(), TransportError>;

    async fn disconnect(&mut self, endpoint_id: &str) -> Result<(), TransportError>;

    /// Send a short, atomic byte payload (a single encoded [`MeshPacket`]).
    ///
    /// [`MeshPacket`]: gitchat_core::MeshPacket
    async fn send_bytes(&mut self, endpoint_id: &str, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Send a large payload as a file transfer. Progress and completion are
    /// reported through [`TransportEvent::FileProgress`] /
    /// [`TransportEvent::FileReceived`] on both ends, not a callback —
    /// matches how every other async result surfaces on this trait.
    async fn send_file(&mut self, endpoint_id: &str, payload_id: u64, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Block until the next event. Returns `None` once the transport is
    /// closed and will produce no further events.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    fn is_connected(&self, endpoint_id: &str) -> bool;

    fn connected_endpoints(&self) -> Vec<String>;
}
