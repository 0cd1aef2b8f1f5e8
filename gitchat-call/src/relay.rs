//! Phase-3 UDP relay (spec §4.7): bridges the local media engine's loopback
//! RTP socket to the peer's relay socket over the Wi-Fi Direct link.
//!
//! The media engine always talks to `127.0.0.1:<call_udp_port>` (the
//! synthetic candidate handed to it) and has no idea a relay sits in
//! between. Packets that arrive from the peer before the local media port
//! is known (it's only learned once the media engine sends its first
//! loopback datagram) are buffered and flushed once it is.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const MAX_DATAGRAM: usize = 2048;

pub struct UdpRelay {
    socket: Arc<UdpSocket>,
    peer_addr: SocketAddr,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl UdpRelay {
    /// Binds the local relay socket. `peer_addr` is the direct-link IP
    /// (e.g. the Wi-Fi Direct group owner or joiner address) on
    /// `call_udp_port`.
    pub async fn bind(local_port: u16, peer_addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port)).await?;
        Ok(Self { socket: Arc::new(socket), peer_addr, handle: Mutex::new(None) })
    }

    /// Starts the bridging loop: datagrams from `peer_addr` are queued
    /// until the local media port is learned (first datagram received from
    /// loopback), then everything is forwarded in both directions.
    pub async fn start(&self, buffer_capacity: usize) {
        let socket = Arc::clone(&self.socket);
        let peer_addr = self.peer_addr;
        let handle = tokio::spawn(async move { Self::run(socket, peer_addr, buffer_capacity).await });
        *self.handle.lock().await = Some(handle);
    }

    async fn run(socket: Arc<UdpSocket>, peer_addr: SocketAddr, buffer_capacity: usize) {
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut media_addr: Option<SocketAddr> = None;
        let mut pending: VecDeque<Vec<u8>> = VecDeque::with_capacity(buffer_capacity);
        loop {
            let (n, from) = match socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "udp relay recv failed");
                    break;
                }
            };
            let data = &buf[..n];
            if from == peer_addr {
                match media_addr {
                    Some(addr) => {
                        if let Err(e) = socket.send_to(data, addr).await {
                            warn!(error = %e, "udp relay send to local media failed");
                        }
                    }
                    None => {
                        if pending.len() == buffer_capacity {
                            pending.pop_front();
                        }
                        pending.push_back(data.to_vec());
                        debug!(buffered = pending.len(), "media port not yet known, buffering peer datagram");
                    }
                }
            } else {
                let first_time = media_addr.is_none();
                media_addr = Some(from);
                if first_time {
                    for datagram in pending.drain(..) {
                        if let Err(e) = socket.send_to(&datagram, from).await {
                            warn!(error = %e, "udp relay flush to local media failed");
                        }
                    }
                }
                if let Err(e) = socket.send_to(data, peer_addr).await {
                    warn!(error = %e, "udp relay send to peer failed");
                }
            }
        }
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffers_peer_datagrams_until_media_port_known_then_flushes() {
        let peer_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer_socket.local_addr().unwrap();
        let relay = UdpRelay::bind(0, peer_addr).await.unwrap();
        let relay_addr = relay.socket.local_addr().unwrap();
        relay.start(100).await;

        peer_socket.send_to(b"early", relay_addr).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let media_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        media_socket.send_to(b"hello", relay_addr).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = tokio::time::timeout(std::time::Duration::from_secs(1), peer_socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, relay_addr);
        assert_eq!(&buf[..n], b"hello");

        let (n, _) = tokio::time::timeout(std::time::Duration::from_secs(1), media_socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"early");

        relay.stop().await;
    }
}
