//! Abstracts the external WebRTC media engine the same way [`crate::link`]
//! abstracts Wi-Fi Direct group formation: everything Phase 3 does — bind a
//! relay, inject a synthetic candidate, strip real ones from SDP — is real
//! code; only the audio/video engine itself (out of scope here, per spec
//! §1's "the media engine is an external collaborator") sits behind a trait.

use async_trait::async_trait;

use crate::error::CallError;

/// One side of the WebRTC session the Call Orchestrator drives through
/// Phase 3: generate/consume SDP, accept the synthetic relay candidate, and
/// toggle the local media state the Call API exposes.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Caller side: produces a local SDP offer for the given media kind.
    async fn create_offer(&self, video: bool) -> Result<String, CallError>;

    /// Callee side: consumes the caller's offer and produces a local answer.
    async fn create_answer(&self, remote_sdp: &str, video: bool) -> Result<String, CallError>;

    /// Either side, once it holds the peer's description (answer for the
    /// caller, nothing further for the callee beyond its own answer).
    async fn set_remote_description(&self, remote_sdp: &str) -> Result<(), CallError>;

    /// Hands the engine the one synthetic host-UDP candidate it will ever
    /// see (spec §4.7): its own gathered candidates are never surfaced.
    async fn add_ice_candidate(&self, candidate: &str) -> Result<(), CallError>;

    async fn set_muted(&self, muted: bool);
    async fn set_camera_enabled(&self, enabled: bool);
    async fn set_speaker_enabled(&self, enabled: bool);
    async fn switch_camera(&self);

    /// Tears down the session; idempotent.
    async fn close(&self);
}

/// Reference engine used in tests and whenever no real WebRTC stack is
/// wired in: produces placeholder SDP and otherwise no-ops. Exercises every
/// hook the orchestrator calls without needing real media hardware.
pub struct NullMediaEngine;

#[async_trait]
impl MediaEngine for NullMediaEngine {
    async fn create_offer(&self, video: bool) -> Result<String, CallError> {
        Ok(format!("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nm={} 9 UDP/TLS/RTP/SAVPF 0\r\n", if video { "video" } else { "audio" }))
    }

    async fn create_answer(&self, _remote_sdp: &str, video: bool) -> Result<String, CallError> {
        Ok(format!("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nm={} 9 UDP/TLS/RTP/SAVPF 0\r\n", if video { "video" } else { "audio" }))
    }

    async fn set_remote_description(&self, _remote_sdp: &str) -> Result<(), CallError> {
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: &str) -> Result<(), CallError> {
        Ok(())
    }

    async fn set_muted(&self, _muted: bool) {}
    async fn set_camera_enabled(&self, _enabled: bool) {}
    async fn set_speaker_enabled(&self, _enabled: bool) {}
    async fn switch_camera(&self) {}
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_engine_produces_an_offer_and_answer_for_either_media_kind() {
        let engine = NullMediaEngine;
        let offer = engine.create_offer(true).await.unwrap();
        assert!(offer.contains("m=video"));
        let answer = engine.create_answer(&offer, false).await.unwrap();
        assert!(answer.contains("m=audio"));
        engine.set_remote_description(&answer).await.unwrap();
        engine.add_ice_candidate("candidate:1 1 UDP 1 127.0.0.1 1 typ host").await.unwrap();
        engine.close().await;
    }
}
