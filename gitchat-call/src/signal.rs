//! Phase-2 TCP signaling wire format (spec §4.7, §6): newline-delimited JSON
//! objects exchanged once the mesh has handed off to the direct radio link.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::CallError;

/// Host-UDP candidate every side hands its media engine instead of whatever
/// it gathered itself (spec §4.7 "synthetic ICE").
pub const SYNTHETIC_CANDIDATE_PRIORITY: u32 = 2_130_706_431;
pub const SYNTHETIC_CANDIDATE_GENERATION: u32 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DirectSignal {
    #[serde(rename = "p2pInfo")]
    P2pInfo { ip: String },
    #[serde(rename = "offer")]
    Offer { sdp: String, video: bool },
    #[serde(rename = "answer")]
    Answer { sdp: String },
    #[serde(rename = "iceCandidate")]
    IceCandidate { candidate: String, sdp_mid: Option<String>, sdp_m_line_index: Option<u32> },
    #[serde(rename = "callEnd")]
    CallEnd,
}

impl DirectSignal {
    /// The synthetic candidate both sides inject locally right after their
    /// local description is set, pointing at their own relay port.
    pub fn synthetic_candidate(udp_port: u16) -> Self {
        Self::IceCandidate {
            candidate: format!(
                "candidate:1 1 UDP {SYNTHETIC_CANDIDATE_PRIORITY} 127.0.0.1 {udp_port} typ host generation {SYNTHETIC_CANDIDATE_GENERATION}"
            ),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        }
    }
}

/// Strip every `a=candidate:` line from an outgoing SDP blob so the peer's
/// media engine only ever discovers the synthetic relay candidate (spec
/// §4.7 "All a=candidate: lines are stripped").
pub fn strip_candidate_lines(sdp: &str) -> String {
    sdp.lines().filter(|line| !line.trim_start().starts_with("a=candidate:")).collect::<Vec<_>>().join("\r\n")
}

pub struct SignalWriter(OwnedWriteHalf);

impl SignalWriter {
    pub fn new(half: OwnedWriteHalf) -> Self {
        Self(half)
    }

    pub async fn send(&mut self, signal: &DirectSignal) -> Result<(), CallError> {
        let mut line = serde_json::to_string(signal)?;
        line.push('\n');
        self.0.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

pub struct SignalReader(BufReader<OwnedReadHalf>);

impl SignalReader {
    pub fn new(half: OwnedReadHalf) -> Self {
        Self(BufReader::new(half))
    }

    /// Reads the next line. Returns `Ok(None)` on a clean EOF (peer closed).
    pub async fn recv(&mut self) -> Result<Option<DirectSignal>, CallError> {
        let mut line = String::new();
        let n = self.0.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(line.trim_end())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_candidate_lines() {
        let sdp = "v=0\r\na=candidate:1 1 UDP 1 1.2.3.4 1 typ host\r\na=mid:0\r\n";
        let stripped = strip_candidate_lines(sdp);
        assert!(!stripped.contains("a=candidate"));
        assert!(stripped.contains("a=mid:0"));
    }

    #[test]
    fn synthetic_candidate_points_at_local_relay_port() {
        let DirectSignal::IceCandidate { candidate, .. } = DirectSignal::synthetic_candidate(59876) else { panic!() };
        assert!(candidate.contains("127.0.0.1 59876"));
        assert!(candidate.contains(&SYNTHETIC_CANDIDATE_PRIORITY.to_string()));
    }

    #[test]
    fn signal_round_trips_through_json() {
        let signal = DirectSignal::Offer { sdp: "v=0".into(), video: true };
        let json = serde_json::to_string(&signal).unwrap();
        assert!(json.contains("\"type\":\"offer\""));
    }
}
