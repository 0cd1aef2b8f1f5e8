//! Peer record shared between the mesh engine and the UI.

use serde::{Deserialize, Serialize};

/// Coarse RTT-derived distance label (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimatedDistance {
    #[serde(rename = "~1-2 m")]
    OneToTwoMeters,
    #[serde(rename = "~3-5 m")]
    ThreeToFiveMeters,
    #[serde(rename = "~5-10 m")]
    FiveToTenMeters,
    #[serde(rename = "~10-20 m")]
    TenToTwentyMeters,
    #[serde(rename = "~20-30 m")]
    TwentyToThirtyMeters,
    #[serde(rename = "~30 m+")]
    ThirtyPlusMeters,
}

impl EstimatedDistance {
    /// Bucket a round-trip time in milliseconds.
    pub fn from_rtt_ms(rtt_ms: u64) -> Self {
        match rtt_ms {
            0..=199 => Self::OneToTwoMeters,
            200..=399 => Self::ThreeToFiveMeters,
            400..=699 => Self::FiveToTenMeters,
            700..=1199 => Self::TenToTwentyMeters,
            1200..=1999 => Self::TwentyToThirtyMeters,
            _ => Self::ThirtyPlusMeters,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OneToTwoMeters => "~1-2 m",
            Self::ThreeToFiveMeters => "~3-5 m",
            Self::FiveToTenMeters => "~5-10 m",
            Self::TenToTwentyMeters => "~10-20 m",
            Self::TwentyToThirtyMeters => "~20-30 m",
            Self::ThirtyPlusMeters => "~30 m+",
        }
    }
}

/// A live radio-peer record. Created on first discovery or connect-initiated
/// callback; removed on disconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshPeer {
    pub endpoint_id: String,
    pub endpoint_name: String,
    pub is_connected: bool,
    pub last_seen: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rtt_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_distance: Option<EstimatedDistance>,
}

impl MeshPeer {
    pub fn new(endpoint_id: impl Into<String>, endpoint_name: impl Into<String>, now: u64) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            endpoint_name: endpoint_name.into(),
            is_connected: false,
            last_seen: now,
            device_model: None,
            last_rtt_ms: None,
            estimated_distance: None,
        }
    }

    pub fn record_rtt(&mut self, rtt_ms: u64) {
        self.last_rtt_ms = Some(rtt_ms);
        self.estimated_distance = Some(EstimatedDistance::from_rtt_ms(rtt_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_buckets_match_spec_thresholds() {
        assert_eq!(EstimatedDistance::from_rtt_ms(0), EstimatedDistance::OneToTwoMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(199), EstimatedDistance::OneToTwoMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(200), EstimatedDistance::ThreeToFiveMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(399), EstimatedDistance::ThreeToFiveMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(400), EstimatedDistance::FiveToTenMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(699), EstimatedDistance::FiveToTenMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(700), EstimatedDistance::TenToTwentyMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(1199), EstimatedDistance::TenToTwentyMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(1200), EstimatedDistance::TwentyToThirtyMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(1999), EstimatedDistance::TwentyToThirtyMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(2000), EstimatedDistance::ThirtyPlusMeters);
        assert_eq!(EstimatedDistance::from_rtt_ms(50_000), EstimatedDistance::ThirtyPlusMeters);
    }

    #[test]
    fn record_rtt_updates_distance() {
        let mut p = MeshPeer::new("ep1", "alice", 0);
        p.record_rtt(250);
        assert_eq!(p.last_rtt_ms, Some(250));
        assert_eq!(p.estimated_distance, Some(EstimatedDistance::ThreeToFiveMeters));
    }
}
