//! Call state machine (spec §4.7): `Idle -> Offering -> Ringing(callee) ->
//! Connecting -> Connected -> Ended -> Idle`.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallState {
    Idle,
    Offering,
    Ringing,
    Connecting,
    Connected,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Callee,
}

#[derive(Debug, Clone)]
pub enum CallEvent {
    StateChanged(CallState),
    IncomingOffer { from: String, video: bool },
    Error(String),
}
