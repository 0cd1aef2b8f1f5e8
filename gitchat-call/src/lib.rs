//! Call Orchestrator (spec §4.7): mesh-carried signaling handoff to a
//! direct Wi-Fi Direct link, a UDP relay bridging it to the loopback media
//! engine, and synthetic ICE so that engine never needs to see the direct
//! radio interface at all.

pub mod error;
pub mod link;
pub mod media;
pub mod orchestrator;
pub mod relay;
pub mod signal;
pub mod state;

pub use error::CallError;
pub use link::{DirectLinkProvider, LoopbackDirectLink};
pub use media::{MediaEngine, NullMediaEngine};
pub use orchestrator::CallOrchestrator;
pub use relay::UdpRelay;
pub use signal::{DirectSignal, SignalReader, SignalWriter};
pub use state::{CallEvent, CallRole, CallState};
