//! Radio-agnostic transport layer: the [`Transport`] capability trait, its
//! event and error types, and the in-process [`simulated::ClusteredRadio`]
//! used by every test and by `gitchat-node` absent real hardware.

pub mod error;
pub mod event;
pub mod simulated;
pub mod tower;
pub mod transport;

pub use error::TransportError;
pub use event::{TransferStatus, TransportEvent};
pub use simulated::{ClusteredHub, ClusteredRadio};
pub use tower::{is_tower, TowerHub, TowerLink, TowerState, TOWER_ENDPOINT_ID, TOWER_MSG_MAX_BYTES, TOWER_NAME_PREFIX};
pub use transport::Transport;
