//! The mesh engine: peer table, gossip router, sync, groups, chunked/file
//! transfer, connection supervisor, and the `MeshEngine` supervisor that
//! ties them to a [`gitchat_transport::Transport`].

pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod file_transfer;
pub mod group_manager;
pub mod peer_table;
pub mod router;
pub mod store;
pub mod supervisor;
pub mod sync;

pub use config::MeshConfig;
pub use engine::{now_ms, EngineSnapshot, MeshEngine};
pub use error::{MeshError, StoreError};
pub use events::{CallSignal, MeshEvents, SystemEvent};
pub use group_manager::{GroupManager, JoinOutcome};
pub use peer_table::PeerTable;
pub use router::{GossipRouter, Outbound, OutboundTarget};
pub use store::{InMemoryStore, Store};
pub use supervisor::ConnectionSupervisor;
