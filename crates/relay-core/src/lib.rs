//! Boundary traits and shared types for the telemetry relay.
//!
//! The engine only talks to the simulator, the outbound stream, the inbound
//! command channel and the lobby service through the traits defined here.
//! Each boundary also ships an in-memory implementation.

pub mod control;
pub mod error;
pub mod pit;
pub mod settings;
pub mod source;
pub mod transport;

pub use control::{ControlPlane, LobbyRequest, LobbyResponse, MemoryControlPlane};
pub use error::{RelayError, SourceError};
pub use pit::PitAction;
pub use settings::{DataGroup, DataSettings, GroupConfig, GroupMode};
pub use source::{DataSource, MemorySource};
pub use transport::{
    channel, ChannelPublisher, CommandHandler, CommandSubscriber, MemorySubscriber, Published,
    PublishedRx, PublishedTx, Publisher,
};
