//! Scheduling and differential streaming of simulator telemetry.
//!
//! A [`ConnectionController`] waits for the simulator, validates the stream
//! token and runs the [`Scheduler`] on a job-runner thread. Scheduled
//! producers read the [`DataSource`](relay_core::DataSource), derive metrics,
//! filter them against the [`DifferentialState`] and hand whatever changed to
//! the [`Emitter`]. Remote pit commands go through the [`CommandDispatcher`].

pub mod clock;
pub mod command;
pub mod config;
pub mod context;
pub mod controller;
pub mod emitter;
pub mod lifecycle;
mod producers;
pub mod scheduler;
pub mod state;

#[cfg(test)]
mod testkit;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::CommandDispatcher;
pub use config::{ControllerConfig, EngineConfig};
pub use context::{schedule_data_ingestion, EngineContext, SharedContext};
pub use controller::{ConnectionController, Phase};
pub use emitter::{Emitter, TokenCell};
pub use lifecycle::{AutomationState, PlayerInfo, SessionChange, SessionTracker};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use state::{CarEmission, CarStore, ComputationHelpers, DifferentialState};
