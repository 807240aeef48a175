//! File and stdio backed implementations of the relay boundaries.

pub mod publisher;
pub mod replay;
pub mod settings;
pub mod subscriber;

pub use publisher::NdjsonPublisher;
pub use replay::{load_frames, ReplaySource};
pub use settings::{default_settings_path, load_settings, save_settings};
pub use subscriber::LineSubscriber;
