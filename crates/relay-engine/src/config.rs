use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// laps kept in the fuel consumption ring
    pub fuel_window: usize,
    /// wait before reading the last lap time, the sim publishes it late
    pub lap_history_delay: Duration,
    /// consecutive polls a car may be missing before it is evicted; 0 keeps
    /// cars forever
    pub car_ttl_polls: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { fuel_window: 5, lap_history_delay: Duration::from_secs(5), car_ttl_polls: 12 }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub quantum: Duration,
    pub heartbeat_interval: Duration,
    pub connect_poll: Duration,
    pub join_timeout: Duration,
    /// recorded session to replay instead of the live simulator
    pub replay: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            quantum: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(1),
            connect_poll: Duration::from_millis(500),
            join_timeout: Duration::from_secs(2),
            replay: None,
            engine: EngineConfig::default(),
        }
    }
}
