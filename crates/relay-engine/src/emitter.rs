use std::sync::Arc;

use model::{EventRecord, StreamRecord};
use parking_lot::RwLock;
use relay_core::{Publisher, RelayError};
use serde::Serialize;
use serde_json::{Map, Value};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

/// Stream token shared by the controller, the jobs and the command path.
#[derive(Clone, Default, Debug)]
pub struct TokenCell(Arc<RwLock<Option<String>>>);

impl TokenCell {
    pub fn get(&self) -> Option<String> {
        self.0.read().clone()
    }

    pub fn set(&self, token: &str) {
        *self.0.write() = Some(token.to_string());
    }

    pub fn take(&self) -> Option<String> {
        self.0.write().take()
    }

    pub fn is_set(&self) -> bool {
        self.0.read().is_some()
    }
}

/// `YYYYMMDDTHHMMSS`, UTC.
pub fn stream_timestamp() -> String {
    let fmt = format_description!("[year][month][day]T[hour][minute][second]");
    OffsetDateTime::now_utc().format(&fmt).unwrap_or_default()
}

/// `HH:MM:SS`, UTC. Used inside event payloads.
pub fn event_time() -> String {
    let fmt = format_description!("[hour]:[minute]:[second]");
    OffsetDateTime::now_utc().format(&fmt).unwrap_or_default()
}

/// Wraps payloads into [`StreamRecord`]s and hands them to the publisher.
#[derive(Clone)]
pub struct Emitter {
    publisher: Arc<dyn Publisher>,
    token: TokenCell,
}

impl Emitter {
    pub fn new(publisher: Arc<dyn Publisher>, token: TokenCell) -> Self {
        Self { publisher, token }
    }

    pub fn token(&self) -> &TokenCell {
        &self.token
    }

    pub fn send<T: Serialize>(&self, kind: &str, data: T) -> Result<(), RelayError> {
        self.send_with(kind, data, Map::new())
    }

    /// Like [`send`](Self::send) with extra top-level fields such as
    /// `full_update` or `reset`.
    pub fn send_with<T: Serialize>(&self, kind: &str, data: T, extra: Map<String, Value>) -> Result<(), RelayError> {
        let token = self.token.get().ok_or(RelayError::MissingToken)?;
        let record = StreamRecord {
            kind: kind.to_string(),
            data: serde_json::to_value(data).map_err(anyhow::Error::from)?,
            token: token.clone(),
            timestamp: stream_timestamp(),
            extra,
        };
        self.publisher.publish(&record, &token)?;
        let size = serde_json::to_string(&record).map(|s| s.len()).unwrap_or(0);
        info!("Sent {kind} ({size}B).");
        Ok(())
    }

    /// `event` record stamped with the current UTC time.
    pub fn send_event(&self, kind: &str, description: String, commands: Vec<String>) -> Result<(), RelayError> {
        self.send("event", EventRecord { kind: kind.to_string(), description, time: event_time(), commands })
    }
}
