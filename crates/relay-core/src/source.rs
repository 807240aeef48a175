//! Read surface over the simulator's live telemetry.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::error::SourceError;
use crate::pit::PitAction;

/// Typed key/value access into the simulator plus its lifecycle and
/// pit-control surface.
///
/// Implementations must tolerate concurrent `read`/`is_connected` calls from
/// the job-runner and heartbeat threads.
pub trait DataSource: Send + Sync {
    /// Connects, optionally to a recorded session instead of the live sim.
    fn startup(&self, replay: Option<&Path>) -> bool;
    fn shutdown(&self);
    fn is_initialized(&self) -> bool;
    fn is_connected(&self) -> bool;

    fn read(&self, key: &str) -> Option<Value>;

    /// Pin the current frame so a batch of reads sees one instant.
    fn freeze_snapshot(&self);
    fn unfreeze_snapshot(&self);

    fn issue_pit_command(&self, action: PitAction, param: Option<i32>) -> Result<(), SourceError>;

    fn read_value(&self, key: &str) -> Result<Value, SourceError> {
        match self.read(key) {
            Some(Value::Null) | None => Err(SourceError::Missing(key.to_string())),
            Some(v) => Ok(v),
        }
    }

    fn read_f64(&self, key: &str) -> Result<f64, SourceError> {
        as_f64(&self.read_value(key)?, key)
    }

    fn read_i64(&self, key: &str) -> Result<i64, SourceError> {
        as_i64(&self.read_value(key)?, key)
    }

    fn read_bool(&self, key: &str) -> Result<bool, SourceError> {
        as_bool(&self.read_value(key)?, key)
    }

    fn read_str(&self, key: &str) -> Result<String, SourceError> {
        match self.read_value(key)? {
            Value::String(s) => Ok(s),
            _ => Err(SourceError::Type { key: key.to_string(), expected: "a string" }),
        }
    }

    /// Per car-slot array (`CarIdx*` keys).
    fn read_array(&self, key: &str) -> Result<Vec<Value>, SourceError> {
        match self.read_value(key)? {
            Value::Array(a) => Ok(a),
            _ => Err(SourceError::Type { key: key.to_string(), expected: "an array" }),
        }
    }
}

pub fn as_f64(v: &Value, key: &str) -> Result<f64, SourceError> {
    match v {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        _ => v.as_f64().ok_or_else(|| SourceError::Type { key: key.to_string(), expected: "a number" }),
    }
}

pub fn as_i64(v: &Value, key: &str) -> Result<i64, SourceError> {
    v.as_i64()
        .or_else(|| v.as_f64().map(|f| f as i64))
        .ok_or_else(|| SourceError::Type { key: key.to_string(), expected: "an integer" })
}

/// Numbers count as flags too, the SDK reports some booleans as 0/1.
pub fn as_bool(v: &Value, key: &str) -> Result<bool, SourceError> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        _ => Err(SourceError::Type { key: key.to_string(), expected: "a flag" }),
    }
}

/// Field of a nested record, e.g. `WeekendInfo.TrackDisplayName`.
pub fn field<'a>(record: &'a Value, name: &str) -> Result<&'a Value, SourceError> {
    record.get(name).filter(|v| !v.is_null()).ok_or_else(|| SourceError::Missing(name.to_string()))
}

pub fn field_str(record: &Value, name: &str) -> Result<String, SourceError> {
    match field(record, name)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(SourceError::Type { key: name.to_string(), expected: "a string" }),
    }
}

pub fn field_i64(record: &Value, name: &str) -> Result<i64, SourceError> {
    as_i64(field(record, name)?, name)
}

pub fn field_f64(record: &Value, name: &str) -> Result<f64, SourceError> {
    as_f64(field(record, name)?, name)
}

/// In-memory simulator used by tests and demos.
///
/// `set_available(false)` behaves like the sim process exiting: the
/// connection drops and `startup` fails until it becomes available again.
#[derive(Default)]
pub struct MemorySource {
    values: RwLock<Map<String, Value>>,
    frozen: RwLock<Option<Map<String, Value>>>,
    available: AtomicBool,
    initialized: AtomicBool,
    connected: AtomicBool,
    startups: AtomicUsize,
    shutdowns: AtomicUsize,
    commands: Mutex<Vec<(PitAction, Option<i32>)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self { available: AtomicBool::new(true), ..Default::default() }
    }

    pub fn set(&self, key: &str, value: Value) {
        self.values.write().insert(key.to_string(), value);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    pub fn startups(&self) -> usize {
        self.startups.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn take_commands(&self) -> Vec<(PitAction, Option<i32>)> {
        std::mem::take(&mut *self.commands.lock())
    }
}

impl DataSource for MemorySource {
    fn startup(&self, _replay: Option<&Path>) -> bool {
        self.startups.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return false;
        }
        self.initialized.store(true, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        true
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn read(&self, key: &str) -> Option<Value> {
        if let Some(frozen) = self.frozen.read().as_ref() {
            return frozen.get(key).cloned();
        }
        self.values.read().get(key).cloned()
    }

    fn freeze_snapshot(&self) {
        let snapshot = self.values.read().clone();
        *self.frozen.write() = Some(snapshot);
    }

    fn unfreeze_snapshot(&self) {
        *self.frozen.write() = None;
    }

    fn issue_pit_command(&self, action: PitAction, param: Option<i32>) -> Result<(), SourceError> {
        if !self.is_connected() {
            return Err(SourceError::NotConnected);
        }
        self.commands.lock().push((action, param));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_reads() {
        let src = MemorySource::new();
        src.set("FuelLevel", json!(42.5));
        src.set("Lap", json!(3));
        src.set("OnPitRoad", json!(true));
        src.set("Nothing", Value::Null);
        assert_eq!(src.read_f64("FuelLevel").unwrap(), 42.5);
        assert_eq!(src.read_i64("Lap").unwrap(), 3);
        assert!(src.read_bool("OnPitRoad").unwrap());
        assert!(matches!(src.read_f64("Missing"), Err(SourceError::Missing(_))));
        assert!(matches!(src.read_i64("Nothing"), Err(SourceError::Missing(_))));
        assert!(matches!(src.read_array("Lap"), Err(SourceError::Type { .. })));
    }

    #[test]
    fn frozen_reads_see_one_instant() {
        let src = MemorySource::new();
        src.set("Lap", json!(1));
        src.freeze_snapshot();
        src.set("Lap", json!(2));
        assert_eq!(src.read_i64("Lap").unwrap(), 1);
        src.unfreeze_snapshot();
        assert_eq!(src.read_i64("Lap").unwrap(), 2);
    }

    #[test]
    fn lifecycle_and_pit_commands() {
        let src = MemorySource::new();
        assert!(src.issue_pit_command(PitAction::Clear, None).is_err());
        assert!(src.startup(None));
        assert!(src.is_connected());
        src.issue_pit_command(PitAction::Fuel, Some(20)).unwrap();
        assert_eq!(src.take_commands(), vec![(PitAction::Fuel, Some(20))]);

        src.set_available(false);
        assert!(!src.is_connected());
        assert!(!src.startup(None));
    }

    #[test]
    fn nested_fields() {
        let weekend = json!({"TrackDisplayName": "Spa", "SeriesID": 12, "Empty": null});
        assert_eq!(field_str(&weekend, "TrackDisplayName").unwrap(), "Spa");
        assert_eq!(field_i64(&weekend, "SeriesID").unwrap(), 12);
        assert!(field(&weekend, "Empty").is_err());
    }
}
