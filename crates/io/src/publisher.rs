use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use model::StreamRecord;
use parking_lot::Mutex;
use relay_core::{Publisher, RelayError};

/// Appends every record as one JSON line.
pub struct NdjsonPublisher {
    out: Mutex<Box<dyn Write + Send>>,
}

impl NdjsonPublisher {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn create(path: &Path) -> Result<Self> {
        let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        Ok(Self::new(Box::new(BufWriter::new(f))))
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl Publisher for NdjsonPublisher {
    fn publish(&self, record: &StreamRecord, _partition_key: &str) -> Result<(), RelayError> {
        let line = serde_json::to_string(record).map_err(anyhow::Error::from)?;
        let mut out = self.out.lock();
        writeln!(out, "{line}")
            .and_then(|_| out.flush())
            .map_err(|e| RelayError::Transport(format!("writing record: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{BufRead, BufReader};

    fn record(kind: &str, data: serde_json::Value) -> StreamRecord {
        StreamRecord {
            kind: kind.into(),
            data,
            token: "tok".into(),
            timestamp: "20240101T120000".into(),
            extra: Default::default(),
        }
    }

    #[test]
    fn one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.ndjson");
        let publisher = NdjsonPublisher::create(&path).unwrap();
        let fuel = record("fuel", json!({"fuel_level": 41.5}));
        publisher.publish(&fuel, "tok").unwrap();
        publisher.publish(&record("in_car", json!(true)), "tok").unwrap();

        let lines: Vec<String> = BufReader::new(File::open(&path).unwrap()).lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 2);
        let back: StreamRecord = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(back, fuel);
        assert!(lines[1].contains(r#""type":"in_car""#));
    }

    #[test]
    fn create_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NdjsonPublisher::create(&dir.path().join("no/such/dir/out.ndjson")).is_err());
    }
}
