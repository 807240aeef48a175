//! Recorded sessions played back as a [`DataSource`].
//!
//! A recording is NDJSON, one JSON object per line. Each line only needs the
//! keys that changed since the previous one; frames are merged on load so
//! every frame is a complete snapshot.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use parking_lot::{Mutex, RwLock};
use relay_core::{DataSource, PitAction, SourceError};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

pub fn load_frames(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let rdr = BufReader::new(f);
    let mut frames = Vec::new();
    let mut current = Map::new();
    for (n, line) in rdr.lines().enumerate() {
        let s = line?;
        if s.trim().is_empty() {
            continue;
        }
        let delta: Value = serde_json::from_str(&s).with_context(|| format!("line {}", n + 1))?;
        let Value::Object(delta) = delta else {
            bail!("line {}: expected a JSON object", n + 1);
        };
        current.extend(delta);
        frames.push(current.clone());
    }
    Ok(frames)
}

#[derive(Default)]
struct Playback {
    frames: Vec<Map<String, Value>>,
    started: Option<Instant>,
    cursor: usize,
    initialized: bool,
    connected: bool,
}

pub struct ReplaySource {
    path: Option<PathBuf>,
    /// `None` steps only through [`advance`](ReplaySource::advance)
    frame_interval: Option<Duration>,
    playback: RwLock<Playback>,
    frozen: RwLock<Option<usize>>,
    commands: Mutex<Vec<(PitAction, Option<i32>)>>,
}

impl ReplaySource {
    /// Plays `path` unless `startup` is handed another recording.
    pub fn new(path: Option<PathBuf>, frame_interval: Option<Duration>) -> Self {
        Self {
            path,
            frame_interval,
            playback: RwLock::new(Playback::default()),
            frozen: RwLock::new(None),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.playback.read().frames.len()
    }

    /// Current frame, `None` once the recording has run out.
    pub fn position(&self) -> Option<usize> {
        let p = self.playback.read();
        let idx = match (self.frame_interval, p.started) {
            (Some(every), Some(started)) if !every.is_zero() => {
                (started.elapsed().as_millis() / every.as_millis().max(1)) as usize
            }
            _ => p.cursor,
        };
        (idx < p.frames.len()).then_some(idx)
    }

    /// Steps to the next frame. Returns false when the recording has ended.
    pub fn advance(&self) -> bool {
        let mut p = self.playback.write();
        if p.cursor < p.frames.len() {
            p.cursor += 1;
        }
        p.cursor < p.frames.len()
    }

    /// Pit commands a live simulator would have received.
    pub fn take_commands(&self) -> Vec<(PitAction, Option<i32>)> {
        std::mem::take(&mut *self.commands.lock())
    }
}

impl DataSource for ReplaySource {
    fn startup(&self, replay: Option<&Path>) -> bool {
        let Some(path) = replay.or(self.path.as_deref()) else {
            warn!("No recording to replay");
            return false;
        };
        let frames = match load_frames(path) {
            Ok(f) if !f.is_empty() => f,
            Ok(_) => {
                warn!("Recording {} is empty", path.display());
                return false;
            }
            Err(e) => {
                error!("Could not load recording: {e:#}");
                return false;
            }
        };
        info!("Replaying {} frames from {}", frames.len(), path.display());
        *self.playback.write() =
            Playback { frames, started: Some(Instant::now()), cursor: 0, initialized: true, connected: true };
        true
    }

    fn shutdown(&self) {
        let mut p = self.playback.write();
        p.initialized = false;
        p.connected = false;
    }

    fn is_initialized(&self) -> bool {
        self.playback.read().initialized
    }

    fn is_connected(&self) -> bool {
        let connected = self.playback.read().connected;
        connected && self.position().is_some()
    }

    fn read(&self, key: &str) -> Option<Value> {
        let idx = match *self.frozen.read() {
            Some(i) => i,
            None => self.position().unwrap_or_else(|| self.frame_count().saturating_sub(1)),
        };
        self.playback.read().frames.get(idx)?.get(key).cloned()
    }

    fn freeze_snapshot(&self) {
        let idx = self.position().unwrap_or_else(|| self.frame_count().saturating_sub(1));
        *self.frozen.write() = Some(idx);
    }

    fn unfreeze_snapshot(&self) {
        *self.frozen.write() = None;
    }

    fn issue_pit_command(&self, action: PitAction, param: Option<i32>) -> Result<(), SourceError> {
        if !self.is_connected() {
            return Err(SourceError::NotConnected);
        }
        info!("replay: pit command {action:?} {param:?}");
        self.commands.lock().push((action, param));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn recording(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        f
    }

    #[test]
    fn frames_merge_deltas() {
        let f = recording(&[r#"{"Lap": 1, "FuelLevel": 40.0}"#, "", r#"{"Lap": 2}"#]);
        let frames = load_frames(f.path()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["FuelLevel"], json!(40.0));
        assert_eq!(frames[1]["Lap"], json!(2));
    }

    #[test]
    fn rejects_non_objects() {
        let f = recording(&[r#"{"Lap": 1}"#, "[1, 2]"]);
        let err = load_frames(f.path()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn manual_stepping_until_the_end() {
        let f = recording(&[r#"{"Lap": 1}"#, r#"{"Lap": 2}"#]);
        let src = ReplaySource::new(Some(f.path().to_path_buf()), None);
        assert!(!src.is_connected());
        assert!(src.startup(None));
        assert_eq!(src.read_i64("Lap").unwrap(), 1);

        src.freeze_snapshot();
        assert!(src.advance());
        assert_eq!(src.read_i64("Lap").unwrap(), 1);
        src.unfreeze_snapshot();
        assert_eq!(src.read_i64("Lap").unwrap(), 2);

        assert!(!src.advance());
        assert!(!src.is_connected());
        assert_eq!(src.read_i64("Lap").unwrap(), 2);
    }

    #[test]
    fn startup_prefers_given_recording() {
        let a = recording(&[r#"{"TrackName": "a"}"#]);
        let b = recording(&[r#"{"TrackName": "b"}"#]);
        let src = ReplaySource::new(Some(a.path().to_path_buf()), None);
        assert!(src.startup(Some(b.path())));
        assert_eq!(src.read_str("TrackName").unwrap(), "b");
    }

    #[test]
    fn unusable_recordings_do_not_connect() {
        let empty = recording(&[]);
        assert!(!ReplaySource::new(Some(empty.path().to_path_buf()), None).startup(None));
        assert!(!ReplaySource::new(None, None).startup(None));
        let dir = tempfile::tempdir().unwrap();
        assert!(!ReplaySource::new(Some(dir.path().join("gone.ndjson")), None).startup(None));
    }

    #[test]
    fn pit_commands_are_recorded_while_playing() {
        let f = recording(&[r#"{"Lap": 1}"#]);
        let src = ReplaySource::new(Some(f.path().to_path_buf()), None);
        assert!(src.issue_pit_command(PitAction::Clear, None).is_err());
        src.startup(None);
        src.issue_pit_command(PitAction::Fuel, Some(30)).unwrap();
        assert_eq!(src.take_commands(), vec![(PitAction::Fuel, Some(30))]);
        src.shutdown();
        assert!(!src.is_initialized());
    }

    #[test]
    fn timed_playback_runs_out() {
        let f = recording(&[r#"{"Lap": 1}"#, r#"{"Lap": 2}"#]);
        let src = ReplaySource::new(Some(f.path().to_path_buf()), Some(Duration::from_millis(20)));
        src.startup(None);
        assert_eq!(src.position(), Some(0));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(src.position(), None);
        assert!(!src.is_connected());
    }
}
