//! Shared fixtures for the engine tests: an iRacing-shaped snapshot and a
//! context wired to a channel publisher and a virtual clock.

use std::sync::Arc;
use std::time::Duration;

use model::StreamRecord;
use relay_core::{DataSource, MemorySource, PublishedRx};
use serde_json::json;

use crate::clock::ManualClock;
use crate::config::EngineConfig;
use crate::context::{EngineContext, SharedContext};
use crate::emitter::{Emitter, TokenCell};
use crate::scheduler::Scheduler;

pub(crate) struct Harness {
    pub source: Arc<MemorySource>,
    pub ctx: SharedContext,
    pub scheduler: Scheduler,
    pub rx: PublishedRx,
    #[allow(dead_code)]
    pub clock: Arc<ManualClock>,
}

pub(crate) fn harness() -> Harness {
    let source = Arc::new(iracing_source());
    source.startup(None);
    let clock = Arc::new(ManualClock::new());
    let scheduler = Scheduler::new(clock.clone(), Duration::from_secs(1));
    let (publisher, rx) = relay_core::channel();
    let emitter = Emitter::new(Arc::new(publisher), TokenCell::default());
    let ctx = EngineContext::new(source.clone(), emitter, scheduler.handle(), EngineConfig::default()).shared();
    Harness { source, ctx, scheduler, rx, clock }
}

/// Harness whose emitter already holds a stream token.
pub(crate) fn streaming() -> Harness {
    let h = harness();
    h.ctx.lock().emitter.token().set("tok");
    h
}

pub(crate) fn drain(rx: &PublishedRx) -> Vec<StreamRecord> {
    rx.try_iter().map(|p| p.record).collect()
}

pub(crate) fn kinds(records: &[StreamRecord]) -> Vec<&str> {
    records.iter().map(|r| r.kind.as_str()).collect()
}

pub(crate) fn iracing_source() -> MemorySource {
    let src = MemorySource::new();
    src.set(
        "WeekendInfo",
        json!({
            "SeriesID": 231,
            "SessionID": 1001,
            "SubSessionID": 5005,
            "EventType": "Race",
            "TrackDisplayName": "Spa-Francorchamps",
            "TrackConfigName": "Grand Prix Pits",
        }),
    );
    src.set(
        "SessionInfo",
        json!({
            "Sessions": [
                {"SessionNum": 0, "SessionName": "PRACTICE"},
                {"SessionNum": 1, "SessionName": "RACE"},
            ]
        }),
    );
    src.set("SessionNum", json!(0));
    src.set(
        "SplitTimeInfo",
        json!({
            "Sectors": [
                {"SectorNum": 0, "SectorStartPct": 0.0},
                {"SectorNum": 1, "SectorStartPct": 0.33333},
                {"SectorNum": 2, "SectorStartPct": 0.71},
            ]
        }),
    );
    src.set("PlayerCarIdx", json!(1));
    src.set(
        "DriverInfo",
        json!({
            "Drivers": [
                {"CarIdx": 0, "CarNumber": "7", "UserName": "Ana Silva", "CarID": 132, "CarClassID": 4029,
                 "TeamName": "Silva Racing", "IRating": 3120, "LicString": "A 4.20"},
                {"CarIdx": 1, "CarNumber": "12", "UserName": "Sam Berg", "CarID": 132, "CarClassID": 4029,
                 "TeamName": "Delta Motorsport", "IRating": 2450, "LicString": "B 3.10"},
                {"CarIdx": 2, "CarNumber": "99", "UserName": "Kim Lee", "CarID": 150, "CarClassID": 4030,
                 "TeamName": "Lee GT", "IRating": 1800, "LicString": "C 2.50"},
            ]
        }),
    );
    src.set("CarIdxPosition", json!([1, 2, 3]));
    src.set("CarIdxClassPosition", json!([1, 2, 1]));
    src.set("CarIdxLap", json!([5, 5, 4]));
    src.set("CarIdxLapDistPct", json!([0.51234, 0.40111, 0.9]));
    src.set("CarIdxOnPitRoad", json!([false, false, true]));
    src.set("CarIdxF2Time", json!([0.0, 3.4567, 61.2]));
    src.set("CarIdxLastLapTime", json!([138.512, 139.004, -1.0]));

    src.set("Lap", json!(0));
    src.set("LapLastLapTime", json!(-1.0));
    src.set("FuelLevel", json!(50.0));
    src.set("PlayerCarMyIncidentCount", json!(0));
    src.set("PlayerFastRepairsUsed", json!(0));
    src.set("PlayerCarTowTime", json!(0.0));
    src.set("OnPitRoad", json!(false));
    src.set("IsOnTrack", json!(true));
    src.set("IsOnTrackCar", json!(true));

    src.set("AirTemp", json!(21.43));
    src.set("TrackTempCrew", json!(30.08));
    src.set("WindVel", json!(2.5));
    src.set("WindDir", json!(0.0));
    src.set("TrackWetness", json!(1));
    src.set("Precipitation", json!(0.0));
    src.set("WeatherDeclaredWet", json!(false));

    for corner in ["LF", "RF", "LR", "RR"] {
        for side in ["L", "M", "R"] {
            src.set(&format!("{corner}tempC{side}"), json!(85.0));
            src.set(&format!("{corner}wear{side}"), json!(1.0));
        }
    }
    src
}
