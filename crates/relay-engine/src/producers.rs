//! Data-group producers and edge detectors.
//!
//! Each producer reads the snapshot, compares it against what was last sent
//! and emits only on change. Weather is the exception: it is always sent,
//! with separate events for the transitions worth calling out.

use std::collections::BTreeMap;

use analysis::{
    format_lap_time, project_fuel, round_to, track_wetness_label, tyre_corner, wind_direction, wind_label,
    wind_speed_kmh, RAD_TO_DEG,
};
use model::{CarRecord, InCarStatus, LapHistory, LapSummary, TyreBlock, TyreCorner, WeatherSnapshot};
use relay_core::source::{as_bool, as_f64, as_i64, field, field_i64, field_str};
use relay_core::{DataGroup, DataSource, RelayError, SourceError};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::context::EngineContext;
use crate::lifecycle::PlayerInfo;
use crate::state::CarEmission;

/// Keeps the source frozen for as long as it lives.
struct Frozen<'a>(&'a dyn DataSource);

impl<'a> Frozen<'a> {
    fn new(source: &'a dyn DataSource) -> Self {
        source.freeze_snapshot();
        Self(source)
    }
}

impl Drop for Frozen<'_> {
    fn drop(&mut self) {
        self.0.unfreeze_snapshot();
    }
}

fn slot<'a>(arr: &'a [Value], idx: usize, key: &str) -> Result<&'a Value, SourceError> {
    arr.get(idx).ok_or_else(|| SourceError::Missing(format!("{key}[{idx}]")))
}

fn drivers(source: &dyn DataSource) -> Result<Vec<Value>, SourceError> {
    let info = source.read_value("DriverInfo")?;
    match field(&info, "Drivers")? {
        Value::Array(list) => Ok(list.clone()),
        _ => Err(SourceError::Type { key: "DriverInfo.Drivers".into(), expected: "an array" }),
    }
}

struct Standings {
    cars: BTreeMap<String, CarRecord>,
    player: Option<PlayerInfo>,
}

fn read_standings(source: &dyn DataSource) -> Result<Standings, SourceError> {
    let frozen = Frozen::new(source);
    let drivers = drivers(source)?;
    let player_idx = source.read_i64("PlayerCarIdx")?;
    let position = source.read_array("CarIdxPosition")?;
    let class_position = source.read_array("CarIdxClassPosition")?;
    let laps = source.read_array("CarIdxLap")?;
    let dist = source.read_array("CarIdxLapDistPct")?;
    let on_pit = source.read_array("CarIdxOnPitRoad")?;
    let gap = source.read_array("CarIdxF2Time")?;
    let last_lap = source.read_array("CarIdxLastLapTime")?;
    drop(frozen);

    let mut cars = BTreeMap::new();
    let mut player = None;
    for d in &drivers {
        let idx = field_i64(d, "CarIdx")?;
        let i = usize::try_from(idx).map_err(|_| SourceError::Type { key: "CarIdx".into(), expected: "a slot index" })?;
        let i64_at = |arr: &[Value], key: &str| slot(arr, i, key).and_then(|v| as_i64(v, key));
        let f64_at = |arr: &[Value], key: &str| slot(arr, i, key).and_then(|v| as_f64(v, key));

        let car = CarRecord {
            car_index: idx,
            car_number: field_str(d, "CarNumber")?,
            user_name: field_str(d, "UserName")?,
            car_model_id: field_i64(d, "CarID")?,
            class_id: field_i64(d, "CarClassID")?,
            team_name: field_str(d, "TeamName")?,
            irating: field_i64(d, "IRating")?,
            license: field_str(d, "LicString")?,
            car_class_position: i64_at(&class_position, "CarIdxClassPosition")?,
            car_position: i64_at(&position, "CarIdxPosition")?,
            gap_leader: round_to(f64_at(&gap, "CarIdxF2Time")?, 3),
            distance_pct: round_to(f64_at(&dist, "CarIdxLapDistPct")?, 3),
            in_pit: slot(&on_pit, i, "CarIdxOnPitRoad").and_then(|v| as_bool(v, "CarIdxOnPitRoad"))?,
            lap: i64_at(&laps, "CarIdxLap")?,
            car_lap_last_time: format_lap_time(f64_at(&last_lap, "CarIdxLastLapTime").ok()),
        };
        if idx == player_idx {
            player = Some(PlayerInfo {
                car_model_id: Some(car.car_model_id),
                team_name: Some(car.team_name.clone()),
                car_number: Some(car.car_number.clone()),
            });
        }
        cars.insert(car.car_number.clone(), car);
    }
    Ok(Standings { cars, player })
}

fn player_name(source: &dyn DataSource) -> Result<String, SourceError> {
    let idx = source.read_i64("PlayerCarIdx")?;
    drivers(source)?
        .iter()
        .find(|d| field_i64(d, "CarIdx").ok() == Some(idx))
        .ok_or_else(|| SourceError::Missing(format!("DriverInfo.Drivers[CarIdx={idx}]")))
        .and_then(|d| field_str(d, "UserName"))
}

impl EngineContext {
    /// Runs one data group's producer.
    pub fn produce(&mut self, group: DataGroup) -> Result<(), RelayError> {
        if group == DataGroup::LapFinish {
            return self.post_lap(&[]);
        }
        self.count(group);
        match group {
            DataGroup::Relative => self.relative(),
            DataGroup::Weather => self.weather(),
            DataGroup::Incidents => self.incidents(),
            DataGroup::Tow => self.tow(),
            DataGroup::Tyres => self.tyres(),
            DataGroup::Pit => self.pit(),
            DataGroup::LapFinish => Ok(()),
        }
    }

    /// True exactly once per strict increase of the lap counter. A missing or
    /// zero lap never fires; a lower lap becomes the new baseline silently.
    pub fn lap_finished(&mut self) -> Result<bool, RelayError> {
        let lap = match self.source.read("Lap") {
            None | Some(Value::Null) => return Ok(false),
            Some(v) => as_i64(&v, "Lap")?,
        };
        if lap == 0 {
            return Ok(false);
        }
        let last = self.state.helpers.last_lap;
        if lap > last {
            self.state.helpers.last_lap = lap;
            return Ok(true);
        }
        if lap < last {
            debug!("lap counter went back from {last} to {lap}");
            self.state.helpers.last_lap = lap;
        }
        Ok(false)
    }

    /// The lap-finish job. On a finished lap: re-check the session, send fuel
    /// and the lap summary, then run the lap-triggered groups in order.
    pub fn post_lap(&mut self, lap_based: &[DataGroup]) -> Result<(), RelayError> {
        self.count(DataGroup::LapFinish);
        if !self.lap_finished()? {
            return Ok(());
        }
        info!("Lap {} finished.", self.state.helpers.last_lap);
        if let Err(e) = self.refresh_session() {
            error!("session check after lap failed: {e}");
        }
        if self.lap_finish_enabled {
            if let Err(e) = self.lap_fuel() {
                error!("lap fuel update failed: {e}");
            }
        }
        for &group in lap_based {
            if let Err(e) = self.produce(group) {
                error!("lap-triggered {} failed: {e}", group.name());
            }
        }
        Ok(())
    }

    fn lap_fuel(&mut self) -> Result<(), RelayError> {
        let fuel_level = self.source.read_f64("FuelLevel")?;
        let incidents = self.source.read_i64("PlayerCarMyIncidentCount")?;
        let driver_name = player_name(self.source.as_ref())?;

        let helpers = &mut self.state.helpers;
        let consumed = helpers.last_fuel_level.map(|last| last - fuel_level);
        helpers.last_fuel_level = Some(fuel_level);
        let summary = LapSummary {
            driver_name,
            fuel_consumed: round_to(consumed.unwrap_or(0.0), 2),
            incidents_incurred: incidents - helpers.last_lap_incident_count,
        };
        helpers.last_lap_incident_count = incidents;
        if let Some(delta) = consumed {
            self.state.fuel.push(delta);
        }
        self.defer_lap_history(summary);

        self.emitter.send("fuel", json!({ "fuel_level": round_to(fuel_level, 2) }))?;
        // no baseline yet: this lap only sets it
        if consumed.is_some() {
            self.emitter.send("fuel_analysis", project_fuel(fuel_level, &self.state.fuel))?;
        }
        Ok(())
    }

    /// The simulator publishes the last lap time a few seconds after the line.
    fn defer_lap_history(&self, summary: LapSummary) {
        let source = self.source.clone();
        let emitter = self.emitter.clone();
        self.deferred.schedule_once("lap_history", self.config.lap_history_delay, move || {
            let lap_time = source.read("LapLastLapTime").and_then(|v| v.as_f64());
            emitter.send("lap_history", LapHistory { summary, lap_time: format_lap_time(lap_time) })
        });
    }

    /// Relative standings: the first poll in full, afterwards changed fields
    /// per car number.
    pub fn relative(&mut self) -> Result<(), RelayError> {
        let standings = read_standings(self.source.as_ref())?;
        if let Some(player) = standings.player {
            self.session.set_player(player);
        }
        match self.state.cars.diff_cars(standings.cars) {
            Some(CarEmission::Full(cars)) => {
                let mut extra = Map::new();
                extra.insert("full_update".into(), json!(true));
                self.emitter.send_with("cars", &cars, extra)
            }
            Some(CarEmission::Changes(changes)) => self.emitter.send("cars", &changes),
            None => Ok(()),
        }
    }

    pub fn weather(&mut self) -> Result<(), RelayError> {
        let wind_rad = self.source.read_f64("WindDir")?;
        let (direction, _) = wind_direction(wind_rad * RAD_TO_DEG);
        let speed = wind_speed_kmh(self.source.read_f64("WindVel")?);
        let declared_wet = self.source.read_bool("WeatherDeclaredWet")?;
        let snapshot = WeatherSnapshot {
            air_temp: round_to(self.source.read_f64("AirTemp")?, 1),
            track_temp: round_to(self.source.read_f64("TrackTempCrew")?, 1),
            wind_speed: round_to(speed, 1),
            wind_direction: wind_label(wind_rad),
            track_wetness: track_wetness_label(self.source.read_i64("TrackWetness")?).to_string(),
            precipitation: round_to(self.source.read_f64("Precipitation")?, 1),
            declared_wet,
        };
        self.emitter.send("weather", &snapshot)?;
        for description in self.weather_transitions(declared_wet, direction, speed) {
            self.emitter.send_event("weather", description, Vec::new())?;
        }
        Ok(())
    }

    /// The first observation of each value is only stored.
    fn weather_transitions(&mut self, declared_wet: bool, direction: &str, speed: f64) -> Vec<String> {
        let h = &mut self.state.helpers;
        let mut events = Vec::new();

        if let Some(was_wet) = h.track_wet_state.replace(declared_wet) {
            if was_wet != declared_wet {
                events.push(format!("Track state changed - {}", if declared_wet { "Wet" } else { "Dry" }));
            }
        }
        if let Some(prev) = h.wind_direction.replace(direction.to_string()) {
            if prev != direction {
                events.push(format!("Wind direction changed from {prev} to {direction}"));
            }
        }
        match h.wind_speed_kmh {
            None => h.wind_speed_kmh = Some(speed),
            Some(prev) if (speed - prev).abs() > 5.0 => {
                events.push(format!("Wind speed changed significantly to {speed:.1} km/h"));
                h.wind_speed_kmh = Some(speed);
            }
            Some(_) => {}
        }
        events
    }

    fn corner(&self, prefix: &str) -> Result<TyreCorner, SourceError> {
        let read = |suffix: &str| self.source.read_f64(&format!("{prefix}{suffix}"));
        Ok(tyre_corner(
            [read("tempCL")?, read("tempCM")?, read("tempCR")?],
            [read("wearL")?, read("wearM")?, read("wearR")?],
        ))
    }

    /// Sent as one block whenever any corner value moved.
    pub fn tyres(&mut self) -> Result<(), RelayError> {
        let block = TyreBlock {
            front_left: self.corner("LF")?,
            front_right: self.corner("RF")?,
            rear_left: self.corner("LR")?,
            rear_right: self.corner("RR")?,
        };
        if self.state.tyres.as_ref() == Some(&block) {
            return Ok(());
        }
        self.emitter.send("tyres", &block)?;
        self.state.tyres = Some(block);
        Ok(())
    }

    /// Sends the increment, then the tyre block unconditionally.
    pub fn incidents(&mut self) -> Result<(), RelayError> {
        let current = self.source.read_i64("PlayerCarMyIncidentCount")?;
        let diff = current - self.state.helpers.incident_count;
        if diff <= 0 {
            return Ok(());
        }
        self.state.helpers.incident_count = current;
        self.emitter.send("incidents", diff)?;
        self.state.tyres = None;
        self.tyres()
    }

    pub fn fast_repair(&mut self) -> Result<(), RelayError> {
        let used = self.source.read_i64("PlayerFastRepairsUsed")?;
        let prev = std::mem::replace(&mut self.state.helpers.fast_repairs_used, used);
        if used > prev {
            self.emitter.send("fast_repair", 1)?;
        }
        Ok(())
    }

    pub fn tow(&mut self) -> Result<(), RelayError> {
        let tow_time = self.source.read_f64("PlayerCarTowTime")?;
        let towed = &mut self.state.helpers.being_towed;
        if tow_time > 0.0 && !*towed {
            *towed = true;
            info!("Being towed ({tow_time:.0}s).");
            self.emitter.send("tow", tow_time)
        } else if tow_time == 0.0 && *towed {
            *towed = false;
            self.emitter.send("tow", 0)
        } else {
            Ok(())
        }
    }

    /// Pit-lane edges. Leaving resets the fuel baseline before anything else
    /// so the next lap is measured from the refuelled level.
    pub fn pit(&mut self) -> Result<(), RelayError> {
        if let Err(e) = self.in_car() {
            warn!("in-car check failed: {e}");
        }
        let in_pit = self.source.read_bool("OnPitRoad")?;
        if in_pit == self.state.helpers.in_pit {
            return Ok(());
        }
        self.state.helpers.in_pit = in_pit;
        if in_pit {
            return self.emitter.send("pit_stop", "Entered the pit lane");
        }
        self.state.helpers.last_fuel_level = Some(self.source.read_f64("FuelLevel")?);
        self.fast_repair()?;
        self.emitter.send("pit_stop", "Left the pit lane")
    }

    pub fn in_car(&mut self) -> Result<(), RelayError> {
        let user_in_car = self.source.read_bool("IsOnTrack")?;
        if self.state.helpers.in_car == Some(user_in_car) {
            return Ok(());
        }
        let any_driver_in_car = self.source.read_bool("IsOnTrackCar").unwrap_or(user_in_car);
        self.state.helpers.in_car = Some(user_in_car);
        self.state.automation = self.state.automation.observe(user_in_car);
        self.emitter.send("in_car", InCarStatus { user_in_car, any_driver_in_car })
    }
}
