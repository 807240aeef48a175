use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One envelope on the outbound stream.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct StreamRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub token: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct CarRecord {
    pub car_index: i64,
    pub car_number: String,
    pub user_name: String,
    pub car_model_id: i64,
    pub class_id: i64,
    pub team_name: String,
    pub irating: i64,
    pub license: String,
    pub car_class_position: i64,
    pub car_position: i64,
    pub gap_leader: f64,
    pub distance_pct: f64,
    pub in_pit: bool,
    pub lap: i64,
    pub car_lap_last_time: String,
}

impl CarRecord {
    /// Field-name to value view used for per-field diffs.
    pub fn fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TyreCorner {
    pub left_carcass_temp: f64,
    pub middle_carcass_temp: f64,
    pub right_carcass_temp: f64,
    pub left_tread_remaining: f64,
    pub middle_tread_remaining: f64,
    pub right_tread_remaining: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TyreBlock {
    pub front_left: TyreCorner,
    pub front_right: TyreCorner,
    pub rear_left: TyreCorner,
    pub rear_right: TyreCorner,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct WeatherSnapshot {
    pub air_temp: f64,
    pub track_temp: f64,
    pub wind_speed: f64,
    pub wind_direction: String,
    pub track_wetness: String,
    pub precipitation: f64,
    pub declared_wet: bool,
}

/// Identity of a race session plus the player fields that ride along on
/// every `session_info` record.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SessionIdentity {
    pub series_id: i64,
    pub session_id: i64,
    pub subsession_id: i64,
    pub event_type: String,
    pub session_type: String,
    pub track_name: String,
    pub track_config: String,
    /// sector number (1-based) -> start of sector in percent of the lap
    pub split_time_info: BTreeMap<u32, f64>,
    pub car_model_id: Option<i64>,
    pub team_name: Option<String>,
    pub player_car_number: Option<String>,
}

impl SessionIdentity {
    /// True when any field that distinguishes one session from another differs.
    pub fn differs_from(&self, other: &SessionIdentity) -> bool {
        self.series_id != other.series_id
            || self.session_id != other.session_id
            || self.subsession_id != other.subsession_id
            || self.track_name != other.track_name
            || self.track_config != other.track_config
            || self.event_type != other.event_type
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct FuelAnalysis {
    pub fuel_left: f64,
    pub average_consumption: f64,
    pub target_laps_avg: i64,
    pub target_laps_avg_consumption: f64,
    /// one lap less than the average projection
    pub ollavg: i64,
    pub ollavg_consumption_target: f64,
    /// one lap more than the average projection
    pub omlavg: i64,
    pub omlavg_consumption_target: f64,
    pub last_lap_consumption: f64,
    pub target_laps_last: i64,
    pub target_laps_last_consumption: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LapSummary {
    pub driver_name: String,
    pub fuel_consumed: f64,
    pub incidents_incurred: i64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LapHistory {
    #[serde(flatten)]
    pub summary: LapSummary,
    pub lap_time: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct InCarStatus {
    pub user_in_car: bool,
    pub any_driver_in_car: bool,
}
