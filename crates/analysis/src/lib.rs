//! Derived racing metrics computed from raw simulator fields.
//!
//! Everything here is a pure function of its inputs; the engine crate decides
//! when to call them and what to do with the result.

use std::collections::BTreeMap;

use model::*;
use serde::{Deserialize, Serialize};

pub const RAD_TO_DEG: f64 = 57.296;

const UNKNOWN_LAP_TIME: &str = "--:--.---";

pub fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

/// Compass label for a wind angle in degrees, plus the angle itself.
///
/// The compass is split into eight 45° slices centred on each point, so
/// the angle is shifted by half a slice before bucketing.
pub fn wind_direction(angle_deg: f64) -> (&'static str, f64) {
    let middle = (angle_deg + 22.5).rem_euclid(360.0);
    let label = if middle > 0.0 && middle < 45.0 {
        "North"
    } else if (45.0..90.0).contains(&middle) {
        "North-East"
    } else if (90.0..135.0).contains(&middle) {
        "East"
    } else if (135.0..180.0).contains(&middle) {
        "South-East"
    } else if (180.0..225.0).contains(&middle) {
        "South"
    } else if (225.0..270.0).contains(&middle) {
        "South-West"
    } else if (270.0..315.0).contains(&middle) {
        "West"
    } else if (315.0..360.0).contains(&middle) {
        "North-West"
    } else {
        "Unknown direction"
    };
    (label, angle_deg)
}

/// `"North-East (47.1°)"` style label used on weather records.
pub fn wind_label(wind_dir_rad: f64) -> String {
    let (label, angle) = wind_direction(wind_dir_rad * RAD_TO_DEG);
    format!("{label} ({angle:.1}°)")
}

pub fn wind_speed_kmh(wind_vel_mps: f64) -> f64 {
    wind_vel_mps * 3.6
}

pub fn track_wetness_label(level: i64) -> &'static str {
    match level {
        1 => "Dry",
        2 => "Mostly dry",
        3 => "Very lightly wet",
        4 => "Lightly wet",
        5 => "Moderately wet",
        6 => "Very wet",
        7 => "Extremely wet",
        _ => "Unknown wetness",
    }
}

/// Racing format `M:SS.mmm`. Missing, zero and negative times (the
/// simulator reports -1 for "no time") become `--:--.---`.
pub fn format_lap_time(time_s: Option<f64>) -> String {
    let t = match time_s {
        Some(t) if t > 0.0 && t.is_finite() => t,
        _ => return UNKNOWN_LAP_TIME.to_string(),
    };
    let total_ms = (t * 1000.0) as u64;
    let minutes = total_ms / 60_000;
    let rest = total_ms % 60_000;
    format!("{}:{:02}.{:03}", minutes, rest / 1000, rest % 1000)
}

/// Sector starts keyed by 1-based sector number, in percent of the lap.
pub fn split_sectors(sectors: &[(i64, f64)]) -> BTreeMap<u32, f64> {
    sectors
        .iter()
        .map(|&(num, start_pct)| ((num.max(0) + 1) as u32, round_to(start_pct * 100.0, 2)))
        .collect()
}

/// Carcass temperatures (left, middle, right) and wear fractions (0..1).
pub fn tyre_corner(temps: [f64; 3], wear: [f64; 3]) -> TyreCorner {
    TyreCorner {
        left_carcass_temp: round_to(temps[0], 1),
        middle_carcass_temp: round_to(temps[1], 1),
        right_carcass_temp: round_to(temps[2], 1),
        left_tread_remaining: round_to(wear[0] * 100.0, 1),
        middle_tread_remaining: round_to(wear[1] * 100.0, 1),
        right_tread_remaining: round_to(wear[2] * 100.0, 1),
    }
}

/// Fixed-size ring of lap-over-lap fuel deltas.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FuelBuffer {
    slots: Vec<f64>,
    len: usize,
    next: usize,
}

impl FuelBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { slots: vec![0.0; capacity.max(1)], len: 0, next: 0 }
    }

    pub fn push(&mut self, delta: f64) {
        self.slots[self.next] = delta;
        self.next = (self.next + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Most recent delta, 0 when nothing was recorded yet.
    pub fn last(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        let idx = (self.next + self.slots.len() - 1) % self.slots.len();
        self.slots[idx]
    }

    /// Mean over the recorded deltas only.
    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        let filled = if self.len < self.slots.len() { &self.slots[..self.len] } else { &self.slots[..] };
        filled.iter().sum::<f64>() / self.len as f64
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = 0.0);
        self.len = 0;
        self.next = 0;
    }
}

fn laps_on_fuel(fuel_left: f64, per_lap: f64) -> i64 {
    if per_lap <= 0.0 || fuel_left <= 0.0 {
        return 0;
    }
    (fuel_left / per_lap) as i64
}

fn per_lap_target(fuel_left: f64, laps: i64) -> f64 {
    if laps <= 0 {
        return 0.0;
    }
    fuel_left / laps as f64
}

/// Projects laps remaining from both the buffered mean and the last delta.
///
/// Non-positive consumption (no data yet, or a refuel between laps) yields
/// zero-valued projections.
pub fn project_fuel(fuel_left: f64, buffer: &FuelBuffer) -> FuelAnalysis {
    let avg = buffer.mean();
    let last = buffer.last();

    let laps_avg = laps_on_fuel(fuel_left, avg);
    let (oml, oll) = if laps_avg > 0 { (laps_avg + 1, laps_avg - 1) } else { (0, 0) };
    let laps_last = laps_on_fuel(fuel_left, last);

    FuelAnalysis {
        fuel_left: round_to(fuel_left, 2),
        average_consumption: round_to(avg, 3),
        target_laps_avg: laps_avg,
        target_laps_avg_consumption: round_to(per_lap_target(fuel_left, laps_avg), 3),
        ollavg: oll,
        ollavg_consumption_target: round_to(per_lap_target(fuel_left, oll), 3),
        omlavg: oml,
        omlavg_consumption_target: round_to(per_lap_target(fuel_left, oml), 3),
        last_lap_consumption: round_to(last, 3),
        target_laps_last: laps_last,
        target_laps_last_consumption: round_to(per_lap_target(fuel_left, laps_last), 3),
    }
}
