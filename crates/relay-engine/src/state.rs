//! Last-sent values and edge-detection scratch state.
//!
//! Only the job-runner thread touches this, through the engine context lock.

use std::collections::BTreeMap;

use analysis::FuelBuffer;
use model::{CarRecord, TyreBlock};
use serde_json::{Map, Value};

use crate::lifecycle::AutomationState;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputationHelpers {
    pub last_lap: i64,
    pub last_fuel_level: Option<f64>,
    pub in_pit: bool,
    pub incident_count: i64,
    pub last_lap_incident_count: i64,
    pub fast_repairs_used: i64,
    pub being_towed: bool,
    pub track_wet_state: Option<bool>,
    pub wind_direction: Option<String>,
    pub wind_speed_kmh: Option<f64>,
    pub in_car: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CarEmission {
    /// first snapshot, every car in full
    Full(BTreeMap<String, CarRecord>),
    /// car number -> changed fields only
    Changes(BTreeMap<String, Map<String, Value>>),
}

#[derive(Debug, Clone)]
struct TrackedCar {
    record: CarRecord,
    missed_polls: u32,
}

/// Relative standings keyed by car number.
#[derive(Debug, Clone, Default)]
pub struct CarStore {
    cars: BTreeMap<String, TrackedCar>,
    ttl_polls: u32,
}

impl CarStore {
    pub fn new(ttl_polls: u32) -> Self {
        Self { cars: BTreeMap::new(), ttl_polls }
    }

    pub fn len(&self) -> usize {
        self.cars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }

    pub fn get(&self, car_number: &str) -> Option<&CarRecord> {
        self.cars.get(car_number).map(|c| &c.record)
    }

    pub fn clear(&mut self) {
        self.cars.clear();
    }

    /// Diffs a fresh poll against the stored cars and stores it.
    ///
    /// The first non-empty poll is returned in full. Later polls return only
    /// the fields that changed per car; a car the store does not know is
    /// returned whole. `None` when nothing changed.
    pub fn diff_cars(&mut self, new_cars: BTreeMap<String, CarRecord>) -> Option<CarEmission> {
        if self.cars.is_empty() {
            if new_cars.is_empty() {
                return None;
            }
            self.cars = new_cars
                .iter()
                .map(|(num, rec)| (num.clone(), TrackedCar { record: rec.clone(), missed_polls: 0 }))
                .collect();
            return Some(CarEmission::Full(new_cars));
        }

        let mut changed = BTreeMap::new();
        for (num, rec) in &new_cars {
            let fields = rec.fields();
            let delta = match self.cars.get(num) {
                Some(prev) => {
                    let before = prev.record.fields();
                    fields.into_iter().filter(|(k, v)| before.get(k) != Some(v)).collect::<Map<_, _>>()
                }
                None => fields,
            };
            if !delta.is_empty() {
                changed.insert(num.clone(), delta);
            }
            self.cars.insert(num.clone(), TrackedCar { record: rec.clone(), missed_polls: 0 });
        }
        self.evict_missing(&new_cars);

        if changed.is_empty() {
            None
        } else {
            Some(CarEmission::Changes(changed))
        }
    }

    fn evict_missing(&mut self, seen: &BTreeMap<String, CarRecord>) {
        if self.ttl_polls == 0 {
            return;
        }
        let ttl = self.ttl_polls;
        for (num, car) in self.cars.iter_mut() {
            if !seen.contains_key(num) {
                car.missed_polls += 1;
            }
        }
        self.cars.retain(|_, c| c.missed_polls < ttl);
    }
}

/// Everything the engine remembers between polls of one session.
#[derive(Debug, Clone)]
pub struct DifferentialState {
    pub cars: CarStore,
    pub tyres: Option<TyreBlock>,
    pub helpers: ComputationHelpers,
    pub fuel: FuelBuffer,
    pub automation: AutomationState,
}

impl DifferentialState {
    pub fn new(fuel_window: usize, car_ttl_polls: u32) -> Self {
        Self {
            cars: CarStore::new(car_ttl_polls),
            tyres: None,
            helpers: ComputationHelpers::default(),
            fuel: FuelBuffer::new(fuel_window),
            automation: AutomationState::AwaitingSimulator,
        }
    }

    /// Forget everything derived from the previous session.
    pub fn reset(&mut self) {
        self.cars.clear();
        self.tyres = None;
        self.helpers = ComputationHelpers::default();
        self.fuel.clear();
        self.automation = AutomationState::AwaitingSimulator;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn car(num: &str, pos: i64, lap: i64) -> CarRecord {
        CarRecord {
            car_index: pos,
            car_number: num.into(),
            user_name: format!("Driver {num}"),
            car_model_id: 1,
            class_id: 2,
            team_name: "Team".into(),
            irating: 2000,
            license: "A 4.99".into(),
            car_class_position: pos,
            car_position: pos,
            gap_leader: 0.0,
            distance_pct: 0.5,
            in_pit: false,
            lap,
            car_lap_last_time: "1:30.000".into(),
        }
    }

    fn poll(cars: &[CarRecord]) -> BTreeMap<String, CarRecord> {
        cars.iter().map(|c| (c.car_number.clone(), c.clone())).collect()
    }

    #[test]
    fn first_poll_is_full_update() {
        let mut store = CarStore::new(0);
        assert_eq!(store.diff_cars(BTreeMap::new()), None);
        match store.diff_cars(poll(&[car("7", 1, 3), car("12", 2, 3)])) {
            Some(CarEmission::Full(cars)) => assert_eq!(cars.len(), 2),
            other => panic!("expected full update, got {other:?}"),
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn later_polls_send_only_changed_fields() {
        let mut store = CarStore::new(0);
        store.diff_cars(poll(&[car("7", 1, 3), car("12", 2, 3)]));

        let mut moved = car("7", 2, 4);
        moved.distance_pct = 0.1;
        let emission = store.diff_cars(poll(&[moved, car("12", 2, 3)]));
        let Some(CarEmission::Changes(changes)) = emission else {
            panic!("expected changes");
        };
        assert_eq!(changes.len(), 1);
        let seven = &changes["7"];
        assert_eq!(seven.len(), 5);
        assert_eq!(seven["lap"], json!(4));
        assert_eq!(seven["car_position"], json!(2));
        assert_eq!(seven["car_class_position"], json!(2));
        assert_eq!(seven["car_index"], json!(2));
        assert_eq!(seven["distance_pct"], json!(0.1));
        assert_eq!(store.get("7").map(|c| c.lap), Some(4));
    }

    #[test]
    fn unchanged_poll_emits_nothing() {
        let mut store = CarStore::new(0);
        store.diff_cars(poll(&[car("7", 1, 3)]));
        assert_eq!(store.diff_cars(poll(&[car("7", 1, 3)])), None);
    }

    #[test]
    fn new_car_is_sent_whole() {
        let mut store = CarStore::new(0);
        store.diff_cars(poll(&[car("7", 1, 3)]));
        let Some(CarEmission::Changes(changes)) = store.diff_cars(poll(&[car("7", 1, 3), car("99", 2, 1)])) else {
            panic!("expected changes");
        };
        assert_eq!(changes["99"].len(), car("99", 2, 1).fields().len());
    }

    #[test]
    fn missing_cars_are_kept_without_ttl() {
        let mut store = CarStore::new(0);
        store.diff_cars(poll(&[car("7", 1, 3), car("12", 2, 3)]));
        for _ in 0..50 {
            store.diff_cars(poll(&[car("7", 1, 3)]));
        }
        assert!(store.get("12").is_some());
    }

    #[test]
    fn missing_cars_expire_and_return_as_new() {
        let mut store = CarStore::new(3);
        store.diff_cars(poll(&[car("7", 1, 3), car("12", 2, 3)]));
        store.diff_cars(poll(&[car("7", 1, 3)]));
        store.diff_cars(poll(&[car("7", 1, 3)]));
        assert!(store.get("12").is_some());
        store.diff_cars(poll(&[car("7", 1, 3)]));
        assert!(store.get("12").is_none());

        let Some(CarEmission::Changes(changes)) = store.diff_cars(poll(&[car("7", 1, 3), car("12", 2, 3)])) else {
            panic!("expected changes");
        };
        assert_eq!(changes["12"].len(), car("12", 2, 3).fields().len());
    }

    #[test]
    fn reset_wipes_everything() {
        let mut state = DifferentialState::new(5, 0);
        state.cars.diff_cars(poll(&[car("7", 1, 3)]));
        state.tyres = Some(TyreBlock::default());
        state.helpers.last_lap = 9;
        state.helpers.being_towed = true;
        state.fuel.push(2.0);
        state.automation = AutomationState::InCar;
        state.reset();
        assert!(state.cars.is_empty());
        assert!(state.tyres.is_none());
        assert_eq!(state.helpers, ComputationHelpers::default());
        assert!(state.fuel.is_empty());
        assert_eq!(state.automation, AutomationState::AwaitingSimulator);
    }
}
