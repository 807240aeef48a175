//! Everything one streaming run needs, bundled so scheduled jobs can share it.
//!
//! Only scheduler jobs lock the context. The heartbeat thread and the command
//! path never do, which keeps the differential state single-writer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use analysis::split_sectors;
use model::SessionIdentity;
use parking_lot::Mutex;
use relay_core::source::{field, field_f64, field_i64, field_str};
use relay_core::{DataGroup, DataSettings, DataSource, GroupMode, RelayError, SourceError};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::emitter::Emitter;
use crate::lifecycle::{SessionChange, SessionTracker};
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::state::DifferentialState;

pub type SharedContext = Arc<Mutex<EngineContext>>;

pub struct EngineContext {
    pub(crate) source: Arc<dyn DataSource>,
    pub(crate) emitter: Emitter,
    pub(crate) state: DifferentialState,
    pub(crate) session: SessionTracker,
    pub(crate) config: EngineConfig,
    pub(crate) deferred: SchedulerHandle,
    /// when off, laps are still detected but fuel and lap summaries are not sent
    pub(crate) lap_finish_enabled: bool,
    invocations: BTreeMap<DataGroup, usize>,
}

impl EngineContext {
    pub fn new(source: Arc<dyn DataSource>, emitter: Emitter, deferred: SchedulerHandle, config: EngineConfig) -> Self {
        Self {
            source,
            emitter,
            state: DifferentialState::new(config.fuel_window, config.car_ttl_polls),
            session: SessionTracker::default(),
            config,
            deferred,
            lap_finish_enabled: true,
            invocations: BTreeMap::new(),
        }
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> &DifferentialState {
        &self.state
    }

    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    /// How many times a group's producer ran; `LapFinish` counts lap checks.
    pub fn invocations(&self, group: DataGroup) -> usize {
        self.invocations.get(&group).copied().unwrap_or(0)
    }

    pub(crate) fn count(&mut self, group: DataGroup) {
        *self.invocations.entry(group).or_default() += 1;
    }

    /// Drops all derived state and the stored session, for a fresh run.
    pub fn reset(&mut self) {
        self.state.reset();
        self.session.clear();
        self.invocations.clear();
    }

    /// Reads the session identity and reacts to a change: a new session wipes
    /// the differential state and is announced with `reset=true`, a new
    /// session type is announced without a reset.
    pub fn refresh_session(&mut self) -> Result<SessionChange, RelayError> {
        let identity = read_identity(self.source.as_ref())?;
        let change = self.session.observe(identity);
        let Some(record) = self.session.record() else {
            return Ok(change);
        };
        match change {
            SessionChange::NewSession => {
                // the lap that triggered the check must not fire again
                let last_lap = self.state.helpers.last_lap;
                self.state.reset();
                self.state.helpers.last_lap = last_lap;
                let mut extra = Map::new();
                extra.insert("reset".into(), json!(true));
                self.emitter.send_with("session_info", &record, extra)?;
            }
            SessionChange::TypeChanged => self.emitter.send("session_info", &record)?,
            SessionChange::Unchanged => {}
        }
        Ok(change)
    }

    /// Called once when ingestion starts: announce the session, then take the
    /// fuel baseline the first lap is measured against.
    pub(crate) fn begin_ingestion(&mut self) -> Result<(), RelayError> {
        self.refresh_session()?;
        self.state.helpers.last_fuel_level = self.source.read_f64("FuelLevel").ok();
        debug!("fuel baseline {:?}", self.state.helpers.last_fuel_level);
        Ok(())
    }
}

fn read_identity(source: &dyn DataSource) -> Result<SessionIdentity, SourceError> {
    let weekend = source.read_value("WeekendInfo")?;
    let event_type = field_str(&weekend, "EventType")?;
    let session_type = session_name(source).unwrap_or_else(|| event_type.clone());

    let sectors = match source.read("SplitTimeInfo") {
        Some(info) => match info.get("Sectors").and_then(Value::as_array) {
            Some(list) => list
                .iter()
                .map(|s| Ok((field_i64(s, "SectorNum")?, field_f64(s, "SectorStartPct")?)))
                .collect::<Result<Vec<_>, SourceError>>()?,
            None => Vec::new(),
        },
        None => Vec::new(),
    };

    Ok(SessionIdentity {
        series_id: field_i64(&weekend, "SeriesID")?,
        session_id: field_i64(&weekend, "SessionID")?,
        subsession_id: field_i64(&weekend, "SubSessionID")?,
        event_type,
        session_type,
        track_name: field_str(&weekend, "TrackDisplayName")?,
        track_config: field_str(&weekend, "TrackConfigName").unwrap_or_default(),
        split_time_info: split_sectors(&sectors),
        ..Default::default()
    })
}

/// Name of the running session (`PRACTICE`, `QUALIFY`, `RACE`...).
fn session_name(source: &dyn DataSource) -> Option<String> {
    let num = source.read_i64("SessionNum").ok()?;
    let info = source.read("SessionInfo")?;
    let sessions = field(&info, "Sessions").ok()?.as_array()?;
    sessions
        .iter()
        .find(|s| field_i64(s, "SessionNum").ok() == Some(num))
        .and_then(|s| field_str(s, "SessionName").ok())
}

/// Registers one job per enabled interval group plus the lap-finish check,
/// which wraps the lap-triggered groups.
///
/// Only explicitly configured groups are polled; `lap_finish` falls back to
/// its default when absent, so lap detection always runs. Groups are taken in
/// `DataGroup` declaration order, not in the order the settings list them, and
/// lap-triggered groups run in that same order.
pub fn schedule_data_ingestion(
    ctx: &SharedContext,
    scheduler: &Scheduler,
    token: &str,
    settings: &DataSettings,
) -> Result<(), RelayError> {
    settings.validate()?;
    let lap = settings.get(DataGroup::LapFinish);
    {
        let mut c = ctx.lock();
        c.emitter.token().set(token);
        c.lap_finish_enabled = lap.enabled;
        c.begin_ingestion()?;
    }

    let mut lap_based = Vec::new();
    for (group, cfg) in settings.configured() {
        if !cfg.enabled || group == DataGroup::LapFinish {
            continue;
        }
        match cfg.mode {
            GroupMode::Lap => lap_based.push(group),
            GroupMode::Interval => {
                let ctx = ctx.clone();
                scheduler.schedule_interval(group.name(), Duration::from_secs(cfg.interval.into()), move || {
                    ctx.lock().produce(group)
                });
            }
        }
    }

    info!(
        "ingestion scheduled: lap check every {}s, {} lap-triggered group(s)",
        lap.interval,
        lap_based.len()
    );
    let ctx = ctx.clone();
    scheduler.schedule_interval(DataGroup::LapFinish.name(), Duration::from_secs(lap.interval.into()), move || {
        ctx.lock().post_lap(&lap_based)
    });
    Ok(())
}
