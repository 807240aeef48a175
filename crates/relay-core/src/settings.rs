//! Per data-group polling settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

pub const MIN_INTERVAL_S: u32 = 1;
pub const MAX_INTERVAL_S: u32 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataGroup {
    /// Lap rollover detection. Interval only: its interval is the polling
    /// cadence of the detector itself.
    LapFinish,
    Relative,
    Weather,
    Incidents,
    Tow,
    Tyres,
    Pit,
}

impl DataGroup {
    pub const ALL: [DataGroup; 7] = [
        DataGroup::LapFinish,
        DataGroup::Relative,
        DataGroup::Weather,
        DataGroup::Incidents,
        DataGroup::Tow,
        DataGroup::Tyres,
        DataGroup::Pit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataGroup::LapFinish => "lap_finish",
            DataGroup::Relative => "relative",
            DataGroup::Weather => "weather",
            DataGroup::Incidents => "incidents",
            DataGroup::Tow => "tow",
            DataGroup::Tyres => "tyres",
            DataGroup::Pit => "pit",
        }
    }

    pub fn default_config(self) -> GroupConfig {
        let interval = match self {
            DataGroup::LapFinish => 10,
            DataGroup::Relative => 5,
            DataGroup::Weather => 30,
            DataGroup::Incidents => 15,
            DataGroup::Tow => 15,
            DataGroup::Tyres => 20,
            DataGroup::Pit => 10,
        };
        GroupConfig { enabled: true, mode: GroupMode::Interval, interval }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupMode {
    #[default]
    Interval,
    Lap,
}

fn enabled_default() -> bool {
    true
}

fn interval_default() -> u32 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: GroupMode,
    /// seconds
    #[serde(default = "interval_default")]
    pub interval: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSettings {
    groups: BTreeMap<DataGroup, GroupConfig>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { groups: DataGroup::ALL.iter().map(|g| (*g, g.default_config())).collect() }
    }
}

impl DataSettings {
    pub fn empty() -> Self {
        Self { groups: BTreeMap::new() }
    }

    pub fn with(mut self, group: DataGroup, config: GroupConfig) -> Self {
        self.groups.insert(group, config);
        self
    }

    /// Stored config, or the group's default when the group is absent.
    pub fn get(&self, group: DataGroup) -> GroupConfig {
        self.groups.get(&group).copied().unwrap_or_else(|| group.default_config())
    }

    pub fn is_configured(&self, group: DataGroup) -> bool {
        self.groups.contains_key(&group)
    }

    /// Explicitly configured groups, in declaration order.
    pub fn configured(&self) -> impl Iterator<Item = (DataGroup, GroupConfig)> + '_ {
        self.groups.iter().map(|(g, c)| (*g, *c))
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        for (group, cfg) in &self.groups {
            if !(MIN_INTERVAL_S..=MAX_INTERVAL_S).contains(&cfg.interval) {
                return Err(RelayError::Settings(format!(
                    "{} interval {} outside {}..={}",
                    group.name(),
                    cfg.interval,
                    MIN_INTERVAL_S,
                    MAX_INTERVAL_S
                )));
            }
            if *group == DataGroup::LapFinish && cfg.mode == GroupMode::Lap {
                return Err(RelayError::Settings("lap_finish cannot be lap-triggered".into()));
            }
        }
        Ok(())
    }
}
