//! Race-session identity tracking and the player-in-car state machine.

use model::SessionIdentity;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    Unchanged,
    /// Same session, new session-type label (e.g. practice -> race).
    TypeChanged,
    /// Identity differs; everything derived from the old session is stale.
    NewSession,
}

/// Player fields carried on every `session_info` record. Learned from the
/// relative standings, kept across session changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerInfo {
    pub car_model_id: Option<i64>,
    pub team_name: Option<String>,
    pub car_number: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    current: Option<SessionIdentity>,
    player: PlayerInfo,
}

impl SessionTracker {
    pub fn current(&self) -> Option<&SessionIdentity> {
        self.current.as_ref()
    }

    pub fn player(&self) -> &PlayerInfo {
        &self.player
    }

    pub fn set_player(&mut self, player: PlayerInfo) {
        self.player = player;
    }

    /// Compares a freshly read identity against the stored one and stores it
    /// when it is new or only its session type moved.
    pub fn observe(&mut self, identity: SessionIdentity) -> SessionChange {
        let change = match &self.current {
            None => SessionChange::NewSession,
            Some(prev) if prev.differs_from(&identity) => SessionChange::NewSession,
            Some(prev) if prev.session_type != identity.session_type => SessionChange::TypeChanged,
            Some(_) => SessionChange::Unchanged,
        };
        match change {
            SessionChange::NewSession => {
                info!("New session: {} - {}", identity.track_name, identity.event_type);
                self.current = Some(identity);
            }
            SessionChange::TypeChanged => {
                info!("Session changed to: {}", identity.session_type);
                self.current = Some(identity);
            }
            SessionChange::Unchanged => {}
        }
        change
    }

    /// Stored identity with the player fields filled in, as emitted.
    pub fn record(&self) -> Option<SessionIdentity> {
        self.current.clone().map(|mut s| {
            s.car_model_id = self.player.car_model_id;
            s.team_name = self.player.team_name.clone();
            s.player_car_number = self.player.car_number.clone();
            s
        })
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

/// Where the player is relative to the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutomationState {
    #[default]
    AwaitingSimulator,
    OutOfCar,
    InCar,
}

impl AutomationState {
    pub fn observe(self, user_in_car: bool) -> AutomationState {
        let next = if user_in_car { AutomationState::InCar } else { AutomationState::OutOfCar };
        if next != self {
            info!("automation state {:?} -> {:?}", self, next);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spa() -> SessionIdentity {
        SessionIdentity {
            series_id: 10,
            session_id: 20,
            subsession_id: 30,
            event_type: "Race".into(),
            session_type: "PRACTICE".into(),
            track_name: "Spa".into(),
            track_config: "Grand Prix Pits".into(),
            ..Default::default()
        }
    }

    #[test]
    fn first_identity_is_a_new_session() {
        let mut t = SessionTracker::default();
        assert_eq!(t.observe(spa()), SessionChange::NewSession);
        assert_eq!(t.observe(spa()), SessionChange::Unchanged);
    }

    #[test]
    fn track_change_is_new_session_type_change_is_not() {
        let mut t = SessionTracker::default();
        t.observe(spa());

        let mut race = spa();
        race.session_type = "RACE".into();
        assert_eq!(t.observe(race), SessionChange::TypeChanged);
        assert_eq!(t.current().map(|s| s.session_type.as_str()), Some("RACE"));

        let mut monza = spa();
        monza.track_name = "Monza".into();
        assert_eq!(t.observe(monza), SessionChange::NewSession);
        assert_eq!(t.current().map(|s| s.track_name.as_str()), Some("Monza"));
    }

    #[test]
    fn record_carries_player_fields() {
        let mut t = SessionTracker::default();
        assert!(t.record().is_none());
        t.observe(spa());
        t.set_player(PlayerInfo { car_model_id: Some(132), team_name: Some("Delta".into()), car_number: Some("7".into()) });
        let rec = t.record().unwrap();
        assert_eq!(rec.car_model_id, Some(132));
        assert_eq!(rec.player_car_number.as_deref(), Some("7"));
        assert!(!rec.differs_from(&spa()));
    }

    #[test]
    fn automation_follows_in_car_flag() {
        let s = AutomationState::default();
        assert_eq!(s, AutomationState::AwaitingSimulator);
        let s = s.observe(false);
        assert_eq!(s, AutomationState::OutOfCar);
        assert_eq!(s.observe(true), AutomationState::InCar);
    }
}
