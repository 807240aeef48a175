use serde::{Deserialize, Serialize};

/// Discrete pit-service actions the simulator's control surface accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitAction {
    Clear,
    LeftFront,
    RightFront,
    LeftRear,
    RightRear,
    FastRepair,
    Windshield,
    ClearWindshield,
    ClearFastRepair,
    ClearFuel,
    /// parameterised with litres
    Fuel,
}

impl PitAction {
    /// Command token for the simple actions; `None` for parameterised ones.
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "lf" => Self::LeftFront,
            "rf" => Self::RightFront,
            "lr" => Self::LeftRear,
            "rr" => Self::RightRear,
            "fr" => Self::FastRepair,
            "ws" => Self::Windshield,
            "clear_ws" => Self::ClearWindshield,
            "clear_fr" => Self::ClearFastRepair,
            "clear_fuel" => Self::ClearFuel,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_table() {
        assert_eq!(PitAction::from_token("lf"), Some(PitAction::LeftFront));
        assert_eq!(PitAction::from_token("clear_fuel"), Some(PitAction::ClearFuel));
        assert_eq!(PitAction::from_token("fuel.20"), None);
        assert_eq!(PitAction::from_token("LF"), None);
    }
}
