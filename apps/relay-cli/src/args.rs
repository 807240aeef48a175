use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use relay_core::LobbyRequest;

/// Pit-stop capabilities offered to the lobby with `--pit-control`.
const PIT_CAPABILITIES: [&str; 4] = ["fuel", "tyres", "windshield", "fast_repair"];

/// Streams a recorded simulator session to a local lobby.
///
/// Records go to stdout as NDJSON unless `--out` is given; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Telemetry relay")]
pub struct CliArgs {
    /// Lobby to create and stream to.
    #[arg(long)]
    pub lobby: String,

    #[arg(long, default_value = "")]
    pub passcode: String,

    /// Recorded session (NDJSON frames).
    #[arg(long)]
    pub replay: PathBuf,

    /// Milliseconds each recorded frame stays current.
    #[arg(long, default_value_t = 1000)]
    pub frame_ms: u64,

    /// Data settings file, defaults to ~/.iremoteengineer/data_settings.json.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Write records here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Accept pit commands, one per stdin line.
    #[arg(long)]
    pub pit_control: bool,

    /// Log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl CliArgs {
    pub fn lobby_request(&self) -> LobbyRequest {
        let pit_stop_settings: BTreeMap<String, bool> =
            PIT_CAPABILITIES.iter().map(|c| (c.to_string(), self.pit_control)).collect();
        LobbyRequest { lobby_name: self.lobby.clone(), passcode: self.passcode.clone(), pit_stop_settings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pit_control_toggles_command_channel() {
        let args = CliArgs::try_parse_from(["relay", "--lobby", "gt sprint", "--replay", "spa.ndjson"]).unwrap();
        assert_eq!(args.frame_ms, 1000);
        assert!(!args.lobby_request().wants_commands());

        let args =
            CliArgs::try_parse_from(["relay", "--lobby", "gt sprint", "--replay", "spa.ndjson", "--pit-control"])
                .unwrap();
        assert!(args.lobby_request().wants_commands());
    }

    #[test]
    fn lobby_and_replay_are_required() {
        assert!(CliArgs::try_parse_from(["relay", "--lobby", "x"]).is_err());
        assert!(CliArgs::try_parse_from(["relay", "--replay", "x.ndjson"]).is_err());
    }
}
