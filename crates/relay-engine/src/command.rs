//! Remote pit commands arriving on the inbound channel.
//!
//! Runs on whatever thread the transport delivers on. It only touches the
//! simulator's control surface and the emitter, never the differential state.

use std::sync::Arc;

use relay_core::{CommandHandler, DataSource, PitAction};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::emitter::Emitter;

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    command: String,
}

/// `{"command": "lf rf"}` or the raw text itself.
fn command_string(text: &str) -> String {
    match serde_json::from_str::<Envelope>(text) {
        Ok(env) => env.command,
        Err(_) => text.to_string(),
    }
}

/// Integer after the first dot: `fuel.50` -> 50.
fn parameter(token: &str) -> Option<i32> {
    token.split('.').nth(1)?.parse().ok()
}

pub struct CommandDispatcher {
    source: Arc<dyn DataSource>,
    emitter: Emitter,
}

impl CommandDispatcher {
    pub fn new(source: Arc<dyn DataSource>, emitter: Emitter) -> Self {
        Self { source, emitter }
    }

    /// Clears pending pit commands, then applies every recognised token in
    /// order. Returns the applied action names, `clear` first.
    pub fn execute(&self, payload: &[u8]) -> Vec<String> {
        let text = match std::str::from_utf8(payload) {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to decode command payload: {e}");
                return Vec::new();
            }
        };
        let command = command_string(text);

        if let Err(e) = self.source.issue_pit_command(PitAction::Clear, None) {
            error!("Could not clear pit commands, dropping {command:?}: {e}");
            return Vec::new();
        }
        let mut executed = vec!["clear".to_string()];

        for token in command.split_whitespace() {
            if let Some(action) = PitAction::from_token(token) {
                self.apply(action, None, token.to_string(), &mut executed);
            } else if token.contains("fuel") {
                match parameter(token) {
                    Some(litres) => self.apply(PitAction::Fuel, Some(litres), format!("fuel.{litres}"), &mut executed),
                    None => error!("Invalid fuel command: {token}"),
                }
            } else if token.contains("tc") {
                match parameter(token) {
                    Some(tc) => warn!("TC command not yet implemented: {tc}"),
                    None => error!("Invalid tyre change command: {token}"),
                }
            } else {
                warn!("Unknown command: {token}");
            }
        }

        let summary = executed.join(", ");
        info!("Pit commands executed: {summary}");
        if let Err(e) = self.emitter.send_event("command", format!("Executed commands: {summary}"), executed.clone()) {
            error!("could not report executed commands: {e}");
        }
        executed
    }

    fn apply(&self, action: PitAction, param: Option<i32>, name: String, executed: &mut Vec<String>) {
        match self.source.issue_pit_command(action, param) {
            Ok(()) => executed.push(name),
            Err(e) => error!("Pit command {name} failed: {e}"),
        }
    }

    /// Adapter for [`CommandSubscriber::subscribe`](relay_core::CommandSubscriber::subscribe).
    pub fn handler(self: &Arc<Self>) -> CommandHandler {
        let dispatcher = self.clone();
        Arc::new(move |topic: &str, payload: &[u8]| {
            debug!("command on {topic} ({}B)", payload.len());
            dispatcher.execute(payload);
        })
    }
}
