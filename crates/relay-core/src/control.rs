//! Lobby service that issues and revokes stream tokens.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RelayError;

/// Only a UI switch; never forwarded as a pit-stop capability.
pub const REMOTE_PIT_CONTROL_FLAG: &str = "remote_pit_control_enabled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyRequest {
    pub lobby_name: String,
    pub passcode: String,
    #[serde(default)]
    pub pit_stop_settings: BTreeMap<String, bool>,
}

impl LobbyRequest {
    /// Whether the lobby accepts any remote pit command and so needs the
    /// inbound command channel.
    pub fn wants_commands(&self) -> bool {
        self.pit_stop_settings.iter().any(|(k, v)| *v && k != REMOTE_PIT_CONTROL_FLAG)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LobbyResponse {
    pub token: Option<String>,
    pub error: Option<String>,
}

pub trait ControlPlane: Send + Sync {
    fn create_session(&self, req: &LobbyRequest) -> Result<LobbyResponse, RelayError>;
    fn join_session(&self, req: &LobbyRequest) -> Result<LobbyResponse, RelayError>;
    /// `RelayError::Conflict` when another client already streams to the
    /// lobby, `RelayError::Validation` for any other rejection.
    fn validate_streaming(&self, token: &str) -> Result<(), RelayError>;
    fn release_session(&self, token: &str) -> Result<(), RelayError>;
}

#[derive(Default)]
struct Lobbies {
    passcodes: HashMap<String, String>,
    tokens: HashMap<String, String>,
    streaming: HashSet<String>,
}

/// Control plane kept entirely in process memory.
#[derive(Default)]
pub struct MemoryControlPlane {
    inner: Mutex<Lobbies>,
    releases: AtomicUsize,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_streaming(&self, lobby: &str) -> bool {
        self.inner.lock().streaming.contains(lobby)
    }

    fn issue(lobbies: &mut Lobbies, lobby: &str) -> LobbyResponse {
        let token = Uuid::new_v4().simple().to_string();
        lobbies.tokens.insert(token.clone(), lobby.to_string());
        LobbyResponse { token: Some(token), error: None }
    }
}

impl ControlPlane for MemoryControlPlane {
    fn create_session(&self, req: &LobbyRequest) -> Result<LobbyResponse, RelayError> {
        let mut lobbies = self.inner.lock();
        if lobbies.passcodes.contains_key(&req.lobby_name) {
            return Err(RelayError::Validation(format!("lobby {} already exists", req.lobby_name)));
        }
        lobbies.passcodes.insert(req.lobby_name.clone(), req.passcode.clone());
        Ok(Self::issue(&mut lobbies, &req.lobby_name))
    }

    fn join_session(&self, req: &LobbyRequest) -> Result<LobbyResponse, RelayError> {
        let mut lobbies = self.inner.lock();
        match lobbies.passcodes.get(&req.lobby_name) {
            Some(p) if *p == req.passcode => Ok(Self::issue(&mut lobbies, &req.lobby_name)),
            Some(_) => Err(RelayError::Validation("wrong passcode".into())),
            None => Err(RelayError::Validation(format!("lobby {} does not exist", req.lobby_name))),
        }
    }

    fn validate_streaming(&self, token: &str) -> Result<(), RelayError> {
        let mut lobbies = self.inner.lock();
        let lobby = lobbies
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| RelayError::Validation("unknown token".into()))?;
        if !lobbies.streaming.insert(lobby) {
            return Err(RelayError::Conflict);
        }
        Ok(())
    }

    fn release_session(&self, token: &str) -> Result<(), RelayError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        let mut lobbies = self.inner.lock();
        if let Some(lobby) = lobbies.tokens.get(token).cloned() {
            lobbies.streaming.remove(&lobby);
        }
        Ok(())
    }
}
