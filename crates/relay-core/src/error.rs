#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("key {0} is not present in the snapshot")]
    Missing(String),
    #[error("key {key} is not {expected}")]
    Type { key: String, expected: &'static str },
    #[error("simulator is not connected")]
    NotConnected,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("lobby is currently being streamed to")]
    Conflict,
    #[error("failed to validate streaming token: {0}")]
    Validation(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("invalid settings: {0}")]
    Settings(String),
    #[error("gave up waiting for the simulator")]
    Aborted,
    #[error("no stream token, refusing to send")]
    MissingToken,
    #[error("{0}")]
    Msg(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
