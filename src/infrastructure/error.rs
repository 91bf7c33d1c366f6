use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("decrypt error: {0}")]
    Decrypt(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key not decrypted: {0}")]
    NotDecrypted(String),
    #[error("missing key: {0}")]
    Missing(String),
}

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("read error: {0}")]
    Read(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("sequence failed after `{committed}` was committed: {message}")]
    Fatal { committed: String, message: String },
    #[error("a previous sequence failed half-way; reload required")]
    ReloadRequired,
    #[error("result no longer targets the active interaction")]
    Stale,
    #[error("unknown or already resolved confirmation token {0}")]
    UnknownConfirmation(u64),
    #[error("no draft event is active")]
    NoDraft,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// Shared in-process state became unusable, e.g. a poisoned lock.
    #[error("internal state error: {0}")]
    Internal(String),
}

impl InteractionError {
    /// Errors after which the draft stays in place so the user can retry.
    pub fn preserves_draft(&self) -> bool {
        matches!(self, Self::Key(_) | Self::Store(_) | Self::Read(_))
    }
}
