use crate::registry::RegistryError;

/// Core error type for the link checker.
///
/// Adapter crates map their library errors into this type so the bot core can
/// report failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("intake error: {0}")]
    Intake(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
