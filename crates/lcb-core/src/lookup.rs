//! Lookup port: resolving a link against the remote platform.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Closed set of lookup failures.
///
/// Adapters map every library error into one of these kinds. The validator decides
/// what each kind means for classification; `Unknown` is invalid by policy.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("invite link has expired")]
    InviteExpired,

    #[error("invite link is invalid")]
    InviteInvalid,

    #[error("channel is private or inaccessible")]
    ChannelPrivate,

    #[error("malformed link: {0}")]
    Malformed(String),

    #[error("username not found: {0}")]
    UsernameNotFound(String),

    #[error("flood wait: retry after {}s", .0.as_secs())]
    FloodWait(Duration),

    #[error("lookup failed: {0}")]
    Unknown(String),
}

impl LookupError {
    /// Errors that prove the link is dead; never retried.
    pub fn is_dead_link(&self) -> bool {
        matches!(
            self,
            Self::InviteExpired
                | Self::InviteInvalid
                | Self::ChannelPrivate
                | Self::Malformed(_)
                | Self::UsernameNotFound(_)
        )
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InviteExpired => "InviteExpired",
            Self::InviteInvalid => "InviteInvalid",
            Self::ChannelPrivate => "ChannelPrivate",
            Self::Malformed(_) => "Malformed",
            Self::UsernameNotFound(_) => "UsernameNotFound",
            Self::FloodWait(_) => "FloodWait",
            Self::Unknown(_) => "Unknown",
        }
    }
}

pub type LookupResult = std::result::Result<(), LookupError>;

/// An open lookup session.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Resolve one link. `Ok(())` means the link points at something live.
    async fn resolve(&self, link: &str) -> LookupResult;

    /// Release the session (persist state, disconnect). Called once per run.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens lookup sessions; one per validation run.
#[async_trait]
pub trait ResolverConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LinkResolver>>;
}
