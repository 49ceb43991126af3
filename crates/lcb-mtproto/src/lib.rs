//! MTProto user-session adapter for link lookups.
//!
//! The Bot API cannot inspect invite links, so lookups go through a regular user
//! account. The session file is created once with the `lcb-login` binary.

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use grammers_client::{Client, Config as ClientConfig, InitParams};
use grammers_mtsender::InvocationError;
use grammers_session::Session;
use grammers_tl_types as tl;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use lcb_core::{
    config::MtprotoSettings,
    errors::Error,
    link::{parse_link, LinkTarget},
    lookup::{LinkResolver, LookupError, LookupResult, ResolverConnector},
    Result,
};

/// Map an RPC error (name with the numeric suffix split off) to a lookup failure.
pub fn classify_rpc(name: &str, value: Option<u32>) -> LookupError {
    match (name, value) {
        ("INVITE_HASH_EXPIRED", _) => LookupError::InviteExpired,
        ("INVITE_HASH_INVALID" | "INVITE_HASH_EMPTY", _) => LookupError::InviteInvalid,
        ("CHANNEL_PRIVATE" | "CHANNEL_INVALID" | "CHANNEL_PUBLIC_GROUP_NA", _) => {
            LookupError::ChannelPrivate
        }
        ("USERNAME_INVALID", _) => LookupError::Malformed("invalid username".to_string()),
        ("USERNAME_NOT_OCCUPIED", _) => {
            LookupError::UsernameNotFound("username is not occupied".to_string())
        }
        ("FLOOD_WAIT" | "FLOOD_PREMIUM_WAIT" | "SLOWMODE_WAIT", Some(secs)) => {
            LookupError::FloodWait(Duration::from_secs(u64::from(secs)))
        }
        (other, Some(v)) => LookupError::Unknown(format!("{other}_{v}")),
        (other, None) => LookupError::Unknown(other.to_string()),
    }
}

fn classify_invocation(err: InvocationError) -> LookupError {
    match err {
        InvocationError::Rpc(rpc) => classify_rpc(&rpc.name, rpc.value),
        other => LookupError::Unknown(other.to_string()),
    }
}

/// Opens one authorized client per validation run.
///
/// Only one session is open at a time; a second run waits for the first to close.
pub struct MtprotoConnector {
    settings: MtprotoSettings,
    gate: Arc<Semaphore>,
}

impl MtprotoConnector {
    pub fn new(settings: MtprotoSettings) -> Self {
        Self {
            settings,
            gate: Arc::new(Semaphore::new(1)),
        }
    }
}

#[async_trait]
impl ResolverConnector for MtprotoConnector {
    async fn connect(&self) -> Result<Box<dyn LinkResolver>> {
        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::External(format!("session gate closed: {e}")))?;

        let session_file = self.settings.session_file.clone();
        let session = Session::load_file_or_create(&session_file)?;

        let client = Client::connect(ClientConfig {
            session,
            api_id: self.settings.api_id,
            api_hash: self.settings.api_hash.clone(),
            params: InitParams {
                // Flood waits are surfaced to the validator instead of slept on here.
                flood_sleep_threshold: 0,
                ..Default::default()
            },
        })
        .await
        .map_err(|e| Error::External(format!("failed to connect to Telegram: {e}")))?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| Error::External(format!("authorization check failed: {e}")))?;
        if !authorized {
            return Err(Error::Config(format!(
                "session {} is not logged in; run lcb-login first",
                session_file.display()
            )));
        }

        info!(session = %session_file.display(), "lookup session opened");
        Ok(Box::new(MtprotoResolver {
            client,
            session_file,
            _permit: permit,
        }))
    }
}

pub struct MtprotoResolver {
    client: Client,
    session_file: PathBuf,
    _permit: OwnedSemaphorePermit,
}

impl MtprotoResolver {
    async fn check_invite(&self, hash: String) -> LookupResult {
        self.client
            .invoke(&tl::functions::messages::CheckChatInvite { hash })
            .await
            .map(|_| ())
            .map_err(classify_invocation)
    }

    async fn check_username(&self, username: &str) -> LookupResult {
        match self.client.resolve_username(username).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(LookupError::UsernameNotFound(username.to_string())),
            Err(e) => Err(classify_invocation(e)),
        }
    }
}

#[async_trait]
impl LinkResolver for MtprotoResolver {
    async fn resolve(&self, link: &str) -> LookupResult {
        let target = parse_link(link)?;
        debug!(?target, "resolving");
        match target {
            LinkTarget::Invite(hash) => self.check_invite(hash).await,
            LinkTarget::Username(name) => self.check_username(&name).await,
        }
    }

    async fn close(&self) -> Result<()> {
        self.client.session().save_to_file(&self.session_file)?;
        info!(session = %self.session_file.display(), "lookup session saved");
        Ok(())
    }
}
