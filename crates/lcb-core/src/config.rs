use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    errors::Error,
    intake::{LinkFilter, DEFAULT_LINK_MARKER},
    validator::{FloodWaitPolicy, ValidationPolicy},
    Result,
};

pub const DEFAULT_SESSION_NAME: &str = "checker_bot_session";

/// MTProto user-session credentials used for link lookups.
#[derive(Clone, Debug)]
pub struct MtprotoSettings {
    pub api_id: i32,
    pub api_hash: String,
    /// `<SESSION_DIR>/<SESSION_NAME>.session`, created by `lcb-login`.
    pub session_file: PathBuf,
}

impl MtprotoSettings {
    /// Load only the MTProto part (used by the login binary, which has no bot token).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let api_id_raw = get("API_ID").and_then(non_empty).ok_or_else(|| {
            Error::Config("API_ID environment variable is required".to_string())
        })?;
        let api_id = api_id_raw
            .trim()
            .parse::<i32>()
            .map_err(|_| Error::Config(format!("API_ID must be an integer, got {api_id_raw:?}")))?;
        let api_hash = get("API_HASH").and_then(non_empty).ok_or_else(|| {
            Error::Config("API_HASH environment variable is required".to_string())
        })?;

        let session_name = get("SESSION_NAME")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string());
        let session_dir = get("SESSION_DIR")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            api_id,
            api_hash: api_hash.trim().to_string(),
            session_file: session_dir.join(format!("{session_name}.session")),
        })
    }
}

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    pub mtproto: MtprotoSettings,

    // Intake
    pub link_filter: LinkFilter,
    pub max_document_size: u64,

    // Worker
    pub validation: ValidationPolicy,

    // Telegram limits
    pub telegram_message_limit: usize,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = get("CHECKER_BOT_TOKEN")
            .and_then(non_empty)
            .or_else(|| get("TELEGRAM_BOT_TOKEN").and_then(non_empty))
            .ok_or_else(|| {
                Error::Config("CHECKER_BOT_TOKEN environment variable is required".to_string())
            })?;

        let mtproto = MtprotoSettings::from_lookup(get)?;

        let link_filter = match get("LINK_FILTER")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            None | Some("") | Some("marker") => LinkFilter::Marker(
                get("LINK_MARKER")
                    .and_then(non_empty)
                    .unwrap_or_else(|| DEFAULT_LINK_MARKER.to_string()),
            ),
            Some("verbatim") => LinkFilter::Verbatim,
            Some(other) => {
                return Err(Error::Config(format!(
                    "LINK_FILTER must be 'marker' or 'verbatim', got {other:?}"
                )))
            }
        };
        let max_document_size = parse_u64(get, "MAX_DOCUMENT_SIZE").unwrap_or(10 * 1024 * 1024);

        let defaults = ValidationPolicy::default();
        let batch_size = parse_u64(get, "BATCH_SIZE")
            .map(|v| v as usize)
            .unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(Error::Config("BATCH_SIZE must be greater than 0".to_string()));
        }
        let validation = ValidationPolicy {
            batch_size,
            call_delay: parse_u64(get, "CHECK_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.call_delay),
            batch_rest: parse_u64(get, "BATCH_REST_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.batch_rest),
            progress_every: parse_u64(get, "PROGRESS_EVERY")
                .map(|v| v as usize)
                .unwrap_or(defaults.progress_every),
            flood_wait: match parse_bool(get, "FLOOD_WAIT_RETRY") {
                Some(false) => FloodWaitPolicy::GiveUp,
                _ => FloodWaitPolicy::RetryOnce,
            },
            flood_wait_buffer: parse_u64(get, "FLOOD_WAIT_BUFFER_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.flood_wait_buffer),
        };

        let telegram_message_limit = parse_u64(get, "TELEGRAM_MESSAGE_LIMIT")
            .map(|v| v as usize)
            .unwrap_or(4096)
            .clamp(64, 4096);

        let audit_log_path = get("AUDIT_LOG_PATH")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp/link-checker-audit.log"));
        let audit_log_json = parse_bool(get, "AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            mtproto,
            link_filter,
            max_document_size,
            validation,
            telegram_message_limit,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_bool(get: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    get(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(get: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    get(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
