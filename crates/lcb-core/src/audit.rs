//! Job audit log (append-only, plain text or JSON lines).

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::UserId, errors::Error, Result};

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,
    pub user_id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    fn base(event: &str, user: UserId) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            user_id: user.0,
            links: None,
            valid: None,
            invalid: None,
            error: None,
        }
    }

    pub fn job_started(user: UserId, links: usize) -> Self {
        Self {
            links: Some(links),
            ..Self::base("job_started", user)
        }
    }

    pub fn job_completed(user: UserId, valid: usize, invalid: usize) -> Self {
        Self {
            links: Some(valid + invalid),
            valid: Some(valid),
            invalid: Some(invalid),
            ..Self::base("job_completed", user)
        }
    }

    pub fn job_interrupted(user: UserId, processed: usize, links: usize) -> Self {
        Self {
            links: Some(links),
            error: Some(format!("interrupted after {processed} links")),
            ..Self::base("job_interrupted", user)
        }
    }

    pub fn session_failed(user: UserId, error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::base("session_failed", user)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, event: &AuditEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let value = serde_json::to_value(event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            match v {
                serde_json::Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}
