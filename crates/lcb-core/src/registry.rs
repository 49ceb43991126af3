//! Per-user job registry.
//!
//! Holds at most one job per user: the stored link list and, while a check runs,
//! its progress. Entries disappear when a check finishes, so callers must treat a
//! missing entry as a normal state.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{ChatId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a link check is already running for this user")]
    AlreadyRunning,

    #[error("no links stored for this user")]
    NoLinks,
}

/// Live counters of a running check, shared between the worker and `/status`.
#[derive(Debug, Default)]
pub struct JobProgress {
    total: usize,
    processed: AtomicUsize,
    valid: AtomicUsize,
    invalid: AtomicUsize,
    batch: AtomicUsize,
}

impl JobProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn valid(&self) -> usize {
        self.valid.load(Ordering::SeqCst)
    }

    pub fn invalid(&self) -> usize {
        self.invalid.load(Ordering::SeqCst)
    }

    /// 1-based batch currently being processed (0 before the first batch).
    pub fn batch(&self) -> usize {
        self.batch.load(Ordering::SeqCst)
    }

    pub fn set_batch(&self, batch: usize) {
        self.batch.store(batch, Ordering::SeqCst);
    }

    pub fn record(&self, valid: bool) {
        if valid {
            self.valid.fetch_add(1, Ordering::SeqCst);
        } else {
            self.invalid.fetch_add(1, Ordering::SeqCst);
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct RunInfo {
    chat_id: ChatId,
    started_at: DateTime<Utc>,
    progress: Arc<JobProgress>,
}

#[derive(Debug, Default)]
struct JobEntry {
    links: Vec<String>,
    run: Option<RunInfo>,
}

/// Read-only view of a user's entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSnapshot {
    pub stored_links: usize,
    pub running: Option<RunSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSnapshot {
    pub chat_id: ChatId,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub processed: usize,
    pub valid: usize,
    pub invalid: usize,
    pub batch: usize,
}

/// What `begin` hands to the worker.
#[derive(Clone, Debug)]
pub struct StartedJob {
    pub links: Vec<String>,
    pub progress: Arc<JobProgress>,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<UserId, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the user's stored links. Rejected while the user's check runs.
    pub async fn store_links(
        &self,
        user: UserId,
        links: Vec<String>,
    ) -> Result<usize, RegistryError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs.entry(user).or_default();
        if entry.run.is_some() {
            return Err(RegistryError::AlreadyRunning);
        }
        entry.links = links;
        Ok(entry.links.len())
    }

    /// Flip the user's job to running and hand out a copy of its links.
    ///
    /// Check and flip happen under one lock, so two concurrent `/check`s cannot both
    /// succeed.
    pub async fn begin(&self, user: UserId, chat_id: ChatId) -> Result<StartedJob, RegistryError> {
        let mut jobs = self.jobs.lock().await;
        let Some(entry) = jobs.get_mut(&user) else {
            return Err(RegistryError::NoLinks);
        };
        if entry.run.is_some() {
            return Err(RegistryError::AlreadyRunning);
        }
        if entry.links.is_empty() {
            return Err(RegistryError::NoLinks);
        }

        let progress = Arc::new(JobProgress::new(entry.links.len()));
        entry.run = Some(RunInfo {
            chat_id,
            started_at: Utc::now(),
            progress: progress.clone(),
        });
        Ok(StartedJob {
            links: entry.links.clone(),
            progress,
        })
    }

    /// Drop the user's entry. Returns whether one existed.
    pub async fn complete(&self, user: UserId) -> bool {
        self.jobs.lock().await.remove(&user).is_some()
    }

    pub async fn snapshot(&self, user: UserId) -> Option<JobSnapshot> {
        let jobs = self.jobs.lock().await;
        let entry = jobs.get(&user)?;
        Some(JobSnapshot {
            stored_links: entry.links.len(),
            running: entry.run.as_ref().map(|run| RunSnapshot {
                chat_id: run.chat_id,
                started_at: run.started_at,
                total: run.progress.total(),
                processed: run.progress.processed(),
                valid: run.progress.valid(),
                invalid: run.progress.invalid(),
                batch: run.progress.batch(),
            }),
        })
    }

    pub async fn is_running(&self, user: UserId) -> bool {
        self.jobs
            .lock()
            .await
            .get(&user)
            .map(|e| e.run.is_some())
            .unwrap_or(false)
    }

    /// Users with a check in progress, sorted by id.
    pub async fn running_users(&self) -> Vec<UserId> {
        let jobs = self.jobs.lock().await;
        let mut users: Vec<UserId> = jobs
            .iter()
            .filter(|(_, e)| e.run.is_some())
            .map(|(u, _)| *u)
            .collect();
        users.sort();
        users
    }
}
