//! Batch link validator: the rate-limited worker behind `/check`.
//!
//! Links are resolved one at a time, in input order, with a fixed delay before every
//! lookup and a longer rest between batches. Progress and results go to the user
//! through the messaging port; every notification is best-effort.

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    domain::ChatId,
    lookup::{LinkResolver, LookupError},
    messaging::{port::MessagingPort, types::SendOptions},
    registry::JobProgress,
    report::{send_link_report, INVALID_HEADER, VALID_HEADER},
};

/// What to do when the lookup service asks us to back off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloodWaitPolicy {
    /// Tell the user, sleep the requested time, then try the same link once more.
    RetryOnce,
    /// Mark the link invalid immediately.
    GiveUp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub batch_size: usize,
    /// Delay before every lookup, including the first one.
    pub call_delay: Duration,
    /// Rest between two batches.
    pub batch_rest: Duration,
    /// Progress notice every N links (0 disables).
    pub progress_every: usize,
    pub flood_wait: FloodWaitPolicy,
    /// Added on top of the wait the server asked for.
    pub flood_wait_buffer: Duration,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            batch_size: 50,
            call_delay: Duration::from_secs(15),
            batch_rest: Duration::from_secs(5 * 60),
            progress_every: 10,
            flood_wait: FloodWaitPolicy::RetryOnce,
            flood_wait_buffer: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

impl ValidationOutcome {
    pub fn processed(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    fn push(&mut self, link: &str, verdict: Verdict) {
        match verdict {
            Verdict::Valid => self.valid.push(link.to_string()),
            Verdict::Invalid => self.invalid.push(link.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(ValidationOutcome),
    /// Shutdown cut the run short; holds what was classified so far.
    Interrupted(ValidationOutcome),
}

pub fn batch_count(total: usize, batch_size: usize) -> usize {
    total.div_ceil(batch_size.max(1))
}

/// `index` is 1-based and cumulative across batches.
pub fn is_progress_point(index: usize, every: usize) -> bool {
    every > 0 && index > 0 && index % every == 0
}

pub fn describe_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let mins = secs / 60;
        if mins == 1 {
            return "1 minute".to_string();
        }
        return format!("{mins} minutes");
    }
    if secs == 1 {
        return "1 second".to_string();
    }
    format!("{secs} seconds")
}

pub struct Validator<'a> {
    messenger: &'a dyn MessagingPort,
    resolver: &'a dyn LinkResolver,
    policy: &'a ValidationPolicy,
    chat_id: ChatId,
    progress: Option<&'a JobProgress>,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> Validator<'a> {
    pub fn new(
        messenger: &'a dyn MessagingPort,
        resolver: &'a dyn LinkResolver,
        policy: &'a ValidationPolicy,
        chat_id: ChatId,
    ) -> Self {
        Self {
            messenger,
            resolver,
            policy,
            chat_id,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a JobProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: &'a CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Classify every link. Each link ends up in exactly one of valid/invalid.
    pub async fn run(&self, links: &[String]) -> RunOutcome {
        let total = links.len();
        let batch_size = self.policy.batch_size.max(1);
        let batches = batch_count(total, batch_size);
        let mut outcome = ValidationOutcome::default();

        for (b, batch) in links.chunks(batch_size).enumerate() {
            let batch_no = b + 1;
            if let Some(p) = self.progress {
                p.set_batch(batch_no);
            }
            info!(
                chat_id = self.chat_id.0,
                "batch {batch_no}/{batches} starting ({} links)",
                batch.len()
            );
            self.notify(&format!(
                "🚀 Batch {batch_no}/{batches} starting ({} links)...",
                batch.len()
            ))
            .await;

            for (i, link) in batch.iter().enumerate() {
                let index = b * batch_size + i + 1;
                let Some(verdict) = self.check_link(link, index, total).await else {
                    return RunOutcome::Interrupted(outcome);
                };
                outcome.push(link, verdict);
                if let Some(p) = self.progress {
                    p.record(verdict == Verdict::Valid);
                }
            }

            if batch_no < batches {
                self.notify(&format!(
                    "☕ Batch {batch_no} finished. Taking a {} break now.",
                    describe_duration(self.policy.batch_rest)
                ))
                .await;
                if !self.pause(self.policy.batch_rest).await {
                    return RunOutcome::Interrupted(outcome);
                }
            }
        }

        RunOutcome::Completed(outcome)
    }

    /// Completion notice followed by the valid and invalid reports.
    pub async fn deliver(&self, outcome: &ValidationOutcome) {
        self.notify("🎉 Checking finished! Here are the results:")
            .await;
        send_link_report(self.messenger, self.chat_id, VALID_HEADER, &outcome.valid).await;
        send_link_report(
            self.messenger,
            self.chat_id,
            INVALID_HEADER,
            &outcome.invalid,
        )
        .await;
    }

    /// `None` means the run was cancelled before the link got a verdict.
    async fn check_link(&self, link: &str, index: usize, total: usize) -> Option<Verdict> {
        if !self.pause(self.policy.call_delay).await {
            return None;
        }

        if is_progress_point(index, self.policy.progress_every) {
            self.notify(&format!("⏳ Progress: {index}/{total} links checked..."))
                .await;
        }

        match self.resolver.resolve(link).await {
            Ok(()) => {
                info!("VALID: {link}");
                Some(Verdict::Valid)
            }
            Err(LookupError::FloodWait(wait)) => self.after_flood_wait(link, wait).await,
            Err(e) if e.is_dead_link() => {
                info!("INVALID: {link} -> {}", e.kind());
                Some(Verdict::Invalid)
            }
            Err(e) => {
                warn!("UNKNOWN ERROR: {link} -> {e}");
                Some(Verdict::Invalid)
            }
        }
    }

    async fn after_flood_wait(&self, link: &str, wait: Duration) -> Option<Verdict> {
        if self.policy.flood_wait == FloodWaitPolicy::GiveUp {
            warn!(
                "FLOOD WAIT ({}s): marking {link} invalid without retry",
                wait.as_secs()
            );
            return Some(Verdict::Invalid);
        }

        warn!("FLOOD WAIT: waiting {}s before retrying {link}", wait.as_secs());
        self.notify(&format!(
            "🕒 Flood wait! Telegram asked us to wait {} seconds.",
            wait.as_secs()
        ))
        .await;
        if !self.pause(wait + self.policy.flood_wait_buffer).await {
            return None;
        }

        match self.resolver.resolve(link).await {
            Ok(()) => {
                info!("VALID (after flood wait): {link}");
                Some(Verdict::Valid)
            }
            Err(e) => {
                info!("INVALID (after flood wait): {link} -> {}", e.kind());
                Some(Verdict::Invalid)
            }
        }
    }

    /// Sleep unless cancelled; returns false when the run must stop.
    async fn pause(&self, d: Duration) -> bool {
        let Some(cancel) = self.cancel else {
            if !d.is_zero() {
                sleep(d).await;
            }
            return true;
        };
        if cancel.is_cancelled() {
            return false;
        }
        if d.is_zero() {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(d) => true,
        }
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self
            .messenger
            .send_text(self.chat_id, text, SendOptions::plain())
            .await
        {
            warn!(chat_id = self.chat_id.0, "could not send notification: {e}");
        }
    }
}
