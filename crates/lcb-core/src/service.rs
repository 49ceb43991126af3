//! Service root: owns the job registry and the worker tasks.

use std::sync::Arc;

use tokio::{sync::Mutex, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    domain::{ChatId, UserId},
    lookup::{LinkResolver, ResolverConnector},
    messaging::{port::MessagingPort, types::SendOptions},
    registry::{JobProgress, JobRegistry, JobSnapshot, RegistryError},
    validator::{batch_count, RunOutcome, ValidationPolicy, Validator},
};

/// Acknowledgement returned by [`LinkCheckService::submit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Submitted {
    pub links: usize,
    pub batches: usize,
}

pub struct LinkCheckService {
    inner: Arc<ServiceInner>,
    tasks: Mutex<JoinSet<()>>,
}

struct ServiceInner {
    registry: JobRegistry,
    messenger: Arc<dyn MessagingPort>,
    connector: Arc<dyn ResolverConnector>,
    policy: ValidationPolicy,
    audit: Option<AuditLogger>,
    shutdown: CancellationToken,
}

struct JobContext {
    user: UserId,
    chat_id: ChatId,
    links: Vec<String>,
    progress: Arc<JobProgress>,
}

impl LinkCheckService {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        connector: Arc<dyn ResolverConnector>,
        policy: ValidationPolicy,
        audit: Option<AuditLogger>,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                registry: JobRegistry::new(),
                messenger,
                connector,
                policy,
                audit,
                shutdown: CancellationToken::new(),
            }),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.inner.policy
    }

    pub async fn store_links(
        &self,
        user: UserId,
        links: Vec<String>,
    ) -> Result<usize, RegistryError> {
        self.inner.registry.store_links(user, links).await
    }

    pub async fn snapshot(&self, user: UserId) -> Option<JobSnapshot> {
        self.inner.registry.snapshot(user).await
    }

    /// Start checking the user's stored links in the background.
    ///
    /// On rejection nothing is spawned and the existing job is left as is.
    pub async fn submit(&self, user: UserId, chat_id: ChatId) -> Result<Submitted, RegistryError> {
        let started = self.inner.registry.begin(user, chat_id).await?;
        let submitted = Submitted {
            links: started.links.len(),
            batches: batch_count(started.links.len(), self.inner.policy.batch_size),
        };

        info!(
            user_id = user.0,
            links = submitted.links,
            batches = submitted.batches,
            "link check submitted"
        );
        self.inner.write_audit(AuditEvent::job_started(user, submitted.links));

        // Acknowledge before spawning so it is the first message the user sees.
        let ack = format!(
            "🚀 Check started! {} links in {} batch(es). This runs in the background.",
            submitted.links, submitted.batches
        );
        if let Err(e) = self
            .inner
            .messenger
            .send_text(chat_id, &ack, SendOptions::plain())
            .await
        {
            warn!(user_id = user.0, "could not send start notice: {e}");
        }

        let ctx = JobContext {
            user,
            chat_id,
            links: started.links,
            progress: started.progress,
        };
        let inner = self.inner.clone();
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { inner.run_job(ctx).await });

        Ok(submitted)
    }

    /// Users whose check is currently running.
    pub async fn running_users(&self) -> Vec<UserId> {
        self.inner.registry.running_users().await
    }

    /// Stop every running check and wait for the workers to wind down.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("link check task failed: {e}");
            }
        }
    }
}

impl ServiceInner {
    async fn run_job(&self, ctx: JobContext) {
        let resolver = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            res = self.connector.connect() => Some(res),
        };
        let resolver: Box<dyn LinkResolver> = match resolver {
            Some(Ok(r)) => r,
            Some(Err(e)) => {
                error!(user_id = ctx.user.0, "could not open lookup session: {e}");
                self.notify(
                    ctx.chat_id,
                    &format!("❌ Could not open the lookup session: {e}\nPlease try /check again later."),
                )
                .await;
                self.write_audit(AuditEvent::session_failed(ctx.user, &e.to_string()));
                self.registry.complete(ctx.user).await;
                return;
            }
            None => {
                self.finish_interrupted(&ctx, 0).await;
                return;
            }
        };

        let validator = Validator::new(
            self.messenger.as_ref(),
            resolver.as_ref(),
            &self.policy,
            ctx.chat_id,
        )
        .with_progress(&ctx.progress)
        .with_cancel(&self.shutdown);

        let end = validator.run(&ctx.links).await;

        if let Err(e) = resolver.close().await {
            warn!(user_id = ctx.user.0, "failed to close lookup session: {e}");
        }

        match end {
            RunOutcome::Completed(outcome) => {
                validator.deliver(&outcome).await;
                info!(
                    user_id = ctx.user.0,
                    valid = outcome.valid.len(),
                    invalid = outcome.invalid.len(),
                    "link check finished"
                );
                self.write_audit(AuditEvent::job_completed(
                    ctx.user,
                    outcome.valid.len(),
                    outcome.invalid.len(),
                ));
                self.registry.complete(ctx.user).await;
            }
            RunOutcome::Interrupted(outcome) => {
                self.finish_interrupted(&ctx, outcome.processed()).await;
            }
        }
    }

    async fn finish_interrupted(&self, ctx: &JobContext, processed: usize) {
        warn!(
            user_id = ctx.user.0,
            processed,
            total = ctx.links.len(),
            "link check interrupted by shutdown"
        );
        self.notify(
            ctx.chat_id,
            &format!(
                "⚠️ The bot is shutting down. Check interrupted after {processed}/{} links; send the links again later.",
                ctx.links.len()
            ),
        )
        .await;
        self.write_audit(AuditEvent::job_interrupted(
            ctx.user,
            processed,
            ctx.links.len(),
        ));
        self.registry.complete(ctx.user).await;
    }

    async fn notify(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self
            .messenger
            .send_text(chat_id, text, SendOptions::plain())
            .await
        {
            warn!(chat_id = chat_id.0, "could not send notification: {e}");
        }
    }

    fn write_audit(&self, event: AuditEvent) {
        let Some(audit) = &self.audit else {
            return;
        };
        if let Err(e) = audit.write(&event) {
            warn!("failed to write audit event {}: {e}", event.event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        intake::{extract_links, LinkFilter},
        lookup::LookupError,
        testing::{FakeConnector, FakeMessenger},
    };
    use std::{sync::atomic::Ordering, time::Duration};

    fn fast_policy() -> ValidationPolicy {
        ValidationPolicy {
            call_delay: Duration::ZERO,
            batch_rest: Duration::ZERO,
            flood_wait_buffer: Duration::ZERO,
            ..Default::default()
        }
    }

    fn service(
        api: Arc<FakeMessenger>,
        connector: Arc<FakeConnector>,
        policy: ValidationPolicy,
    ) -> LinkCheckService {
        LinkCheckService::new(api, connector, policy, None)
    }

    async fn wait_until_idle(svc: &LinkCheckService, user: UserId) {
        // 50ms steps; with a paused clock this covers two minutes of worker time.
        for _ in 0..2400 {
            if !svc.registry().is_running(user).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job did not finish");
    }

    #[tokio::test]
    async fn document_of_sixty_links_runs_two_batches_and_clears_entry() {
        let api = Arc::new(FakeMessenger::default());
        let connector = Arc::new(FakeConnector::default());
        let svc = service(api.clone(), connector.clone(), fast_policy());
        let user = UserId(42);

        let document: String = (1..=60)
            .map(|i| format!("https://t.me/+invite{i}\n"))
            .collect();
        let links = extract_links(&document, &LinkFilter::default());
        assert_eq!(svc.store_links(user, links).await.unwrap(), 60);

        let submitted = svc.submit(user, ChatId(42)).await.unwrap();
        assert_eq!(
            submitted,
            Submitted {
                links: 60,
                batches: 2
            }
        );

        wait_until_idle(&svc, user).await;
        svc.shutdown().await;

        assert!(svc.snapshot(user).await.is_none());
        assert_eq!(api.count_containing("Batch 1/2 starting (50 links)"), 1);
        assert_eq!(api.count_containing("Batch 2/2 starting (10 links)"), 1);
        assert!(api.texts()[0].starts_with("🚀 Check started! 60 links in 2 batch(es)"));
        assert_eq!(api.count_containing("🎉"), 1);
        assert_eq!(connector.resolver.calls().len(), 60);
        assert_eq!(connector.resolver.close_calls(), 1);
    }

    #[tokio::test]
    async fn check_without_links_is_rejected() {
        let api = Arc::new(FakeMessenger::default());
        let connector = Arc::new(FakeConnector::default());
        let svc = service(api.clone(), connector.clone(), fast_policy());

        let err = svc.submit(UserId(1), ChatId(1)).await.unwrap_err();

        assert_eq!(err, RegistryError::NoLinks);
        assert!(api.texts().is_empty());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_check_while_running_starts_nothing() {
        let api = Arc::new(FakeMessenger::default());
        let connector = Arc::new(FakeConnector::default());
        let policy = ValidationPolicy {
            call_delay: Duration::from_secs(15),
            ..fast_policy()
        };
        let svc = service(api.clone(), connector.clone(), policy);
        let user = UserId(5);
        svc.store_links(user, vec!["t.me/a".into(), "t.me/b".into()])
            .await
            .unwrap();

        svc.submit(user, ChatId(5)).await.unwrap();
        let err = svc.submit(user, ChatId(5)).await.unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRunning);
        assert_eq!(
            svc.store_links(user, vec!["t.me/c".into()]).await.unwrap_err(),
            RegistryError::AlreadyRunning
        );
        assert_eq!(svc.running_users().await, vec![user]);

        wait_until_idle(&svc, user).await;

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(api.count_containing("🚀 Check started!"), 1);
        assert_eq!(connector.resolver.calls(), vec!["t.me/a", "t.me/b"]);
        assert!(svc.snapshot(user).await.is_none());
    }

    #[tokio::test]
    async fn results_are_reported_per_bucket() {
        let api = Arc::new(FakeMessenger::default());
        let connector = Arc::new(FakeConnector::default());
        connector
            .resolver
            .script("t.me/dead", vec![Err(LookupError::InviteExpired)]);
        let svc = service(api.clone(), connector.clone(), fast_policy());
        let user = UserId(9);
        svc.store_links(user, vec!["t.me/live".into(), "t.me/dead".into()])
            .await
            .unwrap();

        svc.submit(user, ChatId(9)).await.unwrap();
        wait_until_idle(&svc, user).await;
        svc.shutdown().await;

        let sent = api.sent();
        let valid = sent
            .iter()
            .find(|(_, t, _)| t.starts_with("✅ Valid Links:"))
            .unwrap();
        let invalid = sent
            .iter()
            .find(|(_, t, _)| t.starts_with("❌ Invalid/Expired Links:"))
            .unwrap();
        assert!(valid.1.contains("t.me/live") && !valid.1.contains("t.me/dead"));
        assert!(invalid.1.contains("t.me/dead"));
        assert!(valid.2.disable_link_preview && invalid.2.disable_link_preview);
        assert!(sent.iter().all(|(chat, _, _)| *chat == ChatId(9)));
    }

    #[tokio::test]
    async fn session_failure_notifies_and_clears_entry() {
        let api = Arc::new(FakeMessenger::default());
        let connector = Arc::new(FakeConnector {
            fail: true,
            ..Default::default()
        });
        let svc = service(api.clone(), connector.clone(), fast_policy());
        let user = UserId(3);
        svc.store_links(user, vec!["t.me/a".into()]).await.unwrap();

        svc.submit(user, ChatId(3)).await.unwrap();
        wait_until_idle(&svc, user).await;
        svc.shutdown().await;

        assert_eq!(api.count_containing("❌ Could not open the lookup session"), 1);
        assert!(svc.snapshot(user).await.is_none());
        assert!(connector.resolver.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_running_jobs() {
        let api = Arc::new(FakeMessenger::default());
        let connector = Arc::new(FakeConnector::default());
        let policy = ValidationPolicy {
            call_delay: Duration::from_secs(15),
            ..fast_policy()
        };
        let svc = service(api.clone(), connector.clone(), policy);
        let user = UserId(8);
        svc.store_links(user, (0..10).map(|i| format!("t.me/x{i}")).collect())
            .await
            .unwrap();

        svc.submit(user, ChatId(8)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        svc.shutdown().await;

        assert_eq!(connector.resolver.calls().len(), 2);
        assert_eq!(
            api.count_containing("Check interrupted after 2/10 links"),
            1
        );
        assert_eq!(api.count_containing("🎉"), 0);
        assert!(svc.snapshot(user).await.is_none());
        assert_eq!(connector.resolver.close_calls(), 1);
    }

    #[tokio::test]
    async fn jobs_of_different_users_run_side_by_side() {
        let api = Arc::new(FakeMessenger::default());
        let connector = Arc::new(FakeConnector::default());
        let svc = service(api.clone(), connector.clone(), fast_policy());
        for u in [1, 2] {
            svc.store_links(UserId(u), vec![format!("t.me/user{u}")])
                .await
                .unwrap();
            svc.submit(UserId(u), ChatId(u)).await.unwrap();
        }

        wait_until_idle(&svc, UserId(1)).await;
        wait_until_idle(&svc, UserId(2)).await;
        svc.shutdown().await;

        assert_eq!(api.count_containing("🎉"), 2);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }
}
