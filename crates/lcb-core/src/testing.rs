//! In-test fakes for the core ports.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    lookup::{LinkResolver, LookupResult, ResolverConnector},
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, SendOptions},
    },
    Result,
};

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<(ChatId, String, SendOptions)>>,
    max_len: Option<usize>,
    fail_containing: Option<String>,
}

impl FakeMessenger {
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Default::default()
        }
    }

    /// Sends whose text contains `needle` fail (and are not recorded).
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_containing: Some(needle.to_string()),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(ChatId, String, SendOptions)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, t, _)| t).collect()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.texts().iter().filter(|t| t.contains(needle)).count()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_link_previews: true,
            max_message_len: self.max_len.unwrap_or(4096),
        }
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        if let Some(needle) = &self.fail_containing {
            if text.contains(needle.as_str()) {
                return Err(Error::External("telegram error: send failed".to_string()));
            }
        }
        self.sends
            .lock()
            .unwrap()
            .push((chat_id, text.to_string(), opts));
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        })
    }
}

/// Resolver answering from a per-link script; unscripted links resolve `Ok`.
#[derive(Default)]
pub struct FakeResolver {
    script: Mutex<HashMap<String, VecDeque<LookupResult>>>,
    calls: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl FakeResolver {
    pub fn script(&self, link: &str, results: Vec<LookupResult>) {
        self.script
            .lock()
            .unwrap()
            .insert(link.to_string(), results.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, link: &str) -> usize {
        self.calls().iter().filter(|l| *l == link).count()
    }

    pub fn close_calls(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkResolver for FakeResolver {
    async fn resolve(&self, link: &str) -> LookupResult {
        self.calls.lock().unwrap().push(link.to_string());
        self.script
            .lock()
            .unwrap()
            .get_mut(link)
            .and_then(|q| q.pop_front())
            .unwrap_or(Ok(()))
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl LinkResolver for Arc<FakeResolver> {
    async fn resolve(&self, link: &str) -> LookupResult {
        self.as_ref().resolve(link).await
    }

    async fn close(&self) -> Result<()> {
        self.as_ref().close().await
    }
}

/// Connector handing out the shared fake resolver, or failing when `fail` is set.
#[derive(Default)]
pub struct FakeConnector {
    pub resolver: Arc<FakeResolver>,
    pub fail: bool,
    pub connects: AtomicUsize,
}

#[async_trait]
impl ResolverConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn LinkResolver>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Config("session is not authorized".to_string()));
        }
        Ok(Box::new(self.resolver.clone()))
    }
}
