//! Scripted in-memory mailbox for pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use mailpipe::source::{Header, MessagePart, MessagePartBody};
use mailpipe::{Label, ListPage, Message, MessageSource, RawMessage, SourceError};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

type GetScript = Box<dyn Fn(&str) -> Option<SourceError> + Send + Sync>;

/// Serves `ids` in pages of `page_len`. `get` consults `fail_get` first and
/// answers from `messages` otherwise.
pub struct ScriptedSource {
    ids: Vec<String>,
    page_len: usize,
    messages: HashMap<String, RawMessage>,
    labels: Vec<Label>,
    fail_get: Option<GetScript>,
    fail_list_at: Option<usize>,
    latency: Option<Duration>,

    list_calls: AtomicUsize,
    get_attempts: AtomicUsize,
    get_failures: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedSource {
    /// `count` messages `id-0..id-{count}`, each from `ann@example.com`.
    pub fn with_messages(count: usize) -> Self {
        let messages: Vec<RawMessage> = (0..count)
            .map(|i| {
                let subject = format!("Message {i}");
                raw_message(
                    &format!("id-{i}"),
                    &[("From", "ann@example.com"), ("Subject", subject.as_str())],
                    &format!("body {i}"),
                )
            })
            .collect();
        Self::from_messages(messages)
    }

    pub fn from_messages(messages: Vec<RawMessage>) -> Self {
        Self {
            ids: messages.iter().map(|m| m.id.clone()).collect(),
            page_len: 100,
            messages: messages.into_iter().map(|m| (m.id.clone(), m)).collect(),
            labels: Vec::new(),
            fail_get: None,
            fail_list_at: None,
            latency: None,
            list_calls: AtomicUsize::new(0),
            get_attempts: AtomicUsize::new(0),
            get_failures: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn page_len(mut self, page_len: usize) -> Self {
        self.page_len = page_len;
        self
    }

    pub fn labels(mut self, labels: Vec<Label>) -> Self {
        self.labels = labels;
        self
    }

    pub fn fail_get(
        mut self,
        script: impl Fn(&str) -> Option<SourceError> + Send + Sync + 'static,
    ) -> Self {
        self.fail_get = Some(Box::new(script));
        self
    }

    /// Fails the list call for the zero-based page `page`.
    pub fn fail_list_at(mut self, page: usize) -> Self {
        self.fail_list_at = Some(page);
        self
    }

    /// Real-time delay inside every `get`.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_attempts(&self) -> usize {
        self.get_attempts.load(Ordering::SeqCst)
    }

    pub fn get_failures(&self) -> usize {
        self.get_failures.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn list(
        &self,
        _query: &str,
        _page_size: u32,
        page_token: &str,
    ) -> Result<ListPage, SourceError> {
        let page = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_at == Some(page) {
            return Err(SourceError::with_status(500, "Backend Error"));
        }

        let start: usize = if page_token.is_empty() {
            0
        } else {
            page_token.parse().unwrap()
        };
        let end = (start + self.page_len).min(self.ids.len());
        Ok(ListPage {
            ids: self.ids[start..end].to_vec(),
            next_page_token: if end < self.ids.len() {
                end.to_string()
            } else {
                String::new()
            },
            result_size_estimate: self.ids.len() as u32,
        })
    }

    async fn get(&self, id: &str) -> Result<RawMessage, SourceError> {
        self.get_attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failure = self.fail_get.as_ref().and_then(|script| script(id));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = failure {
            self.get_failures.fetch_add(1, Ordering::SeqCst);
            return Err(err);
        }
        self.fetched.lock().unwrap().push(id.to_string());
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::with_status(404, format!("Not Found: {id}")))
    }

    async fn list_labels(&self) -> Result<Vec<Label>, SourceError> {
        Ok(self.labels.clone())
    }
}

pub fn b64(text: &str) -> String {
    general_purpose::URL_SAFE.encode(text)
}

/// A message with the given headers and a top-level plain text body.
pub fn raw_message(id: &str, headers: &[(&str, &str)], body: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        thread_id: format!("thread-{id}"),
        label_ids: vec!["INBOX".to_string()],
        snippet: body.chars().take(20).collect(),
        internal_date: 1_543_000_000_000,
        payload: Some(MessagePart {
            mime_type: "text/plain".to_string(),
            headers: headers.iter().map(|(n, v)| Header::new(*n, *v)).collect(),
            body: Some(MessagePartBody {
                data: Some(b64(body)),
            }),
            parts: Vec::new(),
        }),
        source: format!("{{\"id\":\"{id}\"}}"),
    }
}

pub async fn collect(mut messages: mpsc::Receiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Some(msg) = messages.recv().await {
        out.push(msg);
    }
    out
}

/// Messages of every `tracing` event emitted on this thread while the
/// guard lives. `#[tokio::test]` runs spawned tasks on the test thread, so
/// pipeline workers are captured too.
#[derive(Clone, Default)]
pub struct Logs(Arc<Mutex<Vec<String>>>);

impl Logs {
    pub fn capture() -> (Self, DefaultGuard) {
        let logs = Logs::default();
        let subscriber = tracing_subscriber::registry().with(logs.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    pub fn count(&self, message: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|m| *m == message).count()
    }
}

struct MessageField<'a>(&'a mut String);

impl Visit for MessageField<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{value:?}");
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for Logs {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageField(&mut message));
        self.0.lock().unwrap().push(message);
    }
}
