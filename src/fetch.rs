//! Bounded-concurrency fetching of full messages.
//!
//! One task per id, at most `workers` running at once. Each task holds a
//! semaphore permit until it has sent its result. After the id channel is
//! exhausted the orchestrator acquires every permit, which can only happen
//! once all tasks are done, and then drops its sender so the output channel
//! closes.

use crate::clock::Clock;
use crate::decode;
use crate::filter::ExclusionRules;
use crate::models::Message;
use crate::retry::{RetryPolicy, with_retry};
use crate::source::MessageSource;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Semaphore, mpsc};

/// Counters for one orchestrator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub dispatched: usize,
    pub sent: usize,
    pub excluded: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    sent: AtomicUsize,
    excluded: AtomicUsize,
    failed: AtomicUsize,
}

pub struct Fetcher {
    source: Arc<dyn MessageSource>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    inbox_url: String,
    exclude: ExclusionRules,
    download_started_at: DateTime<Utc>,
    counters: Counters,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn MessageSource>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        inbox_url: impl Into<String>,
        exclude: ExclusionRules,
        download_started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            clock,
            retry,
            inbox_url: inbox_url.into(),
            exclude,
            download_started_at,
            counters: Counters::default(),
        }
    }

    /// Consumes `ids` until the channel closes, then waits for every
    /// dispatched fetch before returning. `out` closes when this returns.
    pub async fn run(
        self: Arc<Self>,
        workers: u32,
        mut ids: mpsc::Receiver<String>,
        out: mpsc::Sender<Message>,
    ) -> FetchSummary {
        let workers = workers.max(1);
        let slots = Arc::new(Semaphore::new(workers as usize));
        let mut dispatched = 0;

        while let Some(id) = ids.recv().await {
            let Ok(permit) = slots.clone().acquire_owned().await else {
                break;
            };
            let fetcher = self.clone();
            let out = out.clone();
            tokio::spawn(async move {
                fetcher.fetch_one(&id, &out).await;
                drop(out);
                drop(permit);
            });
            dispatched += 1;
        }

        tracing::debug!(dispatched, "Id channel exhausted, waiting for workers");
        if slots.acquire_many(workers).await.is_err() {
            tracing::warn!("Worker slots closed before drain");
        }
        drop(out);

        let summary = FetchSummary {
            dispatched,
            sent: self.counters.sent.load(Ordering::SeqCst),
            excluded: self.counters.excluded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        };
        tracing::info!(
            dispatched = summary.dispatched,
            sent = summary.sent,
            excluded = summary.excluded,
            failed = summary.failed,
            "Fetching finished"
        );
        summary
    }

    async fn fetch_one(&self, id: &str, out: &mpsc::Sender<Message>) {
        let fetched = with_retry(self.clock.as_ref(), &self.retry, "get", || {
            self.source.get(id)
        })
        .await;

        let msg = match fetched {
            Ok(raw) => {
                if let Some(hit) = self.exclude.matches(&raw) {
                    tracing::info!(
                        id,
                        header = %hit.header,
                        value = %hit.value,
                        "Skipping excluded message"
                    );
                    self.counters.excluded.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                decode::to_message(&raw, &self.inbox_url, self.download_started_at)
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                Message::partial(
                    id,
                    self.download_started_at,
                    format!("Error retrieving message {id}: {e}"),
                )
            }
        };

        if out.send(msg).await.is_err() {
            tracing::warn!(id, "Message receiver dropped");
            return;
        }
        self.counters.sent.fetch_add(1, Ordering::SeqCst);
    }
}
