use crate::db::{SaveOutcome, Store};
use crate::models::Message;
use futures::StreamExt;
use futures::stream;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Outcome counts of writing one download run to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Complete records written, duplicates included.
    pub saved: u64,
    /// Partial records plus records the store refused.
    pub errors: u64,
    /// Complete records whose id was already stored.
    pub duplicates: u64,
}

impl DownloadStats {
    pub fn total(&self) -> u64 {
        self.saved + self.errors
    }

    /// Newly stored messages.
    pub fn net(&self) -> u64 {
        self.saved.saturating_sub(self.duplicates)
    }

    fn record(&mut self, msg: &Message, outcome: &crate::Result<SaveOutcome>) {
        match outcome {
            Err(e) => {
                tracing::error!(id = %msg.id, error = %e, "Error saving message");
                self.errors += 1;
            }
            Ok(_) if msg.is_partial() => {
                tracing::warn!(id = %msg.id, error = %msg.subject, "Message could not be downloaded");
                self.errors += 1;
            }
            Ok(SaveOutcome::Duplicate) => {
                tracing::debug!(id = %msg.id, "Message already stored");
                self.saved += 1;
                self.duplicates += 1;
            }
            Ok(SaveOutcome::Inserted) => {
                tracing::debug!(id = %msg.id, subject = %msg.subject, "Saved message");
                self.saved += 1;
            }
        }
    }
}

/// Drains `messages` into `store` with up to `workers` saves in flight.
/// Returns once the channel is closed and every save has finished.
pub async fn persist(
    store: &Store,
    messages: mpsc::Receiver<Message>,
    workers: usize,
) -> DownloadStats {
    let stats = Mutex::new(DownloadStats::default());

    stream::unfold(messages, |mut rx| async move {
        rx.recv().await.map(|msg| (msg, rx))
    })
    .for_each_concurrent(workers.max(1), |msg| {
        let stats = &stats;
        async move {
            let outcome = store.save_message(&msg).await;
            stats
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .record(&msg, &outcome);
        }
    })
    .await;

    let stats = stats
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    tracing::info!(
        total = stats.total(),
        saved = stats.saved,
        errors = stats.errors,
        duplicates = stats.duplicates,
        net = stats.net(),
        "Download stored"
    );
    stats
}
