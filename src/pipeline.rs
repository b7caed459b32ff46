use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::fetch::{FetchSummary, Fetcher};
use crate::filter::ExclusionRules;
use crate::models::{Label, Message};
use crate::retry::RetryPolicy;
use crate::search::{SearchRequest, search};
use crate::source::MessageSource;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const ID_BUFFER: usize = 1;
const MESSAGE_BUFFER: usize = 100;

/// Settings for one download run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub query: String,
    /// Zero or negative means no limit.
    pub limit: i64,
    pub inbox_url: String,
    pub page_token: String,
    pub exclude: ExclusionRules,
}

/// Totals of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub enumerated: usize,
    pub fetch: FetchSummary,
}

/// A running download. `messages` closes once every fetch has finished.
pub struct Download {
    pub messages: mpsc::Receiver<Message>,
    pub started_at: DateTime<Utc>,
    pub handle: JoinHandle<RunSummary>,
}

pub struct Pipeline {
    source: Arc<dyn MessageSource>,
    clock: Arc<dyn Clock>,
    options: Options,
    workers: u32,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn MessageSource>,
        clock: Arc<dyn Clock>,
        options: Options,
        workers: usize,
    ) -> Result<Self> {
        let workers = u32::try_from(workers)
            .ok()
            .filter(|&w| w > 0)
            .ok_or_else(|| Error::Config(format!("Invalid worker count: {workers}")))?;
        Ok(Self {
            source,
            clock,
            options,
            workers,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// All labels of the mailbox. Not retried.
    pub async fn labels(&self) -> Result<Vec<Label>> {
        let labels = self.source.list_labels().await?;
        tracing::info!(count = labels.len(), "Retrieved labels");
        Ok(labels)
    }

    /// Starts searching and fetching in the background.
    pub fn spawn(self) -> Download {
        let started_at = self.clock.now();
        let (id_tx, id_rx) = mpsc::channel(ID_BUFFER);
        let (msg_tx, msg_rx) = mpsc::channel(MESSAGE_BUFFER);

        let request = SearchRequest {
            query: self.options.query.clone(),
            limit: self.options.limit,
            page_token: self.options.page_token.clone(),
        };
        let fetcher = Arc::new(Fetcher::new(
            self.source.clone(),
            self.clock.clone(),
            self.retry,
            self.options.inbox_url.clone(),
            self.options.exclude.clone(),
            started_at,
        ));

        tracing::info!(
            query = %request.query,
            limit = request.limit,
            workers = self.workers,
            "Starting download"
        );

        let handle = tokio::spawn(async move {
            let (enumerated, fetch) = tokio::join!(
                search(
                    self.source.as_ref(),
                    self.clock.as_ref(),
                    &self.retry,
                    &request,
                    id_tx
                ),
                fetcher.run(self.workers, id_rx, msg_tx)
            );
            RunSummary { enumerated, fetch }
        });

        Download {
            messages: msg_rx,
            started_at,
            handle,
        }
    }
}
