//! Gmail ingestion pipeline.
//!
//! Searches a mailbox, fetches every matching message through a bounded
//! pool of workers, retries rate-limited calls on an injectable [`Clock`],
//! decodes each message into a [`Message`], drops the ones matching the
//! configured header exclusions, and streams the rest to a consumer.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod gmail;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod search;
pub mod source;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{Error, Result, SourceError};
pub use filter::ExclusionRules;
pub use models::{Label, Message};
pub use pipeline::{Download, Options, Pipeline, RunSummary};
pub use source::{ListPage, MessageSource, RawMessage};

/// Installs the `tracing` subscriber used by the binaries.
pub fn init_logging(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if debug { "mailpipe=debug" } else { "mailpipe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
