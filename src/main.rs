use anyhow::Context;
use google_gmail1::Gmail;
use mailpipe::auth;
use mailpipe::config::Config;
use mailpipe::db::Store;
use mailpipe::gmail::GmailSource;
use mailpipe::ingest;
use mailpipe::{Pipeline, SystemClock};
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let debug_logging = std::env::args().any(|arg| arg == "--debug");
    mailpipe::init_logging(debug_logging);

    // Handle token reset
    if std::env::args().any(|arg| arg == "--reset-token") {
        auth::RingStorage.clear_token().await?;
        println!("Token cleared. Please restart without --reset-token to re-authenticate.");
        return Ok(());
    }

    let config = Config::load()?;
    for (header, values) in &config.exclude_headers_with_values {
        tracing::info!(header = %header, values = ?values, "Excluding messages by header");
    }

    let store = Store::new(&config.database_url)
        .await
        .context("Failed to open database")?;
    store.run_migrations().await?;

    let secret = auth::Authenticator::load_secret(&config.credentials).await?;
    let authenticator = auth::Authenticator::authenticate(secret).await?;
    auth::Authenticator::authorize(&authenticator).await?;

    let hub = Gmail::new(
        hyper::Client::builder().build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .context("Failed to load native roots")?
                .https_only()
                .enable_http1()
                .build(),
        ),
        authenticator,
    );

    let pipeline = Pipeline::new(
        Arc::new(GmailSource::new(hub)),
        Arc::new(SystemClock),
        config.options(),
        config.workers,
    )?;

    let started = Instant::now();
    match pipeline.labels().await {
        Ok(labels) => {
            if let Err(e) = store.save_labels(&labels).await {
                tracing::error!(error = %e, "Error saving labels");
            }
        }
        Err(e) => tracing::error!(error = %e, "Unable to retrieve labels"),
    }

    let download = pipeline.spawn();
    println!("Started at: {}", download.started_at);
    let stats = ingest::persist(&store, download.messages, config.store_workers).await;
    let summary = download.handle.await.context("Download task failed")?;

    println!("Messages enumerated: {}", summary.enumerated);
    println!("Messages excluded: {}", summary.fetch.excluded);
    println!("Total messages: {}", stats.total());
    println!("Total saved messages: {}", stats.saved);
    println!("Total errors: {}", stats.errors);
    println!("Total duplicates: {}", stats.duplicates);
    println!("Net messages: {}", stats.net());

    let db_stats = store.stats().await?;
    if let (Some(earliest), Some(latest)) = (db_stats.earliest, db_stats.latest) {
        println!(
            "Stored: {} messages from {} to {}",
            db_stats.total, earliest, latest
        );
    }
    println!("Elapsed time: {:.3} seconds", started.elapsed().as_secs_f64());

    store.close().await;
    Ok(())
}
