//! NFC reconciler
//!
//! Feeds newline-delimited patient and organization lifecycle events through
//! the reconciliation listener against the configured tag store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use nfc_lifecycle::reconcile::{DeadLetter, Delivery, OrganizationTenantResolver};
use nfc_lifecycle::{
    LifecycleEngine, NoopPublisher, ReconciliationListener, ServiceConfig, init_logging,
};
use nfc_persistence::backends::sqlite::{SqliteBackend, SqliteBackendConfig};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "nfc-reconciler")]
#[command(about = "Replay lifecycle events against the NFC tag store")]
struct Args {
    #[command(flatten)]
    config: ServiceConfig,

    /// Newline-delimited JSON events; reads stdin when omitted.
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,

    /// Routing key for lines that carry no `event_type`.
    #[arg(long)]
    routing_key: Option<String>,

    /// Appends dead-lettered events to this file as JSON lines.
    #[arg(long)]
    dead_letters: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct EventHeader {
    #[serde(default)]
    event_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeadLetterRecord<'a> {
    routing_key: &'a str,
    attempt: u32,
    error: &'a str,
    body: String,
}

fn create_sqlite_backend(config: &ServiceConfig) -> anyhow::Result<SqliteBackend> {
    info!(database = %config.database_url, "Initializing SQLite backend");

    let backend =
        SqliteBackend::with_config(&config.database_url, SqliteBackendConfig::default())?;
    backend.init_schema()?;

    Ok(backend)
}

/// Reads events line by line and hands them to the listener.
///
/// Lines are passed through as raw bytes; the listener acknowledges any
/// that do not decode.
async fn feed<R>(
    mut reader: R,
    fallback: Option<String>,
    sender: mpsc::Sender<Delivery>,
) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut fed = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let header: EventHeader = serde_json::from_slice(line).unwrap_or_default();
        let routing_key = header
            .event_type
            .filter(|t| !t.is_empty())
            .or_else(|| fallback.clone())
            .unwrap_or_default();

        if sender
            .send(Delivery::new(routing_key, line.to_vec()))
            .await
            .is_err()
        {
            warn!("Listener stopped before input was exhausted");
            break;
        }
        fed += 1;
    }

    Ok(fed)
}

/// Waits for the feeder task, folding a panic or cancellation into the error.
async fn join_feeder(feeder: JoinHandle<anyhow::Result<u64>>) -> anyhow::Result<u64> {
    feeder.await?
}

async fn write_dead_letters(path: &Path, letters: &[DeadLetter]) -> anyhow::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    for letter in letters {
        let record = DeadLetterRecord {
            routing_key: &letter.delivery.routing_key,
            attempt: letter.delivery.attempt,
            error: &letter.error,
            body: String::from_utf8_lossy(&letter.delivery.body).into_owned(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
    }
    file.flush().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.config;
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    if !config.consumer_enabled {
        info!("Reconciliation disabled by configuration");
        return Ok(());
    }

    let backend = Arc::new(create_sqlite_backend(&config)?);
    let engine =
        LifecycleEngine::with_config(backend, Arc::new(NoopPublisher), config.engine_config());

    let (dead_tx, mut dead_rx) = mpsc::unbounded_channel();
    let listener = ReconciliationListener::new(
        engine,
        OrganizationTenantResolver,
        config.listener_config(),
    )
    .with_dead_letters(dead_tx);

    info!(
        max_attempts = config.listener_max_attempts,
        retry_delay = ?config.listener_retry_delay,
        input = ?args.input,
        "Starting NFC reconciler"
    );

    let (sender, receiver) = config.delivery_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Dropping the sender would stop the listener.
                warn!(error = %e, "Cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
    });

    let fallback = args.routing_key.clone();
    let feeder = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            tokio::spawn(feed(BufReader::new(file), fallback, sender))
        }
        None => tokio::spawn(feed(BufReader::new(tokio::io::stdin()), fallback, sender)),
    };

    let stopped = shutdown_rx.clone();
    let stats = listener.run(receiver, shutdown_rx).await;
    let interrupted = *stopped.borrow();
    let feed_result = if interrupted {
        feeder.abort();
        None
    } else {
        Some(join_feeder(feeder).await)
    };
    let fed = feed_result.as_ref().and_then(|r| r.as_ref().ok().copied());

    let mut letters = Vec::new();
    while let Ok(letter) = dead_rx.try_recv() {
        letters.push(letter);
    }

    if let Some(path) = &args.dead_letters {
        if !letters.is_empty() {
            write_dead_letters(path, &letters).await?;
            info!(path = %path.display(), count = letters.len(), "Wrote dead letters");
        }
    } else {
        for letter in &letters {
            warn!(
                event_type = %letter.delivery.routing_key,
                attempt = letter.delivery.attempt,
                error = %letter.error,
                "Dead-lettered event"
            );
        }
    }

    info!(
        read = ?fed,
        processed = stats.processed,
        acknowledged = stats.acknowledged,
        ignored = stats.ignored,
        deactivated = stats.deactivated,
        retried = stats.retried,
        dead_lettered = stats.dead_lettered,
        "Reconciliation finished"
    );

    if let Some(Err(e)) = &feed_result {
        warn!(error = %e, "Input ended early; remaining events were not replayed");
    }

    Ok(())
}
