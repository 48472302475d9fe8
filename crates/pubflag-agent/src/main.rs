//! pubflag — flags references to a target publisher.
//! Entry point for the agent binary.
//!
//! Usage: pubflag [items.json]
//!
//! The items file is a JSON list of `{"text", "links", "html", "item_id"}`
//! objects. With `agent.watch = true` the file is polled and every change
//! triggers a debounced re-run until Ctrl+C.

mod config;
mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use pubflag_engine::{Collaborators, Engine, PassOutcome, PassScheduler, PassTrigger};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::output::{ConsoleStyler, JsonFileSource, LogReporter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pubflag=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("pubflag starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not load pubflag.toml: {e}");
            warn!("Falling back to built-in defaults.");
            let mut c = config::Config::default();
            c.apply_env();
            c
        }
    };
    info!(
        "Configuration loaded. Publisher: {} ({}, {}), mode: {}, resolution: {}",
        config.target.publisher.name,
        config.target.publisher.domain,
        config.target.publisher.doi_prefix,
        config.target.mode.as_str(),
        if config.target.resolution.enabled { "on" } else { "off" },
    );

    let items_path: PathBuf = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PUBFLAG_ITEMS").ok())
        .or_else(|| config.agent.items_path.clone())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("No items file given. Usage: pubflag <items.json>"))?;

    let engine = Arc::new(Engine::with_ncbi(config.target.clone())?);
    let collaborators = Collaborators::new()
        .with_item_source(Arc::new(JsonFileSource::new(&items_path)))
        .with_styler(Arc::new(ConsoleStyler::new(
            config.target.publisher.name.clone(),
            config.agent.output,
        )))
        .with_reporter(Arc::new(LogReporter));

    let scheduler = PassScheduler::spawn(engine.clone(), collaborators)?;
    let mut outcomes = scheduler.subscribe();
    scheduler.notify(PassTrigger::Requested);

    if !config.agent.watch {
        let outcome = outcomes.recv().await?;
        scheduler.shutdown().await;
        return match outcome {
            PassOutcome::Completed(_) => Ok(()),
            PassOutcome::Failed(e) => Err(anyhow::anyhow!("classification pass failed: {e}")),
        };
    }

    info!(path = %items_path.display(), "Watching items file. Press Ctrl+C to stop.");
    let mut ticker = tokio::time::interval(Duration::from_millis(config.agent.poll_interval_ms.max(50)));
    let mut last_modified = modified(&items_path);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let current = modified(&items_path);
                if current != last_modified {
                    last_modified = current;
                    scheduler.notify(PassTrigger::DocumentMutated);
                }
            }
            outcome = outcomes.recv() => match outcome {
                Ok(PassOutcome::Failed(e)) => warn!("Pass failed: {e}"),
                Ok(PassOutcome::Completed(_)) => {}
                Err(RecvError::Lagged(n)) => warn!("Missed {n} pass outcomes"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("Shutting down");
    engine.invalidate();
    scheduler.shutdown().await;
    if let Some(stats) = engine.resolver_stats() {
        info!(
            cache_hits = stats.cache_hits,
            requested = stats.requested,
            batches = stats.batches,
            failed_batches = stats.failed_batches,
            "Resolver totals"
        );
    }
    Ok(())
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
