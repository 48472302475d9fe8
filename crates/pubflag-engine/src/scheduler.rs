//! Debounced re-runs on document changes.
//!
//! Triggers are queued on an unbounded channel. A background worker waits
//! until no trigger has arrived for `pass.debounce_ms`, then runs exactly one
//! pass for the whole burst and broadcasts the outcome.

use std::sync::Arc;
use std::time::Duration;

use pubflag_common::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collaborators::Collaborators;
use crate::pipeline::{Engine, PassReport};

/// Why a pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTrigger {
    /// Items were added, removed or changed
    DocumentMutated,
    /// Explicit request, e.g. first load or a settings change
    Requested,
}

#[derive(Debug, Clone)]
pub enum PassOutcome {
    Completed(Arc<PassReport>),
    Failed(String),
}

pub struct PassScheduler {
    trigger_tx: mpsc::UnboundedSender<PassTrigger>,
    outcome_tx: broadcast::Sender<PassOutcome>,
    worker: JoinHandle<()>,
}

enum Quiet {
    Settled,
    Retriggered,
    Closed,
    Invalidated,
}

impl PassScheduler {
    /// Start the worker. Fails straight away if a required collaborator is
    /// missing.
    pub fn spawn(engine: Arc<Engine>, collaborators: Collaborators) -> Result<Self> {
        collaborators.validate()?;

        let (trigger_tx, rx) = mpsc::unbounded_channel::<PassTrigger>();
        let (outcome_tx, _) = broadcast::channel(16);
        let quiet = engine.config().pass.debounce();
        let worker = tokio::spawn(run_worker(engine, collaborators, quiet, rx, outcome_tx.clone()));

        Ok(Self { trigger_tx, outcome_tx, worker })
    }

    pub fn notify(&self, trigger: PassTrigger) {
        if self.trigger_tx.send(trigger).is_err() {
            debug!(?trigger, "Scheduler worker gone, trigger dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PassOutcome> {
        self.outcome_tx.subscribe()
    }

    /// Stop accepting triggers and wait for the worker to exit. A burst
    /// still inside its quiet period is dropped.
    pub async fn shutdown(self) {
        drop(self.trigger_tx);
        let _ = self.worker.await;
    }
}

async fn run_worker(
    engine: Arc<Engine>,
    collaborators: Collaborators,
    quiet: Duration,
    mut rx: mpsc::UnboundedReceiver<PassTrigger>,
    outcome_tx: broadcast::Sender<PassOutcome>,
) {
    let context = engine.context();
    info!(debounce_ms = quiet.as_millis() as u64, "Started pass scheduler worker");

    loop {
        let first = tokio::select! {
            _ = context.cancelled() => break,
            trigger = rx.recv() => trigger,
        };
        let Some(first) = first else { break };
        debug!(trigger = ?first, "Pass requested");

        let mut coalesced = 0usize;
        let settled = loop {
            let next = tokio::select! {
                _ = context.cancelled() => Quiet::Invalidated,
                next = tokio::time::timeout(quiet, rx.recv()) => match next {
                    Ok(Some(_)) => Quiet::Retriggered,
                    Ok(None) => Quiet::Closed,
                    Err(_) => Quiet::Settled,
                },
            };
            match next {
                Quiet::Retriggered => coalesced += 1,
                other => break other,
            }
        };

        if !matches!(settled, Quiet::Settled) {
            break;
        }

        info!(coalesced, "Quiet period elapsed, running pass");
        let outcome = match engine.run_with(&collaborators).await {
            Ok(report) => PassOutcome::Completed(Arc::new(report)),
            Err(e) => {
                warn!(error = %e, "Pass failed");
                PassOutcome::Failed(e.to_string())
            }
        };
        let _ = outcome_tx.send(outcome);
    }

    info!("Pass scheduler worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ItemSource, Styler};
    use crate::dedup::ReferenceRecord;
    use crate::identifiers::IdKind;
    use crate::models::ContentItem;
    use crate::sources::{IdConverter, IdRecord};
    use async_trait::async_trait;
    use pubflag_common::{Mode, PubflagError, TargetConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Offline;

    #[async_trait]
    impl IdConverter for Offline {
        async fn convert(&self, _kind: IdKind, _ids: &[String]) -> Result<Vec<IdRecord>> {
            Err(PubflagError::Lookup("offline".to_string()))
        }
    }

    #[derive(Default)]
    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl ItemSource for CountingSource {
        async fn collect_items(&self) -> anyhow::Result<Vec<ContentItem>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ContentItem::new("x").with_link("https://www.mdpi.com/a")])
        }
    }

    struct NoStyle;

    impl Styler for NoStyle {
        fn apply(&self, _records: &[ReferenceRecord], _mode: Mode) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn engine() -> Arc<Engine> {
        Arc::new(Engine::new(TargetConfig::default(), Arc::new(Offline)).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_one_pass() {
        let source = Arc::new(CountingSource::default());
        let collaborators = Collaborators::new()
            .with_item_source(source.clone())
            .with_styler(Arc::new(NoStyle));
        let scheduler = PassScheduler::spawn(engine(), collaborators).unwrap();
        let mut outcomes = scheduler.subscribe();

        for _ in 0..5 {
            scheduler.notify(PassTrigger::DocumentMutated);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        match outcomes.recv().await.unwrap() {
            PassOutcome::Completed(report) => assert_eq!(report.confirmed, 1),
            PassOutcome::Failed(e) => panic!("pass failed: {e}"),
        }
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_styler_is_fatal() {
        let collaborators = Collaborators::new().with_item_source(Arc::new(CountingSource::default()));
        let err = PassScheduler::spawn(engine(), collaborators).err().unwrap();
        assert!(matches!(err, PubflagError::MissingCollaborator("styler")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_stops_worker() {
        let engine = engine();
        let source = Arc::new(CountingSource::default());
        let collaborators = Collaborators::new()
            .with_item_source(source.clone())
            .with_styler(Arc::new(NoStyle));
        let scheduler = PassScheduler::spawn(engine.clone(), collaborators).unwrap();

        scheduler.notify(PassTrigger::Requested);
        engine.invalidate();
        scheduler.shutdown().await;

        assert_eq!(source.0.load(Ordering::SeqCst), 0);
    }
}
