//! Classification pass orchestration.
//!
//! One pass over a batch of content items:
//!   1. Reset the per-pass item cache
//!   2. Group items by key; each key is classified once
//!   3. Apply the direct rules (no network)
//!   4. Pre-fetch: one `resolve_batch` per identifier kind, covering every
//!      identifier of every still-undecided item
//!   5. Classify the remainder concurrently against the warm caches
//!   6. Deduplicate into reference records
//!   7. Emit progress events via broadcast channel
//!
//! Passes on one engine are serialised. Invalidating the engine context
//! aborts the pass in flight and every later one.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use pubflag_common::{PubflagError, Result, TargetConfig};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::CacheManager;
use crate::classifier::{Classifier, ClassifyContext, ItemSignals};
use crate::collaborators::Collaborators;
use crate::dedup::{Deduplicator, ReferenceRecord};
use crate::identifiers::{IdKind, Identifier};
use crate::matcher::TargetMatcher;
use crate::models::{ClassificationResult, ContentItem, ItemKey};
use crate::resolver::{ExternalResolver, ResolverStats};
use crate::sources::idconv::NcbiIdConverter;
use crate::sources::IdConverter;

// ── Progress events ───────────────────────────────────────────────────────────

/// Progress event emitted during a pass (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct PassProgress {
    pub pass_id: Uuid,
    pub stage: String,
    pub message: String,
    pub items_seen: usize,
    pub items_decided: usize,
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: Vec<ReferenceRecord>,
    pub items_seen: usize,
    /// Distinct item keys classified this pass
    pub items_classified: usize,
    /// Items whose key was already classified earlier in the pass
    pub cache_reuses: usize,
    /// Records confirmed as the target publisher
    pub confirmed: usize,
    /// Records flagged as potential only
    pub potential: usize,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn flagged(&self) -> impl Iterator<Item = &ReferenceRecord> {
        self.records.iter().filter(|r| r.is_flagged())
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Owns the caches and the resolver for one document context.
pub struct Engine {
    config: Arc<TargetConfig>,
    cache: Arc<CacheManager>,
    classifier: Classifier,
    resolver: Option<Arc<ExternalResolver>>,
    context: CancellationToken,
    pass_lock: tokio::sync::Mutex<()>,
    progress_tx: Option<broadcast::Sender<PassProgress>>,
}

impl Engine {
    /// Build an engine that resolves identifiers through `converter`.
    pub fn new(config: TargetConfig, converter: Arc<dyn IdConverter>) -> Result<Self> {
        config.validate()?;
        let matcher = Arc::new(TargetMatcher::new(&config)?);
        let cache = Arc::new(CacheManager::new());

        let resolver = config.resolution.enabled.then(|| {
            Arc::new(ExternalResolver::new(converter, cache.clone(), matcher.clone(), &config.resolution))
        });
        if resolver.is_none() {
            info!("External resolution disabled");
        }

        Ok(Self {
            classifier: Classifier::new(matcher, &config),
            config: Arc::new(config),
            cache,
            resolver,
            context: CancellationToken::new(),
            pass_lock: tokio::sync::Mutex::new(()),
            progress_tx: None,
        })
    }

    /// Build an engine backed by the NCBI ID converter.
    pub fn with_ncbi(config: TargetConfig) -> Result<Self> {
        let converter = Arc::new(NcbiIdConverter::new(&config.resolution)?);
        Self::new(config, converter)
    }

    pub fn with_progress(mut self, tx: broadcast::Sender<PassProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn resolver_stats(&self) -> Option<ResolverStats> {
        self.resolver.as_ref().map(|r| r.stats())
    }

    /// Tear down the context: the pass in flight discards its results and
    /// later passes fail with `ContextInvalidated`.
    pub fn invalidate(&self) {
        info!("Engine context invalidated");
        self.context.cancel();
    }

    pub fn is_valid(&self) -> bool {
        !self.context.is_cancelled()
    }

    pub fn context(&self) -> CancellationToken {
        self.context.clone()
    }

    fn emit(&self, pass_id: Uuid, stage: &str, message: String, items_seen: usize, items_decided: usize) {
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(PassProgress {
                pass_id,
                stage: stage.to_string(),
                message,
                items_seen,
                items_decided,
            });
        }
    }

    /// Classify and deduplicate one batch of items.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn run_pass(&self, items: Vec<ContentItem>) -> Result<PassReport> {
        if !self.is_valid() {
            return Err(PubflagError::ContextInvalidated);
        }
        let _pass = self.pass_lock.lock().await;

        let pass_id = Uuid::new_v4();
        let started_at = Utc::now();
        let t0 = std::time::Instant::now();
        info!(pass_id = %pass_id, "Starting classification pass");

        self.cache.begin_pass();

        // ── 1. Direct rules, once per key ────────────────────────────────────
        let keys: Vec<ItemKey> = items.iter().map(ContentItem::key).collect();
        let mut seen: HashSet<&ItemKey> = HashSet::new();
        let mut pending: Vec<(&ItemKey, &ContentItem, ItemSignals)> = Vec::new();
        let mut cache_reuses = 0usize;

        for (item, key) in items.iter().zip(&keys) {
            if !seen.insert(key) {
                cache_reuses += 1;
                continue;
            }
            let signals = ItemSignals::extract(item);
            match self.classifier.direct(&signals) {
                Some(result) => self.cache.put_item_result(key.clone(), result),
                None => pending.push((key, item, signals)),
            }
        }
        let items_classified = seen.len();
        let decided_direct = items_classified - pending.len();
        self.emit(
            pass_id,
            "direct",
            format!("{decided_direct} of {items_classified} items decided by direct rules"),
            items.len(),
            decided_direct,
        );

        // ── 2. Pre-fetch lookups for undecided items ─────────────────────────
        let resolved = match self.prefetch(&pending).await {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.abort(e)),
        };
        self.emit(
            pass_id,
            "prefetch",
            format!("{} identifiers resolved", resolved.len()),
            items.len(),
            decided_direct,
        );

        // ── 3. Remaining rules, bounded concurrency ──────────────────────────
        let ctx = ClassifyContext {
            resolved: &resolved,
            cache: &self.cache,
            resolver: self.resolver.as_deref(),
            cancel: &self.context,
        };
        let ctx = &ctx;
        let pending_futures: Vec<BoxFuture<'_, (&ItemKey, Result<ClassificationResult>)>> = pending
            .into_iter()
            .map(|(key, item, signals)| self.classify_pending(key, item, signals, ctx))
            .collect();
        let outcomes: Vec<(&ItemKey, Result<ClassificationResult>)> = stream::iter(pending_futures)
            .buffer_unordered(self.config.pass.item_concurrency.max(1))
            .collect()
            .await;

        for (key, outcome) in outcomes {
            match outcome {
                Ok(result) => self.cache.put_item_result(key.clone(), result),
                Err(e) => return Err(self.abort(e)),
            }
        }
        if !self.is_valid() {
            return Err(self.abort(PubflagError::ContextInvalidated));
        }

        // ── 4. Deduplicate ───────────────────────────────────────────────────
        let mut dedup = Deduplicator::new(self.config.pass.text_key_length);
        for (item, key) in items.iter().zip(&keys) {
            let result = self.cache.get_item_result(key).unwrap_or_else(ClassificationResult::no_signal);
            dedup.add(item, result);
        }
        let records = dedup.finalize();

        let confirmed = records.iter().filter(|r| r.result.is_target_publisher).count();
        let potential = records.iter().filter(|r| r.result.is_potential).count();
        let report = PassReport {
            pass_id,
            started_at,
            items_seen: items.len(),
            items_classified,
            cache_reuses,
            confirmed,
            potential,
            duration_ms: t0.elapsed().as_millis() as u64,
            records,
        };

        info!(
            pass_id = %pass_id,
            records = report.records.len(),
            confirmed,
            potential,
            duration_ms = report.duration_ms,
            "Classification pass complete"
        );
        self.emit(
            pass_id,
            "done",
            format!("{} records, {} confirmed, {} potential", report.records.len(), confirmed, potential),
            report.items_seen,
            items_classified,
        );
        Ok(report)
    }

    /// Collect items from the source, classify them and hand the records to
    /// the styler (and reporter, if any).
    pub async fn run_with(&self, collaborators: &Collaborators) -> Result<PassReport> {
        collaborators.validate()?;
        let (Some(source), Some(styler)) = (&collaborators.items, &collaborators.styler) else {
            return Err(PubflagError::MissingCollaborator("item source"));
        };

        let items = source.collect_items().await?;
        let report = self.run_pass(items).await?;

        styler.apply(&report.records, self.config.mode)?;
        if let Some(reporter) = &collaborators.reporter {
            reporter.report(&report);
        }
        Ok(report)
    }

    fn classify_pending<'a>(
        &'a self,
        key: &'a ItemKey,
        item: &'a ContentItem,
        signals: ItemSignals,
        ctx: &'a ClassifyContext<'a>,
    ) -> BoxFuture<'a, (&'a ItemKey, Result<ClassificationResult>)> {
        async move { (key, self.classifier.classify_with(item, &signals, ctx).await) }.boxed()
    }

    /// One `resolve_batch` per kind over every candidate of the pending items.
    async fn prefetch(&self, pending: &[(&ItemKey, &ContentItem, ItemSignals)]) -> Result<HashMap<Identifier, bool>> {
        let Some(resolver) = &self.resolver else {
            return Ok(HashMap::new());
        };

        let mut by_kind: BTreeMap<IdKind, Vec<Identifier>> = BTreeMap::new();
        for (_, _, signals) in pending {
            for id in signals.candidates() {
                let ids = by_kind.entry(id.kind()).or_default();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }

        let mut resolved = HashMap::new();
        for (kind, ids) in by_kind {
            debug!(kind = kind.as_str(), n = ids.len(), "Pre-fetching identifiers");
            resolved.extend(resolver.resolve_batch(&ids, kind, &self.context).await?);
        }
        Ok(resolved)
    }

    /// Drop this pass's partial results.
    fn abort(&self, e: PubflagError) -> PubflagError {
        warn!(error = %e, "Pass aborted, discarding partial results");
        self.cache.begin_pass();
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleSource;
    use crate::sources::IdRecord;
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl IdConverter for Offline {
        async fn convert(&self, _kind: IdKind, _ids: &[String]) -> Result<Vec<IdRecord>> {
            Err(PubflagError::Lookup("offline".to_string()))
        }
    }

    fn engine() -> Engine {
        Engine::new(TargetConfig::default(), Arc::new(Offline)).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_keys_are_classified_once() {
        let engine = engine();
        let item = ContentItem::new("x").with_link("https://www.mdpi.com/a").with_item_id("c1");
        let report = engine.run_pass(vec![item.clone(), item.clone(), item]).await.unwrap();

        assert_eq!(report.items_seen, 3);
        assert_eq!(report.items_classified, 1);
        assert_eq!(report.cache_reuses, 2);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].result.source, RuleSource::DomainLink);
        assert_eq!(report.confirmed, 1);
    }

    #[tokio::test]
    async fn test_invalidated_engine_refuses_passes() {
        let engine = engine();
        engine.invalidate();
        let err = engine.run_pass(vec![ContentItem::new("x")]).await.unwrap_err();
        assert!(matches!(err, PubflagError::ContextInvalidated));
    }

    #[tokio::test]
    async fn test_progress_events() {
        let (tx, mut rx) = broadcast::channel(16);
        let engine = engine().with_progress(tx);
        engine.run_pass(vec![ContentItem::new("plain text")]).await.unwrap();

        let mut stages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            stages.push(event.stage);
        }
        assert_eq!(stages, vec!["direct", "prefetch", "done"]);
    }

    #[tokio::test]
    async fn test_prefetch_event_counts_direct_decisions() {
        let (tx, mut rx) = broadcast::channel(16);
        let engine = engine().with_progress(tx);
        let items = vec![
            ContentItem::new("a").with_link("https://www.mdpi.com/a"),
            ContentItem::new("b").with_link("https://doi.org/10.1016/j.x.1"),
            ContentItem::new("plain text"),
        ];
        engine.run_pass(items).await.unwrap();

        let mut decided = Vec::new();
        while let Ok(event) = rx.try_recv() {
            decided.push((event.stage, event.items_decided));
        }
        assert_eq!(
            decided,
            vec![("direct".to_string(), 2), ("prefetch".to_string(), 2), ("done".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn test_disabled_resolution_skips_lookups() {
        let mut config = TargetConfig::default();
        config.resolution.enabled = false;
        let engine = Engine::new(config, Arc::new(Offline)).unwrap();

        let report = engine.run_pass(vec![ContentItem::new("PMID: 33383772")]).await.unwrap();
        assert_eq!(report.records[0].result, ClassificationResult::no_signal());
        assert!(engine.resolver_stats().is_none());
    }
}
