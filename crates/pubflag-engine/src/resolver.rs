//! External identifier resolution.
//!
//! Turns identifiers that carry no publisher evidence by themselves (PMIDs,
//! PMCIDs, foreign-prefix DOIs found in text) into is-target answers by asking
//! the conversion service. Answers land in the persistent identifier cache,
//! so each identifier is looked up at most once per engine lifetime.
//!
//! Service calls are serialised through a single gate and spaced at least
//! `inter_batch_delay` apart, measured start to start.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pubflag_common::{PubflagError, ResolutionConfig, Result};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::CacheManager;
use crate::identifiers::{IdKind, Identifier};
use crate::matcher::TargetMatcher;
use crate::sources::{IdConverter, IdRecord};

/// Running counters, readable at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Identifiers answered from the persistent cache
    pub cache_hits: u64,
    /// Identifiers sent to the service
    pub requested: u64,
    pub batches: u64,
    pub failed_batches: u64,
    /// Identifiers that got a `false` because the service had no usable record
    pub defaulted: u64,
}

pub struct ExternalResolver {
    converter: Arc<dyn IdConverter>,
    cache: Arc<CacheManager>,
    matcher: Arc<TargetMatcher>,
    max_batch_size: usize,
    inter_batch_delay: Duration,
    /// Start of the most recent service call
    last_call: tokio::sync::Mutex<Option<Instant>>,
    stats: Mutex<ResolverStats>,
}

impl ExternalResolver {
    pub fn new(
        converter: Arc<dyn IdConverter>,
        cache: Arc<CacheManager>,
        matcher: Arc<TargetMatcher>,
        config: &ResolutionConfig,
    ) -> Self {
        Self {
            converter,
            cache,
            matcher,
            max_batch_size: config.max_batch_size.max(1),
            inter_batch_delay: config.inter_batch_delay(),
            last_call: tokio::sync::Mutex::new(None),
            stats: Mutex::new(ResolverStats::default()),
        }
    }

    pub fn stats(&self) -> ResolverStats {
        *self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resolve `ids` of one `kind` to is-target answers.
    ///
    /// Every requested identifier of that kind gets an answer: cached ones
    /// short-circuit, failed batches and identifiers missing from the response
    /// default to `false`. Identifiers of another kind are skipped.
    ///
    /// If `cancel` fires, the batch in flight is allowed to finish but its
    /// results are dropped without touching the cache.
    #[instrument(skip(self, ids, cancel), fields(kind = kind.as_str(), n = ids.len()))]
    pub async fn resolve_batch(
        &self,
        ids: &[Identifier],
        kind: IdKind,
        cancel: &CancellationToken,
    ) -> Result<HashMap<Identifier, bool>> {
        let mut results = HashMap::new();
        let mut unresolved: Vec<Identifier> = Vec::new();

        for id in ids {
            if id.kind() != kind {
                debug!(%id, "Skipping identifier of another kind");
                continue;
            }
            if results.contains_key(id) || unresolved.contains(id) {
                continue;
            }
            match self.cache.get(id) {
                Some(answer) => {
                    results.insert(id.clone(), answer);
                    self.bump(|s| s.cache_hits += 1);
                }
                None => unresolved.push(id.clone()),
            }
        }

        if unresolved.is_empty() {
            return Ok(results);
        }

        for chunk in unresolved.chunks(self.max_batch_size) {
            let outcome = self.paced_convert(kind, chunk, cancel).await;

            if cancel.is_cancelled() {
                warn!(n = chunk.len(), "Context invalidated, discarding lookup results");
                return Err(PubflagError::ContextInvalidated);
            }

            let answers = match outcome {
                Ok(records) => self.match_records(chunk, &records),
                Err(e) => {
                    warn!(error = %e, n = chunk.len(), "Lookup batch failed, defaulting to not-target");
                    self.bump(|s| {
                        s.failed_batches += 1;
                        s.defaulted += chunk.len() as u64;
                    });
                    chunk.iter().map(|id| (id.clone(), false)).collect()
                }
            };

            for (id, answer) in answers {
                let stored = self.cache.put(id.clone(), answer);
                results.insert(id, stored);
            }
        }

        info!(resolved = results.len(), "Lookup finished");
        Ok(results)
    }

    /// One service call, started no sooner than `inter_batch_delay` after
    /// the previous one.
    async fn paced_convert(
        &self,
        kind: IdKind,
        chunk: &[Identifier],
        cancel: &CancellationToken,
    ) -> Result<Vec<IdRecord>> {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            tokio::time::sleep_until(previous + self.inter_batch_delay).await;
        }
        if cancel.is_cancelled() {
            return Err(PubflagError::ContextInvalidated);
        }
        *last_call = Some(Instant::now());

        self.bump(|s| {
            s.batches += 1;
            s.requested += chunk.len() as u64;
        });
        let values: Vec<String> = chunk.iter().map(|id| id.value().to_string()).collect();
        debug!(kind = kind.as_str(), n = values.len(), "Calling lookup service");
        self.converter.convert(kind, &values).await
    }

    fn match_records(&self, chunk: &[Identifier], records: &[IdRecord]) -> Vec<(Identifier, bool)> {
        chunk
            .iter()
            .map(|id| {
                let record = records.iter().find(|r| !r.is_error() && r.answers(id));
                let answer = match record {
                    Some(record) => self.matcher.record_is_target(record),
                    None => {
                        debug!(%id, "No usable record, defaulting to not-target");
                        self.bump(|s| s.defaulted += 1);
                        false
                    }
                };
                (id.clone(), answer)
            })
            .collect()
    }

    fn bump(&self, update: impl FnOnce(&mut ResolverStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut *stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pubflag_common::TargetConfig;

    /// Answers PMIDs from a fixed table; records every batch it sees.
    struct TableConverter {
        table: HashMap<String, IdRecord>,
        fail: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl TableConverter {
        fn new(entries: &[(&str, &str)]) -> Self {
            let table = entries
                .iter()
                .map(|(pmid, doi)| {
                    let record = IdRecord {
                        pmid: Some(pmid.to_string()),
                        doi: Some(doi.to_string()),
                        ..Default::default()
                    };
                    (pmid.to_string(), record)
                })
                .collect();
            Self { table, fail: false, calls: Mutex::new(vec![]) }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IdConverter for TableConverter {
        async fn convert(&self, _kind: IdKind, ids: &[String]) -> Result<Vec<IdRecord>> {
            self.calls.lock().unwrap().push(ids.to_vec());
            if self.fail {
                return Err(PubflagError::Lookup("HTTP 503".to_string()));
            }
            Ok(ids.iter().filter_map(|id| self.table.get(id).cloned()).collect())
        }
    }

    fn resolver(converter: Arc<TableConverter>, batch: usize) -> (ExternalResolver, Arc<CacheManager>) {
        let config = TargetConfig::default();
        let cache = Arc::new(CacheManager::new());
        let matcher = Arc::new(TargetMatcher::new(&config).unwrap());
        let resolution = ResolutionConfig { max_batch_size: batch, ..config.resolution };
        (ExternalResolver::new(converter, cache.clone(), matcher, &resolution), cache)
    }

    fn pmids(values: &[&str]) -> Vec<Identifier> {
        values.iter().map(|v| Identifier::pmid(v).unwrap()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_answers_every_identifier() {
        let converter = Arc::new(TableConverter::new(&[
            ("1", "10.3390/nu1"),
            ("2", "10.1016/j.x.2"),
        ]));
        let (resolver, cache) = resolver(converter.clone(), 200);
        let ids = pmids(&["1", "2", "3"]);

        let answers = resolver.resolve_batch(&ids, IdKind::Pmid, &CancellationToken::new()).await.unwrap();

        assert_eq!(answers.len(), 3);
        assert_eq!(answers[&ids[0]], true);
        assert_eq!(answers[&ids[1]], false);
        assert_eq!(answers[&ids[2]], false);
        assert_eq!(cache.get(&ids[2]), Some(false));
        assert_eq!(resolver.stats().defaulted, 1);
        assert_eq!(converter.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_identifiers_skip_the_service() {
        let converter = Arc::new(TableConverter::new(&[("1", "10.3390/nu1")]));
        let (resolver, _cache) = resolver(converter.clone(), 200);
        let ids = pmids(&["1"]);
        let cancel = CancellationToken::new();

        resolver.resolve_batch(&ids, IdKind::Pmid, &cancel).await.unwrap();
        let again = resolver.resolve_batch(&ids, IdKind::Pmid, &cancel).await.unwrap();

        assert_eq!(again[&ids[0]], true);
        assert_eq!(converter.calls().len(), 1);
        assert_eq!(resolver.stats().cache_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_and_paces_batches() {
        let converter = Arc::new(TableConverter::new(&[]));
        let (resolver, _cache) = resolver(converter.clone(), 2);
        let ids = pmids(&["1", "2", "3", "4", "5"]);

        let started = Instant::now();
        resolver.resolve_batch(&ids, IdKind::Pmid, &CancellationToken::new()).await.unwrap();

        let sizes: Vec<usize> = converter.calls().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        // two gaps between three calls
        assert!(started.elapsed() >= Duration::from_millis(2 * 334));
        assert_eq!(resolver.stats().batches, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_defaults_to_false() {
        let mut table = TableConverter::new(&[("1", "10.3390/nu1")]);
        table.fail = true;
        let converter = Arc::new(table);
        let (resolver, cache) = resolver(converter, 200);
        let ids = pmids(&["1"]);

        let answers = resolver.resolve_batch(&ids, IdKind::Pmid, &CancellationToken::new()).await.unwrap();

        assert_eq!(answers[&ids[0]], false);
        assert_eq!(cache.get(&ids[0]), Some(false));
        assert_eq!(resolver.stats().failed_batches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_context_leaves_cache_untouched() {
        let converter = Arc::new(TableConverter::new(&[("1", "10.3390/nu1")]));
        let (resolver, cache) = resolver(converter.clone(), 200);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolver.resolve_batch(&pmids(&["1"]), IdKind::Pmid, &cancel).await.unwrap_err();

        assert!(matches!(err, PubflagError::ContextInvalidated));
        assert_eq!(cache.identifier_count(), 0);
        assert!(converter.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_kinds_are_ignored() {
        let converter = Arc::new(TableConverter::new(&[]));
        let (resolver, _cache) = resolver(converter.clone(), 200);
        let ids = vec![Identifier::pmcid("PMC123456").unwrap()];

        let answers = resolver.resolve_batch(&ids, IdKind::Pmid, &CancellationToken::new()).await.unwrap();

        assert!(answers.is_empty());
        assert!(converter.calls().is_empty());
    }
}
