//! Shared fixtures and fakes for pubflag tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pubflag_common::{Mode, PubflagError, Result, TargetConfig};
use pubflag_engine::{
    ContentItem, IdConverter, IdKind, IdRecord, Identifier, ItemSource, ReferenceRecord, Styler,
};
use tokio::time::Instant;

// ── Fixtures ──────────────────────────────────────────────────────────────────

pub fn item(text: &str) -> ContentItem {
    ContentItem::new(text)
}

pub fn linked(text: &str, href: &str) -> ContentItem {
    ContentItem::new(text).with_link(href)
}

/// Default MDPI target with a short debounce.
pub fn test_config() -> TargetConfig {
    let mut config = TargetConfig::default();
    config.pass.debounce_ms = 50;
    config
}

/// Parse a JSON array of items (`[{"text": ..., "links": [...], "html": ...}]`).
pub fn items_from_json(json: &str) -> Vec<ContentItem> {
    serde_json::from_str(json).expect("fixture JSON must be a list of items")
}

// ── Scripted identifier converter ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConverterCall {
    pub kind: IdKind,
    pub ids: Vec<String>,
    pub at: Instant,
}

/// `IdConverter` answering from canned records, with optional latency and
/// failing calls. Every call is logged.
#[derive(Default)]
pub struct ScriptedConverter {
    records: HashMap<Identifier, IdRecord>,
    failing_calls: HashSet<usize>,
    latency: Option<Duration>,
    calls: Mutex<Vec<ConverterCall>>,
}

impl ScriptedConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `raw` with a record resolving to `doi`.
    pub fn resolves(mut self, kind: IdKind, raw: &str, doi: &str) -> Self {
        let id = Identifier::parse(kind, raw).expect("fixture identifier must be valid");
        let mut record = IdRecord { doi: Some(doi.to_string()), ..Default::default() };
        set_identifier(&mut record, &id);
        self.records.insert(id, record);
        self
    }

    /// Answer `raw` with a DOI-less record carrying only a journal title.
    pub fn journal(mut self, kind: IdKind, raw: &str, journal: &str) -> Self {
        let id = Identifier::parse(kind, raw).expect("fixture identifier must be valid");
        let mut record = IdRecord { journal: Some(journal.to_string()), ..Default::default() };
        set_identifier(&mut record, &id);
        self.records.insert(id, record);
        self
    }

    /// Make the `n`th call (0-based) fail.
    pub fn fail_call(mut self, n: usize) -> Self {
        self.failing_calls.insert(n);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<ConverterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Total identifiers requested over all calls.
    pub fn requested(&self) -> usize {
        self.calls.lock().unwrap().iter().map(|c| c.ids.len()).sum()
    }
}

fn set_identifier(record: &mut IdRecord, id: &Identifier) {
    let value = Some(id.value().to_string());
    match id.kind() {
        IdKind::Doi => record.doi = record.doi.clone().or(value),
        IdKind::Pmid => record.pmid = value,
        IdKind::Pmcid => record.pmcid = value,
    }
}

#[async_trait]
impl IdConverter for ScriptedConverter {
    async fn convert(&self, kind: IdKind, ids: &[String]) -> Result<Vec<IdRecord>> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(ConverterCall { kind, ids: ids.to_vec(), at: Instant::now() });
            calls.len() - 1
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing_calls.contains(&index) {
            return Err(PubflagError::Lookup(format!("scripted failure on call {index}")));
        }
        Ok(ids
            .iter()
            .filter_map(|raw| Identifier::parse(kind, raw))
            .filter_map(|id| self.records.get(&id).cloned())
            .collect())
    }
}

// ── Collaborators ─────────────────────────────────────────────────────────────

/// Item source whose contents tests can swap between passes.
#[derive(Default)]
pub struct VecSource {
    items: Mutex<Vec<ContentItem>>,
}

impl VecSource {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self { items: Mutex::new(items) }
    }

    pub fn replace(&self, items: Vec<ContentItem>) {
        *self.items.lock().unwrap() = items;
    }
}

#[async_trait]
impl ItemSource for VecSource {
    async fn collect_items(&self) -> anyhow::Result<Vec<ContentItem>> {
        Ok(self.items.lock().unwrap().clone())
    }
}

/// Styler that remembers what it was asked to apply.
#[derive(Default)]
pub struct RecordingStyler {
    applied: Mutex<Vec<(Vec<ReferenceRecord>, Mode)>>,
}

impl RecordingStyler {
    pub fn applications(&self) -> usize {
        self.applied.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<(Vec<ReferenceRecord>, Mode)> {
        self.applied.lock().unwrap().last().cloned()
    }
}

impl Styler for RecordingStyler {
    fn apply(&self, records: &[ReferenceRecord], mode: Mode) -> anyhow::Result<()> {
        self.applied.lock().unwrap().push((records.to_vec(), mode));
        Ok(())
    }
}
