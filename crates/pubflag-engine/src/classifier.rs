//! Content classification.
//!
//! Rules are evaluated in strict precedence; the first one that produces a
//! result wins:
//!
//! 1. a link to the publisher domain                      → target
//! 2. a link carrying a DOI with the target prefix        → target
//! 3. a link carrying a DOI with any other prefix         → not target
//! 4. a DOI with the target prefix in the visible text    → target
//! 5. a resolved identifier answering true                → target
//! 6. strong journal name, or weak one in citation context → target
//! 7. potential-match keyword (advisory)                  → potential
//!
//! Rules 1–4 need nothing but the item and run synchronously. Rule 5 may
//! consult the external resolver.

use std::collections::HashMap;
use std::sync::Arc;

use pubflag_common::{PubflagError, Result, TargetConfig};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::CacheManager;
use crate::identifiers::{self, IdKind, Identifier};
use crate::matcher::TargetMatcher;
use crate::models::{ClassificationResult, ContentItem, RuleSource};
use crate::resolver::ExternalResolver;

/// Identifier and host evidence pulled out of one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemSignals {
    pub hosts: Vec<String>,
    /// Identifiers carried by links, in link order
    pub link_ids: Vec<Identifier>,
    /// Identifiers mentioned in the visible text
    pub text_ids: Vec<Identifier>,
}

impl ItemSignals {
    pub fn extract(item: &ContentItem) -> Self {
        let mut signals = Self::default();
        for href in &item.links {
            if let Some(host) = identifiers::link_host(href) {
                signals.hosts.push(host);
            }
            if let Some(id) = identifiers::extract_from_link(href) {
                if !signals.link_ids.contains(&id) {
                    signals.link_ids.push(id);
                }
            }
        }
        signals.text_ids = identifiers::extract_all_in_text(&item.text);
        signals
    }

    fn link_dois(&self) -> impl Iterator<Item = &Identifier> {
        self.link_ids.iter().filter(|id| id.kind() == IdKind::Doi)
    }

    fn text_dois(&self) -> impl Iterator<Item = &Identifier> {
        self.text_ids.iter().filter(|id| id.kind() == IdKind::Doi)
    }

    /// Link PMIDs/PMCIDs, then every text identifier, without repeats.
    pub fn candidates(&self) -> Vec<Identifier> {
        let mut out: Vec<Identifier> = Vec::new();
        let from_links = self.link_ids.iter().filter(|id| id.kind() != IdKind::Doi);
        for id in from_links.chain(self.text_ids.iter()) {
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
        out
    }
}

// ── Direct rules ──────────────────────────────────────────────────────────────

type DirectRule = fn(&ItemSignals, &TargetMatcher) -> Option<ClassificationResult>;

const DIRECT_RULES: [DirectRule; 4] = [
    domain_link,
    target_doi_link,
    competing_doi_link,
    target_doi_in_text,
];

fn domain_link(signals: &ItemSignals, matcher: &TargetMatcher) -> Option<ClassificationResult> {
    signals
        .hosts
        .iter()
        .any(|host| matcher.is_target_host(host))
        .then(|| ClassificationResult::confirmed(RuleSource::DomainLink))
}

fn target_doi_link(signals: &ItemSignals, matcher: &TargetMatcher) -> Option<ClassificationResult> {
    signals
        .link_dois()
        .any(|doi| matcher.is_target_doi(doi))
        .then(|| ClassificationResult::confirmed(RuleSource::DoiLink))
}

/// A DOI link to another registrant is authoritative evidence against.
fn competing_doi_link(signals: &ItemSignals, _matcher: &TargetMatcher) -> Option<ClassificationResult> {
    signals
        .link_dois()
        .next()
        .map(|_| ClassificationResult::rejected(RuleSource::CompetingDoiLink))
}

fn target_doi_in_text(signals: &ItemSignals, matcher: &TargetMatcher) -> Option<ClassificationResult> {
    signals
        .text_dois()
        .any(|doi| matcher.is_target_doi(doi))
        .then(|| ClassificationResult::confirmed(RuleSource::TextDoi))
}

// ── Classifier ────────────────────────────────────────────────────────────────

/// Everything rule 5 may consult while classifying one item.
pub struct ClassifyContext<'a> {
    /// Answers fetched ahead of classification for this pass
    pub resolved: &'a HashMap<Identifier, bool>,
    pub cache: &'a CacheManager,
    /// `None` when external resolution is disabled
    pub resolver: Option<&'a ExternalResolver>,
    pub cancel: &'a CancellationToken,
}

pub struct Classifier {
    matcher: Arc<TargetMatcher>,
    potential_matches: bool,
}

impl Classifier {
    pub fn new(matcher: Arc<TargetMatcher>, config: &TargetConfig) -> Self {
        Self { matcher, potential_matches: config.potential_matches }
    }

    pub fn matcher(&self) -> &Arc<TargetMatcher> {
        &self.matcher
    }

    /// Rules 1–4. `None` means the item needs the later rules.
    pub fn classify_direct(&self, item: &ContentItem) -> Option<ClassificationResult> {
        self.direct(&ItemSignals::extract(item))
    }

    /// Rules 1–4 over signals already extracted from an item.
    pub fn direct(&self, signals: &ItemSignals) -> Option<ClassificationResult> {
        DIRECT_RULES.iter().find_map(|rule| rule(signals, &self.matcher))
    }

    /// Identifiers rule 5 would look up for an item the direct rules left
    /// undecided: link PMIDs/PMCIDs and every text identifier.
    pub fn resolution_candidates(&self, item: &ContentItem) -> Vec<Identifier> {
        let signals = ItemSignals::extract(item);
        if self.direct(&signals).is_some() {
            return vec![];
        }
        signals.candidates()
    }

    /// Run all rules against one item.
    ///
    /// The only error is `ContextInvalidated`, raised when the context is
    /// cancelled while a lookup is in flight.
    pub async fn classify(&self, item: &ContentItem, ctx: &ClassifyContext<'_>) -> Result<ClassificationResult> {
        self.classify_with(item, &ItemSignals::extract(item), ctx).await
    }

    /// `classify` with the item's signals supplied by the caller.
    pub async fn classify_with(
        &self,
        item: &ContentItem,
        signals: &ItemSignals,
        ctx: &ClassifyContext<'_>,
    ) -> Result<ClassificationResult> {
        if let Some(result) = self.direct(signals) {
            return Ok(result);
        }

        if self.resolves_to_target(&signals.candidates(), ctx).await? {
            return Ok(ClassificationResult::confirmed(RuleSource::ExternalResolution));
        }

        Ok(self.classify_textual(item))
    }

    async fn resolves_to_target(&self, ids: &[Identifier], ctx: &ClassifyContext<'_>) -> Result<bool> {
        let mut missing: Vec<Identifier> = Vec::new();
        for id in ids {
            match ctx.resolved.get(id).copied().or_else(|| ctx.cache.get(id)) {
                Some(true) => return Ok(true),
                Some(false) => {}
                None => missing.push(id.clone()),
            }
        }

        let Some(resolver) = ctx.resolver else {
            return Ok(false);
        };
        if missing.is_empty() {
            return Ok(false);
        }
        if ctx.cancel.is_cancelled() {
            return Err(PubflagError::ContextInvalidated);
        }

        debug!(n = missing.len(), "Resolving identifiers outside the pass pre-fetch");
        for kind in IdKind::ALL {
            let of_kind: Vec<Identifier> = missing.iter().filter(|id| id.kind() == kind).cloned().collect();
            if of_kind.is_empty() {
                continue;
            }
            let answers = resolver.resolve_batch(&of_kind, kind, ctx.cancel).await?;
            if answers.values().any(|answer| *answer) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Rules 6 and 7.
    fn classify_textual(&self, item: &ContentItem) -> ClassificationResult {
        let markup = if item.html_fragment.trim().is_empty() { &item.text } else { &item.html_fragment };

        if self.matcher.matches_strong_journal(markup) {
            return ClassificationResult::confirmed(RuleSource::StrongJournal);
        }
        if self.matcher.matches_weak_journal(markup) {
            return ClassificationResult::confirmed(RuleSource::WeakJournal);
        }
        if self.potential_matches
            && (self.matcher.matches_potential(&item.text) || self.matcher.matches_potential(&item.html_fragment))
        {
            return ClassificationResult::potential();
        }
        ClassificationResult::no_signal()
    }
}
