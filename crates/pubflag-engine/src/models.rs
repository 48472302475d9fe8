//! Data models shared by the classification pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One visible content item: a citation entry, search snippet, "cited by" or
/// "similar articles" entry. Read-only to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Full visible text
    #[serde(default)]
    pub text: String,
    /// Outbound hrefs, in document order
    #[serde(default)]
    pub links: Vec<String>,
    /// Inner markup, used for journal-name matching
    #[serde(default, rename = "html")]
    pub html_fragment: String,
    /// Stable identity tag assigned by the page-side id collaborator
    #[serde(default)]
    pub item_id: Option<String>,
}

impl ContentItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Default::default() }
    }

    pub fn with_link(mut self, href: impl Into<String>) -> Self {
        self.links.push(href.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_fragment = html.into();
        self
    }

    pub fn with_item_id(mut self, id: impl Into<String>) -> Self {
        self.item_id = Some(id.into());
        self
    }

    /// Cache and dedup identity of this item.
    pub fn key(&self) -> ItemKey {
        match self.item_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => ItemKey::Tagged(id.to_string()),
            _ => ItemKey::Derived(self.fingerprint()),
        }
    }

    /// SHA-256 over text, markup and links, truncated to 128 bits of hex.
    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hasher.update(b"\x1e");
        hasher.update(self.html_fragment.as_bytes());
        for link in &self.links {
            hasher.update(b"\x1f");
            hasher.update(link.as_bytes());
        }
        hasher.finalize()[..16].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Identity of a content item across the caches of one engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ItemKey {
    /// Collaborator-supplied tag
    Tagged(String),
    /// Content fingerprint for untagged items
    Derived(String),
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Tagged(id)  => write!(f, "id:{id}"),
            ItemKey::Derived(fp) => write!(f, "fp:{fp}"),
        }
    }
}

/// Which rule produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleSource {
    DomainLink,
    DoiLink,
    CompetingDoiLink,
    TextDoi,
    ExternalResolution,
    StrongJournal,
    WeakJournal,
    PotentialKeyword,
    NoSignal,
}

impl RuleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSource::DomainLink         => "domain-link",
            RuleSource::DoiLink            => "doi-link",
            RuleSource::CompetingDoiLink   => "competing-doi-link",
            RuleSource::TextDoi            => "text-doi",
            RuleSource::ExternalResolution => "external-resolution",
            RuleSource::StrongJournal      => "strong-journal",
            RuleSource::WeakJournal        => "weak-journal",
            RuleSource::PotentialKeyword   => "potential-keyword",
            RuleSource::NoSignal           => "none",
        }
    }
}

/// Outcome of classifying one item.
///
/// `is_target_publisher` is authoritative. `is_potential` is advisory and is
/// only ever set when no authoritative rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_target_publisher: bool,
    pub is_potential: bool,
    pub source: RuleSource,
}

impl ClassificationResult {
    pub fn confirmed(source: RuleSource) -> Self {
        Self { is_target_publisher: true, is_potential: false, source }
    }

    pub fn rejected(source: RuleSource) -> Self {
        Self { is_target_publisher: false, is_potential: false, source }
    }

    pub fn potential() -> Self {
        Self { is_target_publisher: false, is_potential: true, source: RuleSource::PotentialKeyword }
    }

    pub fn no_signal() -> Self {
        Self::rejected(RuleSource::NoSignal)
    }

    /// A competing DOI link: no later evidence may turn this into a flag
    /// short of a confirmation.
    pub fn is_authoritative_no(&self) -> bool {
        !self.is_flagged() && self.source == RuleSource::CompetingDoiLink
    }

    /// Confirmed or potential; the styler marks these.
    pub fn is_flagged(&self) -> bool {
        self.is_target_publisher || self.is_potential
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_key_wins() {
        let item = ContentItem::new("text").with_item_id("cite-7");
        assert_eq!(item.key(), ItemKey::Tagged("cite-7".to_string()));
        assert_eq!(item.key().to_string(), "id:cite-7");
    }

    #[test]
    fn test_blank_tag_falls_back_to_fingerprint() {
        let item = ContentItem::new("text").with_item_id("  ");
        assert!(matches!(item.key(), ItemKey::Derived(_)));
    }

    #[test]
    fn test_fingerprint_depends_on_links() {
        let a = ContentItem::new("same text");
        let b = ContentItem::new("same text").with_link("https://doi.org/10.3390/x1");
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key(), ContentItem::new("same text").key());
        match a.key() {
            ItemKey::Derived(fp) => assert_eq!(fp.len(), 32),
            other => panic!("unexpected key {other:?}"),
        }
    }

    #[test]
    fn test_fingerprint_depends_on_markup() {
        let plain = ContentItem::new("Kim S. Cells 2021").with_html("Kim S. Cells 2021");
        let emphasised = ContentItem::new("Kim S. Cells 2021").with_html("Kim S. <i>Cells</i> 2021");
        assert_ne!(plain.key(), emphasised.key());
    }

    #[test]
    fn test_item_json_shape() {
        let item: ContentItem = serde_json::from_str(
            r#"{"text": "A", "links": ["https://x.org"], "html": "<i>Cells</i>"}"#,
        )
        .unwrap();
        assert_eq!(item.html_fragment, "<i>Cells</i>");
        assert!(item.item_id.is_none());
    }

    #[test]
    fn test_result_flags() {
        assert!(ClassificationResult::confirmed(RuleSource::DoiLink).is_flagged());
        assert!(ClassificationResult::potential().is_flagged());
        assert!(!ClassificationResult::no_signal().is_flagged());
        assert_eq!(RuleSource::ExternalResolution.as_str(), "external-resolution");
    }
}
