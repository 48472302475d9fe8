//! Target publisher configuration.
//!
//! Users define the publisher to flag (domain + DOI prefix), the journal
//! vocabularies used by the textual fallback rules, and how the external
//! identifier lookup is paced. Every field has a default, so an empty TOML
//! document yields a working MDPI configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PubflagError, Result};

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Publisher being flagged
    #[serde(default)]
    pub publisher: PublisherSpec,

    /// Journal-name and keyword vocabularies
    #[serde(default)]
    pub vocabulary: Vocabulary,

    /// External identifier resolution
    #[serde(default)]
    pub resolution: ResolutionConfig,

    /// Enable the advisory "potential match" keyword heuristics
    #[serde(default = "default_true")]
    pub potential_matches: bool,

    /// Styling mode, consumed by the styler collaborator only
    #[serde(default)]
    pub mode: Mode,

    /// Pass scheduling and keying
    #[serde(default)]
    pub pass: PassConfig,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            publisher: PublisherSpec::default(),
            vocabulary: Vocabulary::default(),
            resolution: ResolutionConfig::default(),
            potential_matches: true,
            mode: Mode::default(),
            pass: PassConfig::default(),
        }
    }
}

fn default_true() -> bool { true }

// ── Publisher ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherSpec {
    /// Display name, also matched against lookup-record journal fields
    #[serde(default = "default_publisher_name")]
    pub name: String,

    /// Registrable domain; subdomains match too
    #[serde(default = "default_publisher_domain")]
    pub domain: String,

    /// DOI registrant prefix (e.g. "10.3390")
    #[serde(default = "default_doi_prefix")]
    pub doi_prefix: String,
}

fn default_publisher_name() -> String { "MDPI".to_string() }
fn default_publisher_domain() -> String { "mdpi.com".to_string() }
fn default_doi_prefix() -> String { "10.3390".to_string() }

impl Default for PublisherSpec {
    fn default() -> Self {
        Self {
            name: default_publisher_name(),
            domain: default_publisher_domain(),
            doi_prefix: default_doi_prefix(),
        }
    }
}

// ── Vocabulary ────────────────────────────────────────────────────────────────

/// Small fixed vocabularies for the lowest-confidence rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    /// Journal names that only the target publisher uses
    #[serde(default = "default_strong_journals")]
    pub strong_journals: Vec<String>,

    /// Short journal names that are ambiguous outside a citation context
    #[serde(default = "default_weak_journals")]
    pub weak_journals: Vec<String>,

    /// Keywords that make an item a potential (advisory) match
    #[serde(default = "default_potential_keywords")]
    pub potential_keywords: Vec<String>,
}

fn default_strong_journals() -> Vec<String> {
    [
        "International Journal of Molecular Sciences",
        "Int. J. Mol. Sci.",
        "Int J Mol Sci",
        "International Journal of Environmental Research and Public Health",
        "Int. J. Environ. Res. Public Health",
        "Int J Environ Res Public Health",
        "Journal of Clinical Medicine",
        "J. Clin. Med.",
        "J Clin Med",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_weak_journals() -> Vec<String> {
    [
        "Molecules", "Nutrients", "Cancers", "Cells", "Sensors", "Materials",
        "Sustainability", "Viruses", "Antioxidants", "Biomedicines",
        "Pharmaceutics", "Pharmaceuticals", "Polymers", "Diagnostics",
        "Healthcare", "Microorganisms", "Genes", "Biomolecules", "Vaccines",
        "Toxins", "Marine Drugs", "Remote Sensing", "Energies", "Foods",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_potential_keywords() -> Vec<String> {
    ["MDPI", "Basel, Switzerland"].iter().map(|s| s.to_string()).collect()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            strong_journals: default_strong_journals(),
            weak_journals: default_weak_journals(),
            potential_keywords: default_potential_keywords(),
        }
    }
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// External identifier-conversion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// `tool` parameter sent with every request
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Contact address sent as `email`; NCBI asks for one
    #[serde(default)]
    pub email: Option<String>,

    /// Service-imposed cap on identifiers per request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Minimum spacing between consecutive requests
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://www.ncbi.nlm.nih.gov/pmc/utils/idconv/v1.0/".to_string()
}
fn default_tool() -> String { "pubflag".to_string() }
fn default_max_batch_size() -> usize { 200 }
fn default_inter_batch_delay_ms() -> u64 { 334 }
fn default_request_timeout_secs() -> u64 { 30 }

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            tool: default_tool(),
            email: None,
            max_batch_size: default_max_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ResolutionConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ── Mode ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Highlight,
    Hide,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Highlight => "highlight",
            Mode::Hide      => "hide",
        }
    }
}

// ── Pass ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// Quiet period before a triggered pass starts
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Items classified concurrently within one pass
    #[serde(default = "default_item_concurrency")]
    pub item_concurrency: usize,

    /// Characters of normalised text kept in a dedup text key
    #[serde(default = "default_text_key_length")]
    pub text_key_length: usize,
}

fn default_debounce_ms() -> u64 { 750 }
fn default_item_concurrency() -> usize { 8 }
fn default_text_key_length() -> usize { 100 }

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            item_concurrency: default_item_concurrency(),
            text_key_length: default_text_key_length(),
        }
    }
}

impl PassConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

// ── Helper Methods ─────────────────────────────────────────────────────────────

impl TargetConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PubflagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !is_doi_prefix(&self.publisher.doi_prefix) {
            return Err(PubflagError::Config(format!(
                "publisher.doi_prefix must look like 10.<4-9 digits>, got {:?}",
                self.publisher.doi_prefix
            )));
        }
        let domain = self.publisher.domain.trim();
        if domain.is_empty() || domain.contains("://") || domain.contains('/') {
            return Err(PubflagError::Config(format!(
                "publisher.domain must be a bare host name, got {:?}",
                self.publisher.domain
            )));
        }
        if !(1..=200).contains(&self.resolution.max_batch_size) {
            return Err(PubflagError::Config(format!(
                "resolution.max_batch_size must be within 1..=200, got {}",
                self.resolution.max_batch_size
            )));
        }
        if self.pass.item_concurrency == 0 {
            return Err(PubflagError::Config("pass.item_concurrency must be at least 1".to_string()));
        }
        if self.pass.text_key_length == 0 {
            return Err(PubflagError::Config("pass.text_key_length must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn is_doi_prefix(prefix: &str) -> bool {
    match prefix.strip_prefix("10.") {
        Some(registrant) => {
            (4..=9).contains(&registrant.len()) && registrant.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
