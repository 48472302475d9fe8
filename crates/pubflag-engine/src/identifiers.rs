//! Identifier extraction from hyperlinks and free text.
//!
//! Pure functions: no state, no network. Every extractor returns `None` (or
//! an empty list) rather than a half-parsed identifier, so callers never see
//! a malformed DOI/PMID/PMCID.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Redirect parameters that carry the real link target.
const REDIRECT_PARAMS: &[&str] = &["url", "doi", "q"];
const MAX_REDIRECT_DEPTH: usize = 3;

/// Landing-page suffixes publishers append after the DOI in their URLs.
const DOI_URL_SUFFIXES: &[&str] = &["/full", "/abstract", "/pdf", "/epdf", "/html", ".pdf"];

lazy_static! {
    // 10.<registrant>/<suffix>; stops at whitespace, quotes, brackets and URL delimiters
    static ref DOI_REGEX: Regex = Regex::new(
        r#"(?i)\b10\.\d{4,9}/[^\s"'<>\[\]{}?#&,;]+"#
    ).unwrap();

    static ref DOI_SHAPE: Regex = Regex::new(r"^10\.\d{4,9}/\S+$").unwrap();

    static ref PMID_URL_REGEX: Regex = Regex::new(
        r"(?i)(?:pubmed\.ncbi\.nlm\.nih\.gov/|ncbi\.nlm\.nih\.gov/pubmed/|europepmc\.org/(?:abstract|article)/med/)(\d{1,8})\b"
    ).unwrap();

    static ref PMCID_URL_REGEX: Regex = Regex::new(
        r"(?i)(?:ncbi\.nlm\.nih\.gov/pmc/articles/|pmc\.ncbi\.nlm\.nih\.gov/articles/|europepmc\.org/(?:abstract|article)/pmc/)(pmc\d{1,9})\b"
    ).unwrap();

    static ref PMID_TEXT_REGEX: Regex = Regex::new(r"(?i)\bPMID:?\s*(\d{1,8})\b").unwrap();

    static ref PMCID_TEXT_REGEX: Regex = Regex::new(r"(?i)\b(PMC\d{4,9})\b").unwrap();
}

// ── Identifier ────────────────────────────────────────────────────────────────

/// Identifier schemes understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    Doi,
    Pmid,
    Pmcid,
}

impl IdKind {
    pub const ALL: [IdKind; 3] = [IdKind::Doi, IdKind::Pmid, IdKind::Pmcid];

    /// Value of the lookup service's `idtype` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKind::Doi   => "doi",
            IdKind::Pmid  => "pmid",
            IdKind::Pmcid => "pmcid",
        }
    }
}

/// A validated, normalised scholarly identifier.
///
/// Fields are private: the only way to obtain one is through a constructor
/// that normalises and shape-checks the raw value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Identifier {
    kind: IdKind,
    value: String,
}

impl Identifier {
    /// DOI, lower-cased with URL suffixes and trailing punctuation removed.
    pub fn doi(raw: &str) -> Option<Self> {
        normalize_doi(raw).map(|value| Self { kind: IdKind::Doi, value })
    }

    /// PMID, 1–8 digits.
    pub fn pmid(raw: &str) -> Option<Self> {
        let digits = raw.trim();
        let valid = (1..=8).contains(&digits.len())
            && digits.chars().all(|c| c.is_ascii_digit())
            && digits.chars().any(|c| c != '0');
        valid.then(|| Self { kind: IdKind::Pmid, value: digits.to_string() })
    }

    /// PMCID, upper-cased and always carrying the `PMC` prefix.
    pub fn pmcid(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        let digits = upper.strip_prefix("PMC").unwrap_or(&upper);
        let valid = (1..=9).contains(&digits.len())
            && digits.chars().all(|c| c.is_ascii_digit())
            && digits.chars().any(|c| c != '0');
        valid.then(|| Self { kind: IdKind::Pmcid, value: format!("PMC{digits}") })
    }

    pub fn parse(kind: IdKind, raw: &str) -> Option<Self> {
        match kind {
            IdKind::Doi   => Self::doi(raw),
            IdKind::Pmid  => Self::pmid(raw),
            IdKind::Pmcid => Self::pmcid(raw),
        }
    }

    pub fn kind(&self) -> IdKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Registrant prefix of a DOI (`10.3390` for `10.3390/ijms22010001`).
    pub fn doi_prefix(&self) -> Option<&str> {
        match self.kind {
            IdKind::Doi => self.value.split('/').next(),
            _ => None,
        }
    }

    /// True when this is a DOI under `prefix` (compared case-insensitively).
    pub fn has_doi_prefix(&self, prefix: &str) -> bool {
        self.doi_prefix()
            .map(|p| p.eq_ignore_ascii_case(prefix.trim()))
            .unwrap_or(false)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.value)
    }
}

// ── Normalisation ─────────────────────────────────────────────────────────────

/// Normalise a DOI candidate; `None` if nothing DOI-shaped remains.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let found = DOI_REGEX.find(raw)?;
    let mut doi = found.as_str().to_ascii_lowercase();

    loop {
        let before = doi.len();
        trim_trailing_punctuation(&mut doi);
        for suffix in DOI_URL_SUFFIXES {
            if doi.ends_with(suffix) {
                doi.truncate(doi.len() - suffix.len());
            }
        }
        if doi.len() == before {
            break;
        }
    }

    DOI_SHAPE.is_match(&doi).then_some(doi)
}

/// Remove punctuation a sentence or markup wrapped around the DOI.
/// A closing parenthesis stays when it balances one inside the DOI.
fn trim_trailing_punctuation(doi: &mut String) {
    while let Some(c) = doi.chars().last() {
        let unbalanced_paren = c == ')' && doi.matches('(').count() < doi.matches(')').count();
        if matches!(c, '.' | ':' | '\'' | '"') || unbalanced_paren {
            doi.pop();
        } else {
            break;
        }
    }
}

// ── URL handling ──────────────────────────────────────────────────────────────

/// Follow redirect-style links (`?url=`, `?doi=`, `?q=`) to the embedded target.
///
/// Returns the input unchanged when it is not a URL or carries no redirect.
pub fn unwrap_redirect(href: &str) -> String {
    let mut current = href.trim().to_string();
    for _ in 0..MAX_REDIRECT_DEPTH {
        let Ok(parsed) = Url::parse(&current) else { break };
        let target = parsed.query_pairs().find_map(|(key, value)| {
            let key = key.to_ascii_lowercase();
            let value = value.trim().to_string();
            if !REDIRECT_PARAMS.contains(&key.as_str()) || value.is_empty() {
                return None;
            }
            let usable = key == "doi" || value.starts_with("http") || value.starts_with("10.");
            usable.then_some(value)
        });
        match target {
            Some(next) if next != current => current = next,
            _ => break,
        }
    }
    current
}

/// Host of the link target (after redirect unwrapping), lower-cased.
pub fn link_host(href: &str) -> Option<String> {
    let target = unwrap_redirect(href);
    let parsed = Url::parse(&target).ok()?;
    parsed.host_str().map(|h| h.trim_end_matches('.').to_ascii_lowercase())
}

/// Percent-decode a link. A decoding failure makes the link unusable for
/// identifier extraction rather than producing a garbled identifier.
fn decode_link(href: &str) -> Option<String> {
    urlencoding::decode(href).ok().map(|s| s.into_owned())
}

// ── Extractors ────────────────────────────────────────────────────────────────

/// Extract a DOI from a URL or a short string such as `doi:10.3390/x`.
pub fn extract_doi(url_or_text: &str) -> Option<Identifier> {
    let target = unwrap_redirect(url_or_text);
    let decoded = decode_link(&target)?;
    Identifier::doi(&decoded)
}

/// Extract a PMID from a PubMed / Europe PMC URL.
pub fn extract_pmid(url: &str) -> Option<Identifier> {
    let target = unwrap_redirect(url);
    let decoded = decode_link(&target)?;
    PMID_URL_REGEX
        .captures(&decoded)
        .and_then(|cap| cap.get(1))
        .and_then(|m| Identifier::pmid(m.as_str()))
}

/// Extract a PMCID from a PMC / Europe PMC URL.
pub fn extract_pmcid(url: &str) -> Option<Identifier> {
    let target = unwrap_redirect(url);
    let decoded = decode_link(&target)?;
    PMCID_URL_REGEX
        .captures(&decoded)
        .and_then(|cap| cap.get(1))
        .and_then(|m| Identifier::pmcid(m.as_str()))
}

/// Extract whichever identifier a link carries, DOI first.
pub fn extract_from_link(href: &str) -> Option<Identifier> {
    extract_doi(href)
        .or_else(|| extract_pmcid(href))
        .or_else(|| extract_pmid(href))
}

/// All DOIs in free text, in first-seen order without repeats.
pub fn extract_dois_in_text(text: &str) -> Vec<Identifier> {
    dedup_in_order(DOI_REGEX.find_iter(text).filter_map(|m| Identifier::doi(m.as_str())))
}

/// All `PMID: n` mentions in free text.
pub fn extract_pmids_in_text(text: &str) -> Vec<Identifier> {
    dedup_in_order(
        PMID_TEXT_REGEX
            .captures_iter(text)
            .filter_map(|cap| cap.get(1))
            .filter_map(|m| Identifier::pmid(m.as_str())),
    )
}

/// All `PMCnnnn` mentions in free text.
pub fn extract_pmcids_in_text(text: &str) -> Vec<Identifier> {
    dedup_in_order(
        PMCID_TEXT_REGEX
            .captures_iter(text)
            .filter_map(|cap| cap.get(1))
            .filter_map(|m| Identifier::pmcid(m.as_str())),
    )
}

/// Every identifier in free text: DOIs, then PMCIDs, then PMIDs.
pub fn extract_all_in_text(text: &str) -> Vec<Identifier> {
    let mut all = extract_dois_in_text(text);
    all.extend(extract_pmcids_in_text(text));
    all.extend(extract_pmids_in_text(text));
    all
}

fn dedup_in_order(ids: impl Iterator<Item = Identifier>) -> Vec<Identifier> {
    let mut out: Vec<Identifier> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
