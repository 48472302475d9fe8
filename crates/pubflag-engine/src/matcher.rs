//! Target-publisher predicates built once from `TargetConfig`.

use pubflag_common::{PubflagError, Result, TargetConfig};
use regex::Regex;

use crate::identifiers::Identifier;
use crate::sources::IdRecord;

#[derive(Debug)]
pub struct TargetMatcher {
    domain: String,
    doi_prefix: String,
    publisher_name: String,
    strong_journal: Option<Regex>,
    weak_emphasised: Option<Regex>,
    weak_cited: Option<Regex>,
    weak_names: Vec<String>,
    potential: Option<Regex>,
}

impl TargetMatcher {
    pub fn new(config: &TargetConfig) -> Result<Self> {
        let vocab = &config.vocabulary;
        let weak = alternation(&vocab.weak_journals);

        Ok(Self {
            domain: config.publisher.domain.trim().trim_start_matches("www.").to_ascii_lowercase(),
            doi_prefix: config.publisher.doi_prefix.trim().to_string(),
            publisher_name: config.publisher.name.trim().to_lowercase(),
            strong_journal: alternation(&vocab.strong_journals)
                .map(|alts| bounded(&alts))
                .transpose()?,
            // <i>Nutrients</i>, <em class="journal">Cells.</em>
            weak_emphasised: weak
                .as_ref()
                .map(|alts| compile(&format!(r"(?i)<(?:i|em)(?:\s[^>]*)?>\s*(?:{alts})\.?\s*</(?:i|em)>")))
                .transpose()?,
            // "Nutrients 2021", "Cells. 2020"
            weak_cited: weak
                .as_ref()
                .map(|alts| compile(&format!(r"(?i)(?:^|\W)(?:{alts})\.?,?\s+(?:19|20)\d{{2}}\b")))
                .transpose()?,
            weak_names: vocab.weak_journals.iter().map(|w| w.trim().to_lowercase()).collect(),
            potential: alternation(&vocab.potential_keywords)
                .map(|alts| bounded(&alts))
                .transpose()?,
        })
    }

    /// Host equals the publisher domain or is one of its subdomains.
    pub fn is_target_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }

    pub fn is_target_doi(&self, id: &Identifier) -> bool {
        id.has_doi_prefix(&self.doi_prefix)
    }

    pub fn matches_strong_journal(&self, markup: &str) -> bool {
        self.strong_journal.as_ref().is_some_and(|re| re.is_match(markup))
    }

    /// Weak names only count in a citation context: an emphasised journal
    /// title or a name followed by a publication year.
    pub fn matches_weak_journal(&self, markup: &str) -> bool {
        self.weak_emphasised.as_ref().is_some_and(|re| re.is_match(markup))
            || self.weak_cited.as_ref().is_some_and(|re| re.is_match(markup))
    }

    pub fn matches_potential(&self, text: &str) -> bool {
        self.potential.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Journal field of a lookup record, e.g. "Int J Mol Sci" or "Sensors (Basel)".
    pub fn journal_is_target(&self, journal: &str) -> bool {
        let lowered = journal.to_lowercase();
        if !self.publisher_name.is_empty() && lowered.contains(&self.publisher_name) {
            return true;
        }
        if lowered.contains(&self.domain) || self.matches_strong_journal(journal) {
            return true;
        }
        let bare = strip_parenthetical(&lowered);
        let bare = bare.trim().trim_end_matches('.');
        self.weak_names.iter().any(|w| w == bare)
    }

    /// A record is the target publisher's when its resolved DOI carries the
    /// target prefix; without a DOI the journal field decides.
    pub fn record_is_target(&self, record: &IdRecord) -> bool {
        match record.resolved_doi() {
            Some(doi) => self.is_target_doi(&doi),
            None => record.journal.as_deref().is_some_and(|j| self.journal_is_target(j)),
        }
    }
}

fn alternation(words: &[String]) -> Option<String> {
    let escaped: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    (!escaped.is_empty()).then(|| escaped.join("|"))
}

/// Case-insensitive match delimited by non-word characters. `\b` is not
/// usable because names like "Int. J. Mol. Sci." end in punctuation.
fn bounded(alts: &str) -> Result<Regex> {
    compile(&format!(r"(?i)(?:^|\W)(?:{alts})(?:\W|$)"))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| PubflagError::Config(format!("vocabulary pattern: {e}")))
}

fn strip_parenthetical(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::IdRecordVersion;

    fn matcher() -> TargetMatcher {
        TargetMatcher::new(&TargetConfig::default()).unwrap()
    }

    #[test]
    fn test_host_matching() {
        let m = matcher();
        assert!(m.is_target_host("mdpi.com"));
        assert!(m.is_target_host("www.MDPI.com"));
        assert!(m.is_target_host("res.mdpi.com."));
        assert!(!m.is_target_host("notmdpi.com"));
        assert!(!m.is_target_host("mdpi.com.evil.org"));
    }

    #[test]
    fn test_strong_journal_bounds() {
        let m = matcher();
        assert!(m.matches_strong_journal("Smith J. <i>Int. J. Mol. Sci.</i> 2021;22:1."));
        assert!(m.matches_strong_journal("int j mol sci 2021"));
        assert!(!m.matches_strong_journal("Int J Mol Science Reviews"));
    }

    #[test]
    fn test_weak_journal_needs_citation_context() {
        let m = matcher();
        assert!(m.matches_weak_journal("Doe A. Vitamin D. <i>Nutrients</i>. 13(1):1"));
        assert!(m.matches_weak_journal("Doe A. Vitamin D. Nutrients 2021, 13, 1."));
        assert!(m.matches_weak_journal("<em class=\"jrnl\">Cells.</em>"));
        assert!(!m.matches_weak_journal("Cells were cultured in nutrients for 48 h."));
    }

    #[test]
    fn test_potential_keywords() {
        let m = matcher();
        assert!(m.matches_potential("MDPI AG, Basel, Switzerland"));
        assert!(!m.matches_potential("mdpifilter"));
    }

    #[test]
    fn test_journal_field() {
        let m = matcher();
        assert!(m.journal_is_target("Int J Mol Sci"));
        assert!(m.journal_is_target("Sensors (Basel)"));
        assert!(m.journal_is_target("Cells."));
        assert!(!m.journal_is_target("Cell"));
        assert!(!m.journal_is_target("Nature"));
    }

    #[test]
    fn test_record_doi_outranks_journal() {
        let m = matcher();
        let record = IdRecord {
            doi: Some("10.1016/j.cell.2020.01.001".to_string()),
            journal: Some("Cells".to_string()),
            ..Default::default()
        };
        assert!(!m.record_is_target(&record));

        let nested = IdRecord {
            versions: vec![IdRecordVersion { doi: Some("10.3390/cells9010001".to_string()), ..Default::default() }],
            ..Default::default()
        };
        assert!(m.record_is_target(&nested));

        let journal_only = IdRecord { journal: Some("Nutrients".to_string()), ..Default::default() };
        assert!(m.record_is_target(&journal_only));
    }

    #[test]
    fn test_empty_vocabulary_never_matches() {
        let mut config = TargetConfig::default();
        config.vocabulary.strong_journals.clear();
        config.vocabulary.weak_journals.clear();
        config.vocabulary.potential_keywords.clear();
        let m = TargetMatcher::new(&config).unwrap();
        assert!(!m.matches_strong_journal("Int J Mol Sci"));
        assert!(!m.matches_weak_journal("<i>Cells</i>"));
        assert!(!m.matches_potential("MDPI"));
    }
}
