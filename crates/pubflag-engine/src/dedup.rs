//! Merging of classified items that refer to the same work.
//!
//! Items are grouped under a dedup key chosen in stages:
//! Stage 1: resolved DOI (`doi:<normalised doi>`)
//! Stage 2: normalised text prefix (`text:<prefix>`)
//! Stage 3: the item key itself (`id:<tag>` or `fp:<fingerprint>`)
//!
//! The first item seen under a key is the canonical representative.

use std::collections::HashMap;

use serde::Serialize;

use crate::identifiers;
use crate::models::{ClassificationResult, ContentItem, ItemKey};

/// One logical reference and every item that points at it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceRecord {
    pub key: String,
    /// First-seen item
    pub representative: ContentItem,
    /// All member items in first-seen order, representative included
    pub items: Vec<ContentItem>,
    pub item_keys: Vec<ItemKey>,
    pub result: ClassificationResult,
}

impl ReferenceRecord {
    pub fn is_flagged(&self) -> bool {
        self.result.is_flagged()
    }
}

#[derive(Debug)]
pub struct Deduplicator {
    text_key_length: usize,
    records: Vec<ReferenceRecord>,
    index: HashMap<String, usize>,
}

impl Deduplicator {
    pub fn new(text_key_length: usize) -> Self {
        Self { text_key_length: text_key_length.max(1), records: Vec::new(), index: HashMap::new() }
    }

    /// Add a classified item. Flags merge across members: confirmed wins,
    /// then potential; the source follows whichever member set the flag.
    pub fn add(&mut self, item: &ContentItem, result: ClassificationResult) {
        let key = dedup_key(item, self.text_key_length);
        match self.index.get(&key) {
            Some(&at) => {
                let record = &mut self.records[at];
                record.items.push(item.clone());
                record.item_keys.push(item.key());
                record.result = merge(record.result, result);
            }
            None => {
                self.index.insert(key.clone(), self.records.len());
                self.records.push(ReferenceRecord {
                    key,
                    representative: item.clone(),
                    items: vec![item.clone()],
                    item_keys: vec![item.key()],
                    result,
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in the order their first member was added.
    pub fn finalize(self) -> Vec<ReferenceRecord> {
        self.records
    }
}

fn merge(current: ClassificationResult, incoming: ClassificationResult) -> ClassificationResult {
    if incoming.is_target_publisher && !current.is_target_publisher {
        return incoming;
    }
    if current.is_target_publisher {
        return current;
    }
    if incoming.is_authoritative_no() {
        return incoming;
    }
    if incoming.is_potential && !current.is_flagged() && !current.is_authoritative_no() {
        return incoming;
    }
    current
}

/// Dedup key of one item.
pub fn dedup_key(item: &ContentItem, text_key_length: usize) -> String {
    let doi = item
        .links
        .iter()
        .filter_map(|href| identifiers::extract_doi(href))
        .next()
        .or_else(|| identifiers::extract_dois_in_text(&item.text).into_iter().next());
    if let Some(doi) = doi {
        return format!("doi:{}", doi.value());
    }

    let prefix = normalise_text(&item.text, text_key_length);
    if !prefix.is_empty() {
        return format!("text:{prefix}");
    }

    item.key().to_string()
}

/// Lower-case, punctuation to spaces, whitespace collapsed, capped at
/// `max_chars` characters.
fn normalise_text(text: &str, max_chars: usize) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect::<String>().trim_end().to_string()
}
