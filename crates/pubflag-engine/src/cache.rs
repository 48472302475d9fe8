//! Two-tier classification cache.
//!
//! - Persistent identifier cache: identifier → is-target-publisher, lives as
//!   long as the engine and only ever grows. The first answer recorded for an
//!   identifier is final.
//! - Per-pass item cache: item key → last classification result, cleared by
//!   `begin_pass` so every pass recomputes against the current document.
//!
//! Both maps sit behind `RwLock`s so items classified concurrently within a
//! pass can share them.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::warn;

use crate::identifiers::Identifier;
use crate::models::{ClassificationResult, ItemKey};

#[derive(Debug, Default)]
pub struct CacheManager {
    identifiers: RwLock<HashMap<Identifier, bool>>,
    items: RwLock<HashMap<ItemKey, ClassificationResult>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Persistent identifier cache ──────────────────────────────────────────

    pub fn get(&self, id: &Identifier) -> Option<bool> {
        self.identifiers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .copied()
    }

    /// Record an answer unless one already exists; returns the stored answer.
    pub fn put(&self, id: Identifier, is_target: bool) -> bool {
        let mut map = self
            .identifiers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stored = *map.entry(id.clone()).or_insert(is_target);
        if stored != is_target {
            warn!(%id, stored, attempted = is_target, "Ignoring conflicting identifier answer");
        }
        stored
    }

    pub fn identifier_count(&self) -> usize {
        self.identifiers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    // ── Per-pass item cache ───────────────────────────────────────────────────

    pub fn get_item_result(&self, key: &ItemKey) -> Option<ClassificationResult> {
        self.items
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
    }

    pub fn put_item_result(&self, key: ItemKey, result: ClassificationResult) {
        self.items
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, result);
    }

    pub fn item_count(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Start a fresh pass: drop item results, keep identifier answers.
    pub fn begin_pass(&self) {
        self.items
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
