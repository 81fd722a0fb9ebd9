//! Memoizes `(unitId, version, targetLang) -> translated text` along with
//! the per-sentence length vectors the translator returned. Evicted
//! wholesale for a root when that root's Unit is evicted from the Unit
//! Store (see `unit_store::put_and_evict`).

use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;

use relay_core::types::root_of;

type Key = (String, u64, String);

#[derive(Debug, Clone)]
pub struct CachedTranslation {
    pub text: String,
    pub src_sent_len: Vec<usize>,
    pub trans_sent_len: Vec<usize>,
}

pub struct TranslationCache {
    entries: LruCache<Key, CachedTranslation>,
    /// Index of unitId -> set of cache keys, so evicting a root is O(entries
    /// for that root) instead of a full scan.
    roots: std::collections::HashMap<String, HashSet<Key>>,
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
            roots: std::collections::HashMap::new(),
        }
    }

    pub fn get(&mut self, unit_id: &str, version: u64, lang: &str) -> Option<CachedTranslation> {
        self.entries
            .get(&(unit_id.to_string(), version, lang.to_string()))
            .cloned()
    }

    pub fn put(&mut self, unit_id: &str, version: u64, lang: &str, translation: CachedTranslation) {
        let key = (unit_id.to_string(), version, lang.to_string());
        self.roots
            .entry(root_of(unit_id).to_string())
            .or_default()
            .insert(key.clone());
        self.entries.put(key, translation);
    }

    /// Drop every cached translation belonging to `root` (called when the
    /// Unit Store evicts that root).
    pub fn evict_root(&mut self, root: &str) {
        if let Some(keys) = self.roots.remove(root) {
            for key in keys {
                self.entries.pop(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
