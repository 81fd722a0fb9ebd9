//! Indexed collection of canonical transcript Units for one room, bounded
//! by an LRU of `root`s. Eviction of a root also clears its cached
//! translations — callers pass in the Translation Cache to evict alongside.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Instant;

use relay_core::types::{Stage, TimeSpan};

use crate::translation_cache::TranslationCache;

#[derive(Debug, Clone)]
pub struct Unit {
    pub unit_id: String,
    pub root: String,
    pub stage: Stage,
    pub version: u64,
    pub text: String,
    pub src_lang: Option<String>,
    pub ts: Option<TimeSpan>,
    pub updated_at: Instant,
    pub tts_final: bool,
}

pub struct UnitStore {
    units: LruCache<String, Unit>,
}

impl UnitStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            units: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
        }
    }

    /// Look up the current Unit for `root` without affecting recency.
    pub fn peek(&self, root: &str) -> Option<&Unit> {
        self.units.peek(root)
    }

    /// Replace (or insert) the Unit for `root`, moving it to most-recently-used.
    /// Implements §4.1 step 5's "delete-then-insert to update LRU recency".
    /// Returns the evicted `(root, Unit)` if inserting this one pushed the
    /// store over capacity — the caller must also evict its cached
    /// translations for that root.
    pub fn put(&mut self, root: String, unit: Unit) -> Option<(String, Unit)> {
        self.units.pop(&root);
        // `push` (not `put`) so a genuine capacity eviction is distinguishable
        // from "this key already existed" — we just popped it above, so any
        // `Some` returned here is the oldest *other* root being evicted.
        self.units.push(root, unit)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }
}

/// Insert `unit` into `store`, evicting the oldest root (and its cached
/// translations from `cache`) if this insertion exceeded the LRU bound.
pub fn put_and_evict(store: &mut UnitStore, cache: &mut TranslationCache, root: String, unit: Unit) {
    if let Some((evicted_root, _)) = store.put(root, unit) {
        cache.evict_root(&evicted_root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(root: &str, version: u64) -> Unit {
        Unit {
            unit_id: root.to_string(),
            root: root.to_string(),
            stage: Stage::Soft,
            version,
            text: "hello".to_string(),
            src_lang: None,
            ts: None,
            updated_at: Instant::now(),
            tts_final: false,
        }
    }

    #[test]
    fn put_then_peek_returns_unit() {
        let mut store = UnitStore::new(4);
        store.put("a".into(), unit("a", 1));
        assert_eq!(store.peek("a").unwrap().version, 1);
    }

    #[test]
    fn replacing_refreshes_recency() {
        let mut store = UnitStore::new(2);
        store.put("a".into(), unit("a", 1));
        store.put("b".into(), unit("b", 1));
        // Touch "a" by replacing it — it becomes most-recently-used.
        store.put("a".into(), unit("a", 2));
        // "b" should now be the least-recently-used and get evicted next.
        let evicted = store.put("c".into(), unit("c", 1));
        assert_eq!(evicted.unwrap().0, "b");
    }

    #[test]
    fn evicting_clears_translation_cache() {
        let mut store = UnitStore::new(1);
        let mut cache = TranslationCache::new(16);
        cache.put(
            "a",
            1,
            "fr",
            crate::translation_cache::CachedTranslation {
                text: "bonjour".to_string(),
                src_sent_len: vec![5],
                trans_sent_len: vec![7],
            },
        );
        put_and_evict(&mut store, &mut cache, "a".into(), unit("a", 1));
        put_and_evict(&mut store, &mut cache, "b".into(), unit("b", 1));
        assert!(store.peek("a").is_none());
        assert!(cache.get("a", 1, "fr").is_none());
    }
}
