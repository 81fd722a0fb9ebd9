//! Lazy slug -> room handle map. §3 "Created lazily on first use".

use std::sync::Arc;

use dashmap::DashMap;
use relay_engine::room::{self, RoomDeps, RoomHandle};

pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    default_target_langs: Vec<String>,
    deps: Arc<RoomDepsFactory>,
}

/// Builds fresh [`RoomDeps`] per room; each room gets its own `Translator`/
/// `Synthesizer`/`Store` trait objects so configuration can vary per deploy
/// without sharing mutable state across rooms.
pub struct RoomDepsFactory {
    pub config: relay_engine::config::Config,
    pub translator: Arc<dyn relay_engine::translator::Translator>,
    pub synthesizer: Arc<dyn relay_engine::synthesizer::Synthesizer>,
    pub store: Arc<dyn relay_engine::store::Store>,
    pub metrics: Arc<dyn relay_engine::metrics::MetricsCollector>,
}

impl RoomDepsFactory {
    fn build(&self) -> RoomDeps {
        RoomDeps {
            config: self.config.clone(),
            translator: self.translator.clone(),
            synthesizer: self.synthesizer.clone(),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl RoomRegistry {
    pub fn new(default_target_langs: Vec<String>, deps: RoomDepsFactory) -> Self {
        Self {
            rooms: DashMap::new(),
            default_target_langs,
            deps: Arc::new(deps),
        }
    }

    /// Get the handle for `slug`, spawning a new room worker on first use.
    pub fn get_or_create(&self, slug: &str) -> RoomHandle {
        if let Some(handle) = self.rooms.get(slug) {
            return handle.clone();
        }
        let handle = room::spawn(slug.to_string(), self.default_target_langs.clone(), self.deps.build());
        self.rooms.insert(slug.to_string(), handle.clone());
        handle
    }

    pub fn remove(&self, slug: &str) {
        if let Some((_, handle)) = self.rooms.remove(slug) {
            handle.shutdown();
        }
    }
}
