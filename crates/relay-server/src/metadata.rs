//! Room metadata source contract (§3 "Room metadata (read-only input)",
//! §6 "Room metadata source contract").
//!
//! The real admin service that would issue this data is out of scope; this
//! module ships an in-memory stub so the transport layer has something to
//! consult for window-state gating.

use std::collections::HashMap;
use std::sync::RwLock;

use relay_core::types::{RoomMetadata, SourceLang, WindowState};

/// Minutes before `startsAt` a room is already joinable, and minutes after
/// `endsAt` it is still open, mirroring typical early-join/grace windows.
const EARLY_JOIN_GRACE_MS: u64 = 5 * 60 * 1000;
const END_GRACE_MS: u64 = 10 * 60 * 1000;

pub trait RoomMetadataSource: Send + Sync {
    fn get(&self, slug: &str) -> Option<RoomMetadata>;

    fn window_state(&self, metadata: &RoomMetadata, now_ms: u64) -> WindowState {
        if now_ms + EARLY_JOIN_GRACE_MS < metadata.starts_at_ms {
            WindowState::Early
        } else if now_ms > metadata.ends_at_ms + END_GRACE_MS {
            WindowState::Expired
        } else {
            WindowState::Open
        }
    }
}

/// In-memory stub: rooms default to "always open" unless explicitly
/// registered with real start/end bounds.
#[derive(Default)]
pub struct InMemoryMetadataSource {
    rooms: RwLock<HashMap<String, RoomMetadata>>,
}

impl InMemoryMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, metadata: RoomMetadata) {
        self.rooms.write().unwrap().insert(metadata.slug.clone(), metadata);
    }
}

impl RoomMetadataSource for InMemoryMetadataSource {
    fn get(&self, slug: &str) -> Option<RoomMetadata> {
        self.rooms.read().unwrap().get(slug).cloned().or_else(|| {
            Some(RoomMetadata {
                slug: slug.to_string(),
                source_lang: SourceLang::Auto,
                auto_detect_langs: Vec::new(),
                default_target_langs: Vec::new(),
                starts_at_ms: 0,
                ends_at_ms: u64::MAX,
            })
        })
    }
}
