//! Per-room subscriber routing: per-language mailbox, per-subscriber
//! last-seen watermark, on-demand translation safety net, same-family
//! mirror, and strict TTS anti-duplication. §4.5.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::warn;

use relay_core::lang::detect_language_base;
use relay_core::types::{lang_base, root_of, AudioRecord, EgressPatch, PatchOp, Role, Stage};

use crate::metrics::MetricsCollector;
use crate::translator::Translator;

pub const SOURCE_ALIAS: &str = "source";

#[derive(Debug, Clone)]
pub enum EgressEvent {
    Hello { room_id: String, role: Role, lang: String, wants_tts: bool },
    Patch(EgressPatch),
    Audio(AudioRecord),
    Reset,
    Watchdog { idle: bool },
}

pub struct Subscriber {
    pub id: u64,
    pub role: Role,
    pub lang: String,
    pub wants_tts: bool,
    pub voice: Option<String>,
    pub last_seen: HashMap<String, u64>,
    pub tx: mpsc::UnboundedSender<EgressEvent>,
}

impl Subscriber {
    /// Send an event; returns `false` (and the caller should close this
    /// subscriber) on write failure.
    fn send(&self, event: EgressEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    fn wants_source(&self) -> bool {
        matches!(self.role, Role::Speaker) || self.lang == SOURCE_ALIAS
    }
}

/// Strict-anti-duplication set of `"lang:rootUnitId"` keys for roots that
/// have already triggered TTS, with periodic TTL eviction.
#[derive(Default)]
pub struct TtsTriggeredSet {
    entries: HashMap<String, Instant>,
}

impl TtsTriggeredSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: String, now: Instant) {
        self.entries.insert(key, now);
        if self.entries.len() % 100 == 0 {
            self.evict_older_than(now, Duration::from_secs(600));
        }
    }

    fn evict_older_than(&mut self, now: Instant, max_age: Duration) {
        self.entries.retain(|_, ts| now.duration_since(*ts) <= max_age);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub struct TtsEnqueueRequest {
    pub lang: String,
    pub unit_id: String,
    pub root_unit_id: String,
    pub text: String,
    pub voice: Option<String>,
    pub sent_len: Option<Vec<usize>>,
    pub version: u64,
}

struct TtsCandidate {
    patch: EgressPatch,
    voice: Option<String>,
}

/// Route one acceptance result to all subscribers and return the set of TTS
/// enqueue requests this delivery triggered. Closed subscriber ids (write
/// failures) are appended to `closed`.
pub async fn fan_out(
    room_id: &str,
    source_patch: Option<&EgressPatch>,
    translated_patches: &[EgressPatch],
    subscribers: &mut [Subscriber],
    translator: &dyn Translator,
    tts_triggered: &mut TtsTriggeredSet,
    metrics: &dyn MetricsCollector,
    closed: &mut Vec<u64>,
) -> Vec<TtsEnqueueRequest> {
    let mut by_lang: HashMap<String, EgressPatch> = HashMap::new();

    if let Some(sp) = source_patch {
        if !sp.text.is_empty() {
            if let Some(src) = &sp.src_lang {
                by_lang.insert(src.clone(), sp.clone());
            }
            by_lang.insert(SOURCE_ALIAS.to_string(), sp.clone());
        }
    }
    for tp in translated_patches {
        if let Some(target) = &tp.target_lang {
            by_lang.insert(target.clone(), tp.clone());
        }
    }

    // Mislabel defense: if the source text's detected language base
    // disagrees with its declared srcLang base, every non-alias subscriber
    // language is treated as needing translation, bypassing the mirror path.
    let mislabelled = source_patch.is_some_and(|sp| {
        let Some(declared) = &sp.src_lang else { return false };
        match detect_language_base(&sp.text) {
            Some(detected) => !detected.eq_ignore_ascii_case(lang_base(declared)),
            None => false,
        }
    });

    let wanted_langs: Vec<String> = subscribers
        .iter()
        .filter(|s| !s.wants_source())
        .map(|s| s.lang.clone())
        .filter(|l| !by_lang.contains_key(l))
        .collect();

    if let Some(sp) = source_patch.filter(|sp| !sp.text.is_empty()) {
        let mut needs_translation = Vec::new();
        for lang in wanted_langs {
            if by_lang.contains_key(&lang) {
                continue;
            }
            let same_family = sp.src_lang.as_deref().map(|s| lang_base(s).eq_ignore_ascii_case(lang_base(&lang))).unwrap_or(false);
            if same_family && !mislabelled {
                let mut mirror = sp.clone();
                mirror.target_lang = Some(lang.clone());
                mirror.provider = Some("mirror".to_string());
                mirror.op = PatchOp::Replace;
                by_lang.insert(lang, mirror);
            } else {
                needs_translation.push(lang);
            }
        }

        if !needs_translation.is_empty() {
            let from_hint = if mislabelled { None } else { sp.src_lang.as_deref() };
            let results = translator.translate(room_id, &sp.text, from_hint, &needs_translation, &[]).await;
            for r in results {
                by_lang.insert(
                    r.lang.clone(),
                    EgressPatch {
                        unit_id: sp.unit_id.clone(),
                        stage: sp.stage,
                        op: PatchOp::Replace,
                        version: sp.version,
                        text: r.text,
                        src_lang: sp.src_lang.clone(),
                        target_lang: Some(r.lang),
                        tts_final: sp.tts_final,
                        sent_len: None,
                        ts: sp.ts,
                        emitted_at: sp.emitted_at,
                        provider: Some(r.provider),
                    },
                );
            }
        }
    }

    let mut tts_working: HashMap<String, HashMap<String, TtsCandidate>> = HashMap::new();

    for sub in subscribers.iter_mut() {
        let key = if sub.wants_source() { SOURCE_ALIAS } else { sub.lang.as_str() };
        let Some(patch) = by_lang.get(key) else { continue };

        // Translation-revision patches re-use the revised unit's original
        // version (they correct a unit already sent, rather than advancing
        // it), so they sit outside the per-unitId version watermark: always
        // deliver them, and don't let them move the watermark backward.
        let is_revision = patch.op == PatchOp::TranslationRevision;
        let already_seen = !is_revision
            && sub
                .last_seen
                .get(&patch.unit_id)
                .is_some_and(|&seen| seen >= patch.version);

        if !already_seen {
            if !sub.send(EgressEvent::Patch(patch.clone())) {
                closed.push(sub.id);
                metrics.count_subscriber_write_failure();
                continue;
            }
            if !is_revision {
                sub.last_seen.insert(patch.unit_id.clone(), patch.version);
            }
        }

        if sub.wants_tts && patch.stage == Stage::Hard && patch.tts_final == Some(true) && !patch.text.is_empty() {
            let lang_map = tts_working.entry(sub.lang.clone()).or_default();
            let replace = lang_map.get(&patch.unit_id).is_none_or(|c| patch.version > c.patch.version);
            if replace {
                lang_map.insert(
                    patch.unit_id.clone(),
                    TtsCandidate {
                        patch: patch.clone(),
                        voice: sub.voice.clone(),
                    },
                );
            }
        }
    }

    let mut enqueues = Vec::new();
    let now = Instant::now();
    for (lang, units) in tts_working {
        for (unit_id, candidate) in units {
            let root_unit_id = root_of(&unit_id).to_string();
            let key = format!("{lang}:{root_unit_id}");
            if tts_triggered.contains(&key) {
                continue;
            }

            let detected = detect_language_base(&candidate.patch.text);
            if let Some(detected) = detected {
                if !detected.eq_ignore_ascii_case(lang_base(&lang)) {
                    warn!(room_id, lang, unit_id, "skipping TTS enqueue: text language base mismatch");
                    continue;
                }
            }

            let sent_len = candidate.patch.sent_len.as_ref().map(|s| s.target.clone());
            enqueues.push(TtsEnqueueRequest {
                lang: lang.clone(),
                unit_id: unit_id.clone(),
                root_unit_id,
                text: candidate.patch.text.clone(),
                voice: candidate.voice,
                sent_len,
                version: candidate.patch.version,
            });
            tts_triggered.insert(key, now);
        }
    }

    enqueues
}
