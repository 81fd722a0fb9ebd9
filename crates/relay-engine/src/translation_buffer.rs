//! Coalesces several short successive hard units into one translation call.
//! §4.4.
//!
//! Holds no async state itself — the owning room worker polls
//! [`TranslationBuffer::deadline`] in its select loop and calls
//! [`TranslationBuffer::take_due`] (or `flush_now`) when it's time, then
//! passes the result to [`execute_flush`] to actually call the Translator.

use std::time::{Duration, Instant};

use crate::translation_cache::{CachedTranslation, TranslationCache};
use crate::translator::Translator;
use relay_core::types::{EgressPatch, PatchOp, SentLen, Stage};

#[derive(Debug, Clone)]
pub struct PendingSegment {
    pub unit_id: String,
    pub version: u64,
    pub text: String,
    pub src_lang: Option<String>,
    pub tts_final: bool,
    pub target_langs: Vec<String>,
    pub ts: Option<relay_core::types::TimeSpan>,
    pub arrived_at: Instant,
}

pub struct TranslationBuffer {
    enabled: bool,
    merge_window: Duration,
    min_merge_chars: usize,
    max_merge_count: usize,
    pending: Vec<PendingSegment>,
}

impl TranslationBuffer {
    pub fn new(enabled: bool, merge_window: Duration, min_merge_chars: usize, max_merge_count: usize) -> Self {
        Self {
            enabled,
            merge_window,
            min_merge_chars,
            max_merge_count,
            pending: Vec::new(),
        }
    }

    /// Add a segment to the pending list. Returns `true` if the caller
    /// should flush immediately (merge disabled, or `maxMergeCount` reached).
    pub fn add(&mut self, segment: PendingSegment) -> bool {
        if !self.enabled {
            self.pending.push(segment);
            return true;
        }
        self.pending.push(segment);
        self.pending.len() >= self.max_merge_count
    }

    /// When the room worker should next wake up to flush, if anything is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.first().map(|s| s.arrived_at + self.merge_window)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the pending list if `now` is past the deadline, clearing it.
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<PendingSegment>> {
        if self.deadline().is_some_and(|d| now >= d) {
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    /// Force a flush regardless of the timer (room reset/shutdown).
    pub fn flush_now(&mut self) -> Vec<PendingSegment> {
        std::mem::take(&mut self.pending)
    }
}

pub enum FlushPlan {
    Individual(Vec<PendingSegment>),
    Merged(PendingSegment),
}

/// Decide whether a flushed batch should be merged into one translation
/// call or translated individually. §4.4 "Flush".
pub fn plan_flush(segments: Vec<PendingSegment>, min_merge_chars: usize, merge_window: Duration) -> FlushPlan {
    if segments.len() < 2 {
        return FlushPlan::Individual(segments);
    }

    let first_arrival = segments.first().unwrap().arrived_at;
    let last_arrival = segments.last().unwrap().arrived_at;
    let within_window = last_arrival.duration_since(first_arrival) <= merge_window;
    let total_chars: usize = segments.iter().map(|s| s.text.chars().count()).sum();

    if within_window && total_chars >= min_merge_chars {
        let first = segments.first().unwrap();
        let merged_unit_id = format!("{}#merged", first.unit_id);
        let merged_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let tts_final = segments.iter().any(|s| s.tts_final);
        let mut target_langs: Vec<String> = Vec::new();
        for s in &segments {
            for lang in &s.target_langs {
                if !target_langs.contains(lang) {
                    target_langs.push(lang.clone());
                }
            }
        }

        FlushPlan::Merged(PendingSegment {
            unit_id: merged_unit_id,
            version: first.version,
            text: merged_text,
            src_lang: first.src_lang.clone(),
            tts_final,
            target_langs,
            ts: first.ts,
            arrived_at: first.arrived_at,
        })
    } else {
        FlushPlan::Individual(segments)
    }
}

/// Execute a flush plan: for each record, consult the cache, call the
/// Translator on miss, cache the result, and build an egress patch.
pub async fn execute_flush(
    room_id: &str,
    plan: FlushPlan,
    translator: &dyn Translator,
    cache: &mut TranslationCache,
    context_texts: &[String],
) -> Vec<EgressPatch> {
    let segments = match plan {
        FlushPlan::Individual(segs) => segs,
        FlushPlan::Merged(seg) => vec![seg],
    };

    let mut out = Vec::new();
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    for seg in segments {
        let mut providers: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        for lang in &seg.target_langs {
            if cache.get(&seg.unit_id, seg.version, lang).is_none() {
                missing.push(lang.clone());
            } else {
                providers.insert(lang.clone(), "cache".to_string());
            }
        }

        if !missing.is_empty() {
            // The Translator implementation itself records per-target latency
            // (including both primary and fallback attempts) — see
            // `HttpTranslator::translate`.
            let results = translator
                .translate(room_id, &seg.text, seg.src_lang.as_deref(), &missing, context_texts)
                .await;
            for r in results {
                providers.insert(r.lang.clone(), r.provider);
                cache.put(
                    &seg.unit_id,
                    seg.version,
                    &r.lang,
                    CachedTranslation {
                        text: r.text,
                        src_sent_len: r.src_sent_len,
                        trans_sent_len: r.trans_sent_len,
                    },
                );
            }
        }

        for lang in &seg.target_langs {
            let Some(translation) = cache.get(&seg.unit_id, seg.version, lang) else {
                continue;
            };
            out.push(EgressPatch {
                unit_id: seg.unit_id.clone(),
                stage: Stage::Hard,
                op: PatchOp::Replace,
                version: seg.version,
                text: translation.text,
                src_lang: seg.src_lang.clone(),
                target_lang: Some(lang.clone()),
                tts_final: Some(seg.tts_final),
                sent_len: Some(SentLen {
                    src: translation.src_sent_len,
                    target: translation.trans_sent_len,
                }),
                ts: seg.ts,
                emitted_at: now_ms,
                provider: providers.get(lang).cloned(),
            });
        }
    }

    out
}
