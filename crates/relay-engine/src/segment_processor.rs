//! The core state machine: validates patches, dedupes continuations, strips
//! fillers, stamps versions, and decides whether a revision needs
//! translation. §4.1.

use std::time::Instant;

use relay_core::text_prep::{normalize_for_dedupe, overlap_ratio, prefix_overlap_len, splice_continuation, FillerConfig};
use relay_core::types::{lang_base, root_of, CanonicalPatch, EgressPatch, PatchOp, Stage};

use crate::context::ContextBuffer;
use crate::error::RelayError;
use crate::metrics::MetricsCollector;
use crate::peek::{evaluate_trigger, PeekEntry, PeekTrigger, PeekWindow};
use crate::translation_buffer::PendingSegment;
use crate::unit_store::{self, Unit, UnitStore};

/// Continuation-dedupe overlap floor from §4.1 step 4 ("≥ 80% normalized
/// prefix overlap").
pub const CONTINUATION_OVERLAP_FLOOR: f64 = 0.8;

pub struct SegmentProcessor {
    filler_en: FillerConfig,
    filler_fr: FillerConfig,
    filter_fillers: bool,
}

pub enum Outcome {
    Stale,
    StaleEmpty,
    Accepted {
        source_patch: EgressPatch,
        /// Populated only when this is a hard patch with a non-empty
        /// translation target set: the caller should hand this to the
        /// Translation Buffer.
        pending_translation: Option<PendingSegment>,
        peek_trigger: Option<PeekTrigger>,
    },
}

impl SegmentProcessor {
    pub fn new(filler_en: Vec<String>, filler_fr: Vec<String>, filter_fillers: bool) -> Self {
        Self {
            filler_en: FillerConfig::new(filler_en),
            filler_fr: FillerConfig::new(filler_fr),
            filter_fillers,
        }
    }

    fn strip_fillers(&self, text: &str, src_lang: Option<&str>) -> String {
        if !self.filter_fillers {
            return text.to_string();
        }
        match src_lang.map(lang_base) {
            Some("fr") => self.filler_fr.strip(text),
            _ => self.filler_en.strip(text),
        }
    }

    /// Run the acceptance algorithm for one ingress patch against room state.
    ///
    /// `target_langs` is the room's configured listener language set (used
    /// to decide whether translation is needed and to size the peek entry's
    /// target set). `now` is the wall-clock used to stamp the Unit and to
    /// evaluate the Peek Window's age pruning.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &self,
        patch: CanonicalPatch,
        store: &mut UnitStore,
        cache: &mut crate::translation_cache::TranslationCache,
        context: &mut ContextBuffer,
        peek: &mut PeekWindow,
        target_langs: &[String],
        peek_min_confidence: f64,
        metrics: &dyn MetricsCollector,
        now: Instant,
    ) -> Result<Outcome, RelayError> {
        if patch.unit_id.is_empty() {
            return Err(RelayError::Validation("unitId must not be empty".into()));
        }

        let root = root_of(&patch.unit_id).to_string();

        let stripped_text = self.strip_fillers(&patch.text, patch.src_lang.as_deref());
        if stripped_text.trim().is_empty() {
            metrics.count_rejected("only_filler");
            return Ok(Outcome::StaleEmpty);
        }

        let current = store.peek(&root).cloned();

        if let Some(ref current) = current {
            if patch.version <= current.version {
                metrics.count_rejected("stale_version");
                return Ok(Outcome::Stale);
            }
            // A hard unit is never regressed by a soft patch of equal/lower
            // version — already covered above since version must strictly
            // increase; an equal-version soft patch against a hard current
            // unit is caught by the `<=` check.
        }

        let merged_text = match &current {
            Some(c) if c.stage == Stage::Soft && patch.stage == Stage::Soft => {
                let prev_norm = normalize_for_dedupe(&c.text);
                let new_norm = normalize_for_dedupe(&stripped_text);
                let prefix_len = prefix_overlap_len(&prev_norm, &new_norm);
                let ratio = overlap_ratio(prefix_len, prev_norm.chars().count().max(1));
                if ratio >= CONTINUATION_OVERLAP_FLOOR {
                    splice_continuation(&c.text, &stripped_text, prefix_len)
                } else {
                    stripped_text.clone()
                }
            }
            _ => stripped_text.clone(),
        };

        let tts_final = patch.tts_final.unwrap_or(patch.stage == Stage::Hard);

        let unit = Unit {
            unit_id: patch.unit_id.clone(),
            root: root.clone(),
            stage: patch.stage,
            version: patch.version,
            text: merged_text.clone(),
            src_lang: patch.src_lang.clone(),
            ts: patch.ts,
            updated_at: now,
            tts_final,
        };

        unit_store::put_and_evict(store, cache, root.clone(), unit);
        metrics.count_accepted(if patch.stage == Stage::Hard { "hard" } else { "soft" });

        let emitted_at = now_ms();
        let source_patch = EgressPatch {
            unit_id: patch.unit_id.clone(),
            stage: patch.stage,
            op: PatchOp::Replace,
            version: patch.version,
            text: merged_text.clone(),
            src_lang: patch.src_lang.clone(),
            target_lang: None,
            tts_final: Some(tts_final),
            sent_len: None,
            ts: patch.ts,
            emitted_at,
            provider: None,
        };

        if patch.stage != Stage::Hard {
            return Ok(Outcome::Accepted {
                source_patch,
                pending_translation: None,
                peek_trigger: None,
            });
        }

        let translate_targets: Vec<String> = target_langs
            .iter()
            .filter(|l| patch.src_lang.as_deref().map(|s| !lang_base(s).eq_ignore_ascii_case(lang_base(l))).unwrap_or(true))
            .cloned()
            .collect();

        if translate_targets.is_empty() {
            return Ok(Outcome::Accepted {
                source_patch,
                pending_translation: None,
                peek_trigger: None,
            });
        }

        let src_lang = patch.src_lang.clone().unwrap_or_default();
        let peek_trigger = peek
            .most_recent()
            .and_then(|candidate| evaluate_trigger(candidate, &merged_text, &src_lang, peek_min_confidence));

        context.push(merged_text.clone());
        peek.push(PeekEntry {
            unit_id: patch.unit_id.clone(),
            version: patch.version,
            src_lang,
            text: merged_text.clone(),
            target_langs: translate_targets.clone(),
            arrived_at: now,
        });

        let pending_translation = Some(PendingSegment {
            unit_id: patch.unit_id.clone(),
            version: patch.version,
            text: merged_text,
            src_lang: patch.src_lang.clone(),
            tts_final,
            target_langs: translate_targets,
            ts: patch.ts,
            arrived_at: now,
        });

        Ok(Outcome::Accepted {
            source_patch,
            pending_translation,
            peek_trigger,
        })
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::translation_cache::TranslationCache;
    use relay_core::types::RawIngressPatch;
    use std::time::Duration;

    fn processor() -> SegmentProcessor {
        SegmentProcessor::new(
            vec!["um".to_string(), "uh".to_string()],
            vec!["euh".to_string()],
            true,
        )
    }

    fn patch(unit_id: &str, stage: &str, version: u64, text: &str) -> CanonicalPatch {
        RawIngressPatch {
            unit_id: Some(unit_id.to_string()),
            stage: Some(stage.to_string()),
            version: Some(version),
            text: Some(text.to_string()),
            src_lang: Some("en".to_string()),
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    struct Harness {
        store: UnitStore,
        cache: TranslationCache,
        context: ContextBuffer,
        peek: PeekWindow,
        metrics: NoopMetrics,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: UnitStore::new(16),
                cache: TranslationCache::new(16),
                context: ContextBuffer::new(2),
                peek: PeekWindow::new(Duration::from_millis(500), 2),
                metrics: NoopMetrics,
            }
        }

        fn process(&mut self, p: CanonicalPatch, targets: &[String]) -> Outcome {
            processor()
                .process(
                    p,
                    &mut self.store,
                    &mut self.cache,
                    &mut self.context,
                    &mut self.peek,
                    targets,
                    0.7,
                    &self.metrics,
                    Instant::now(),
                )
                .unwrap()
        }
    }

    // Scenario 1: soft refinement.
    #[test]
    fn soft_refinement_then_stale() {
        let mut h = Harness::new();
        match h.process(patch("u|en|0", "soft", 1, "Hello"), &[]) {
            Outcome::Accepted { source_patch, .. } => {
                assert_eq!(source_patch.text, "Hello");
                assert_eq!(source_patch.version, 1);
            }
            _ => panic!("expected accepted"),
        }

        match h.process(patch("u|en|0", "soft", 2, "Hello, how"), &[]) {
            Outcome::Accepted { source_patch, .. } => {
                assert_eq!(source_patch.text, "Hello, how");
                assert_eq!(source_patch.version, 2);
            }
            _ => panic!("expected accepted"),
        }

        match h.process(patch("u|en|0", "soft", 2, "Hello, how are"), &[]) {
            Outcome::Stale => {}
            _ => panic!("expected stale"),
        }
    }

    // Scenario 2: continuation dedupe.
    #[test]
    fn continuation_dedupe_splices_tail() {
        let mut h = Harness::new();
        h.process(patch("u|en|0", "soft", 1, "Hello"), &[]);
        h.process(patch("u|en|0", "soft", 2, "Hello, how"), &[]);
        match h.process(patch("u|en|0", "soft", 3, "hello, how are you"), &[]) {
            Outcome::Accepted { source_patch, .. } => {
                assert_eq!(source_patch.text, "Hello, how are you");
                assert_eq!(source_patch.version, 3);
            }
            _ => panic!("expected accepted"),
        }
    }

    // Scenario 3 (partial — segment processor's half): hard finalization
    // produces a pending translation with the configured target set.
    #[test]
    fn hard_finalization_yields_pending_translation() {
        let mut h = Harness::new();
        let p = patch("u|en|0", "hard", 4, "Hello, how are you today?");
        match h.process(p, &["fr-CA".to_string()]) {
            Outcome::Accepted { source_patch, pending_translation, .. } => {
                assert_eq!(source_patch.stage, Stage::Hard);
                assert_eq!(source_patch.tts_final, Some(true));
                let pending = pending_translation.unwrap();
                assert_eq!(pending.target_langs, vec!["fr-CA".to_string()]);
            }
            _ => panic!("expected accepted"),
        }
    }

    #[test]
    fn same_family_target_is_excluded_from_translation() {
        let mut h = Harness::new();
        let p = patch("u|fr|0", "hard", 1, "Bonjour");
        let p = CanonicalPatch { src_lang: Some("fr-FR".to_string()), ..p };
        match h.process(p, &["fr-CA".to_string()]) {
            Outcome::Accepted { pending_translation, .. } => {
                assert!(pending_translation.is_none());
            }
            _ => panic!("expected accepted"),
        }
    }

    #[test]
    fn only_filler_text_is_stale_empty() {
        let mut h = Harness::new();
        match h.process(patch("u|en|0", "soft", 1, "um, uh"), &[]) {
            Outcome::StaleEmpty => {}
            _ => panic!("expected stale+empty"),
        }
    }

    #[test]
    fn hard_never_regressed_by_soft_at_equal_version() {
        let mut h = Harness::new();
        h.process(patch("u|en|0", "hard", 5, "Finalized."), &["fr-CA".to_string()]);
        match h.process(patch("u|en|0", "soft", 5, "Different"), &["fr-CA".to_string()]) {
            Outcome::Stale => {}
            _ => panic!("expected stale"),
        }
    }
}
