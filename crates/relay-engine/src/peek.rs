//! Backward-revision "Peek" window. §4.3.
//!
//! Holds a short FIFO of recent hard units so that, when new text
//! unambiguously reveals a participant's gender, the previous unit can be
//! re-translated with that information folded in as context.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use relay_core::lang::{contains_ambiguous_pronoun, detect_gender, Gender};

#[derive(Debug, Clone)]
pub struct PeekEntry {
    pub unit_id: String,
    pub version: u64,
    pub src_lang: String,
    pub text: String,
    pub target_langs: Vec<String>,
    pub arrived_at: Instant,
}

pub struct PeekWindow {
    max_age: Duration,
    max_segments: usize,
    entries: VecDeque<PeekEntry>,
}

impl PeekWindow {
    pub fn new(max_age: Duration, max_segments: usize) -> Self {
        Self {
            max_age,
            max_segments: max_segments.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, entry: PeekEntry) {
        self.entries.push_back(entry);
        self.prune(Instant::now());
    }

    /// Drop entries older than `max_age` or beyond `max_segments`, evaluated
    /// on every access per the spec's "pruned on every access" rule.
    pub fn prune(&mut self, now: Instant) {
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.arrived_at) > self.max_age {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        while self.entries.len() > self.max_segments {
            self.entries.pop_front();
        }
    }

    /// The most recent peekable entry, if any, after pruning.
    pub fn most_recent(&mut self) -> Option<&PeekEntry> {
        self.prune(Instant::now());
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A decision to re-translate a previous unit, carrying the gender context
/// string the Translator should receive.
#[derive(Debug, Clone)]
pub struct PeekTrigger {
    pub unit_id: String,
    pub version: u64,
    pub src_lang: String,
    pub text: String,
    pub target_langs: Vec<String>,
    pub gender_context: String,
}

/// Evaluate whether `incoming_text`/`incoming_src_lang` should trigger a
/// peek revision of `candidate`, per §4.3's trigger conditions.
pub fn evaluate_trigger(candidate: &PeekEntry, incoming_text: &str, incoming_src_lang: &str, min_confidence: f64) -> Option<PeekTrigger> {
    if !candidate.src_lang.eq_ignore_ascii_case(incoming_src_lang) {
        return None;
    }

    let signal = detect_gender(incoming_text);
    let gender = signal.gender?;
    if signal.confidence < min_confidence {
        return None;
    }

    if !contains_ambiguous_pronoun(&candidate.text) {
        return None;
    }

    let gender_label = match gender {
        Gender::Female => "female",
        Gender::Male => "male",
    };

    Some(PeekTrigger {
        unit_id: candidate.unit_id.clone(),
        version: candidate.version,
        src_lang: candidate.src_lang.clone(),
        text: candidate.text.clone(),
        target_langs: candidate.target_langs.clone(),
        gender_context: format!("Gender: {gender_label}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> PeekEntry {
        PeekEntry {
            unit_id: "u1".to_string(),
            version: 1,
            src_lang: "en".to_string(),
            text: text.to_string(),
            target_langs: vec!["fr-CA".to_string()],
            arrived_at: Instant::now(),
        }
    }

    #[test]
    fn triggers_on_confident_gender_and_ambiguous_prior() {
        let candidate = entry("They arrived yesterday.");
        let trigger = evaluate_trigger(&candidate, "She looked tired.", "en", 0.7);
        assert!(trigger.is_some());
        assert_eq!(trigger.unwrap().gender_context, "Gender: female");
    }

    #[test]
    fn no_trigger_without_ambiguous_pronoun_in_prior() {
        let candidate = entry("He arrived yesterday.");
        let trigger = evaluate_trigger(&candidate, "She looked tired.", "en", 0.7);
        assert!(trigger.is_none());
    }

    #[test]
    fn no_trigger_on_language_mismatch() {
        let candidate = entry("They arrived yesterday.");
        let trigger = evaluate_trigger(&candidate, "Elle est fatiguée.", "fr", 0.7);
        assert!(trigger.is_none());
    }

    #[test]
    fn no_trigger_below_confidence_floor() {
        let candidate = entry("They arrived yesterday.");
        // Tied markers -> confidence 0.5, below the 0.7 floor.
        let trigger = evaluate_trigger(&candidate, "She called him, then he called her back.", "en", 0.7);
        assert!(trigger.is_none());
    }

    #[test]
    fn window_prunes_by_size() {
        let mut window = PeekWindow::new(Duration::from_secs(5), 2);
        window.push(entry("a"));
        window.push(entry("b"));
        window.push(entry("c"));
        assert_eq!(window.entries.len(), 2);
    }

    #[test]
    fn window_prunes_by_age() {
        let mut window = PeekWindow::new(Duration::from_millis(0), 2);
        window.push(entry("a"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(window.most_recent().is_none());
    }
}
