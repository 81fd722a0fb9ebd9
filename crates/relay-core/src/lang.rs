//! Lexical heuristics backing the backward-revision "Peek" feature:
//! gender-marker counting and coarse language-base classification.
//!
//! These are deliberately cheap, regex-based heuristics, not a real NLP
//! classifier — they only need to be good enough to gate a speculative
//! re-synthesis, not to be authoritative.

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
}

/// Result of scanning a span of text for gendered pronoun/possessive markers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenderSignal {
    pub gender: Option<Gender>,
    pub confidence: f64,
}

static RE_FEMALE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(she|her|hers|herself)\b").unwrap());
static RE_MALE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(he|him|his|himself)\b").unwrap());
static RE_AMBIGUOUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(they|them|their|theirs|themself|themselves)\b").unwrap());

/// Count gendered markers in `text` and derive a confidence-scored signal.
///
/// `confidence = dominant_count / (female_count + male_count)`. When the
/// counts are equal (including both zero) the result is `None` at
/// confidence `0.5` — ties never produce a usable signal, by design: a peek
/// triggered on a coin flip is worse than no peek.
pub fn detect_gender(text: &str) -> GenderSignal {
    let female_count = RE_FEMALE.find_iter(text).count();
    let male_count = RE_MALE.find_iter(text).count();
    let total = female_count + male_count;

    if total == 0 {
        return GenderSignal { gender: None, confidence: 0.0 };
    }

    if female_count == male_count {
        return GenderSignal { gender: None, confidence: 0.5 };
    }

    let (gender, dominant) = if female_count > male_count {
        (Gender::Female, female_count)
    } else {
        (Gender::Male, male_count)
    };

    GenderSignal {
        gender: Some(gender),
        confidence: dominant as f64 / total as f64,
    }
}

/// Whether `text` contains a singular-they style ambiguous pronoun, which
/// should suppress a gender-based peek regardless of `detect_gender`'s
/// verdict — a later "they" can reveal the earlier "he"/"she" guess was
/// premature, but not the reverse.
pub fn contains_ambiguous_pronoun(text: &str) -> bool {
    RE_AMBIGUOUS.is_match(text)
}

// ─── Coarse language-base classification ───────────────────────────────────

struct LangMarkers {
    lang: &'static str,
    lexical: LazyLock<Regex>,
    accent: Option<LazyLock<Regex>>,
}

static EN_LEXICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(the|and|is|are|you|this|that)\b").unwrap());
static FR_LEXICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(le|la|les|est|et|vous|que|nous)\b").unwrap());
static FR_ACCENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[éèêëàâôûùïî]").unwrap());
static ES_LEXICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(el|la|los|las|es|que|usted|nosotros)\b").unwrap());
static ES_ACCENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[áéíóúñ¿¡]").unwrap());
static DE_LEXICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(der|die|das|und|ist|sie|nicht)\b").unwrap());
static DE_ACCENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[äöüß]").unwrap());

/// Classify the dominant language base of `text` among a small fixed set
/// (`en`, `fr`, `es`, `de`), scored by lexical marker hits.
///
/// Accent-character evidence is weighted below lexical markers: a single
/// borrowed accented word shouldn't outvote a run of ordinary function
/// words from a competing language.
pub fn detect_language_base(text: &str) -> Option<&'static str> {
    let candidates: [(&str, usize); 4] = [
        ("en", EN_LEXICAL.find_iter(text).count() * 2),
        (
            "fr",
            FR_LEXICAL.find_iter(text).count() * 2 + FR_ACCENT.find_iter(text).count(),
        ),
        (
            "es",
            ES_LEXICAL.find_iter(text).count() * 2 + ES_ACCENT.find_iter(text).count(),
        ),
        (
            "de",
            DE_LEXICAL.find_iter(text).count() * 2 + DE_ACCENT.find_iter(text).count(),
        ),
    ];

    candidates
        .into_iter()
        .filter(|(_, score)| *score > 0)
        .max_by_key(|(_, score)| *score)
        .map(|(lang, _)| lang)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_dominant_female() {
        let signal = detect_gender("She picked up her bag and left.");
        assert_eq!(signal.gender, Some(Gender::Female));
        assert_eq!(signal.confidence, 1.0);
    }

    #[test]
    fn detects_dominant_male() {
        let signal = detect_gender("He said his plan was ready, he was sure.");
        assert_eq!(signal.gender, Some(Gender::Male));
        assert!(signal.confidence > 0.6);
    }

    #[test]
    fn tie_yields_no_signal_at_half_confidence() {
        let signal = detect_gender("She called him, then he called her back.");
        assert_eq!(signal.gender, None);
        assert_eq!(signal.confidence, 0.5);
    }

    #[test]
    fn no_markers_yields_zero_confidence() {
        let signal = detect_gender("The meeting starts at noon.");
        assert_eq!(signal.gender, None);
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn ambiguous_pronoun_detected() {
        assert!(contains_ambiguous_pronoun("They said they'd be here."));
        assert!(!contains_ambiguous_pronoun("She said she'd be here."));
    }

    #[test]
    fn classifies_english() {
        assert_eq!(detect_language_base("the quick fox and the dog are here"), Some("en"));
    }

    #[test]
    fn stray_accent_does_not_beat_english_lexical_run() {
        // A single accented loanword shouldn't outvote a run of English
        // function words.
        assert_eq!(
            detect_language_base("the café is on the table, and this is the plan"),
            Some("en")
        );
    }

    #[test]
    fn classifies_french_from_lexical_markers() {
        assert_eq!(detect_language_base("le chat et la souris sont ici, et nous partons"), Some("fr"));
    }

    #[test]
    fn no_markers_yields_none() {
        assert_eq!(detect_language_base("1234567890"), None);
    }
}
