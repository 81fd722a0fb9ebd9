//! Text preparation: chunking for synthesis, filler stripping, and the
//! continuation-dedupe normalization used by the segment processor.
//!
//! Pure functions, no I/O.

use regex::Regex;
use std::sync::LazyLock;

/// Default maximum chunk length for [`split_text`].
pub const DEFAULT_MAX_CHUNK_LEN: usize = 200;

/// Split text into chunks of roughly `max_len` chars.
///
/// Prefers sentence boundaries (`. `), then word boundaries, then hard-splits.
/// Chunks shorter than 2 chars are discarded.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut result = Vec::new();
    let mut remaining = text;

    while remaining.len() > max_len {
        let window = &remaining[..max_len];

        let split_at = if let Some(pos) = window.rfind(". ") {
            if pos >= max_len / 2 {
                pos + 1
            } else {
                word_boundary_or_hard(window, max_len)
            }
        } else {
            word_boundary_or_hard(window, max_len)
        };

        let chunk = remaining[..split_at].trim_end();
        if !chunk.is_empty() {
            result.push(chunk.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    if remaining.len() >= 2 {
        result.push(remaining.to_string());
    }

    result
}

fn word_boundary_or_hard(window: &str, max_len: usize) -> usize {
    if let Some(pos) = window.rfind(' ') {
        if pos >= max_len / 3 {
            return pos;
        }
    }
    max_len
}

/// Split text into sentences at sentence-ending punctuation (`. `, `! `, `? `)
/// or paragraph breaks (double newlines).
///
/// Returns non-empty, trimmed strings. Feeds `sentLen` bookkeeping in the
/// translation buffer and the per-sentence TTS queue.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    while i < len {
        if bytes[i] == b'\n' && i + 1 < len && bytes[i + 1] == b'\n' {
            let chunk = text[start..i].trim();
            if !chunk.is_empty() {
                sentences.push(chunk.to_string());
            }
            while i < len && bytes[i] == b'\n' {
                i += 1;
            }
            start = i;
            continue;
        }

        if (bytes[i] == b'.' || bytes[i] == b'!' || bytes[i] == b'?')
            && i + 1 < len
            && bytes[i + 1].is_ascii_whitespace()
            && bytes[i + 1] != b'\n'
            || (bytes[i] == b'.' || bytes[i] == b'!' || bytes[i] == b'?')
                && i + 1 < len
                && bytes[i + 1] == b' '
        {
            let chunk = text[start..=i].trim();
            if !chunk.is_empty() {
                sentences.push(chunk.to_string());
            }
            i += 1;
            while i < len && bytes[i].is_ascii_whitespace() && bytes[i] != b'\n' {
                i += 1;
            }
            start = i;
            continue;
        }

        i += 1;
    }

    if start < len {
        let chunk = text[start..].trim();
        if !chunk.is_empty() {
            sentences.push(chunk.to_string());
        }
    }

    sentences
}

// ─── Filler stripping ───────────────────────────────────────────────────────

/// Configurable filler-word stripping, applied to raw soft-stage text before
/// it reaches the translation buffer.
#[derive(Debug, Clone)]
pub struct FillerConfig {
    words: Vec<String>,
}

static WORD_BOUNDARY_SPECIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.^$|()\[\]{}*+?\\]").unwrap());

impl FillerConfig {
    /// Build from a list of filler words/phrases (matched case-insensitively,
    /// on word boundaries).
    pub fn new(words: impl IntoIterator<Item = String>) -> Self {
        let mut words: Vec<String> = words.into_iter().filter(|w| !w.trim().is_empty()).collect();
        // Longest-first so multi-word fillers ("you know") match before their
        // single-word substrings ("know") would.
        words.sort_by_key(|w| std::cmp::Reverse(w.len()));
        Self { words }
    }

    /// The default English filler list.
    pub fn default_english() -> Self {
        Self::new(
            ["um", "uh", "uhh", "umm", "er", "erm", "you know", "like", "i mean"]
                .into_iter()
                .map(String::from),
        )
    }

    fn pattern(&self) -> Option<Regex> {
        if self.words.is_empty() {
            return None;
        }
        let alternation = self
            .words
            .iter()
            .map(|w| WORD_BOUNDARY_SPECIAL.replace_all(w, r"\$0").into_owned())
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).ok()
    }

    /// Strip configured filler words from `text`. Runs a bounded number of
    /// passes (leading fillers can chain: "um, uh, so...") and collapses the
    /// whitespace/punctuation left behind.
    ///
    /// Idempotent: a second call on the output returns the same output.
    pub fn strip(&self, text: &str) -> String {
        let Some(re) = self.pattern() else {
            return text.to_string();
        };

        let mut current = text.to_string();
        for _ in 0..5 {
            let stripped = re.replace_all(&current, "").into_owned();
            let cleaned = cleanup_after_strip(&stripped);
            if cleaned == current {
                return cleaned;
            }
            current = cleaned;
        }
        current
    }
}

fn cleanup_after_strip(text: &str) -> String {
    static RE_DANGLING_COMMA: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s*,\s*,").unwrap());
    static RE_LEADING_PUNCT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[\s,]+").unwrap());
    static RE_MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

    let mut c = text.to_string();
    c = RE_DANGLING_COMMA.replace_all(&c, ",").into_owned();
    c = RE_LEADING_PUNCT.replace(&c, "").into_owned();
    c = RE_MULTI_SPACE.replace_all(&c, " ").into_owned();
    c.trim().to_string()
}

// ─── Continuation dedupe ────────────────────────────────────────────────────

/// Normalize text for continuation-overlap comparison: lowercased, with
/// punctuation collapsed to spaces. Character count is preserved one-for-one
/// (punctuation maps to a single space, never dropped) so prefix-match
/// lengths computed on the normalized string apply directly to the original.
pub fn normalize_for_dedupe(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c.to_lowercase().next().unwrap_or(c) })
        .collect()
}

/// Length (in `char`s) of the longest common prefix of two normalized strings.
pub fn prefix_overlap_len(prev_norm: &str, new_norm: &str) -> usize {
    prev_norm
        .chars()
        .zip(new_norm.chars())
        .take_while(|(a, b)| a == b)
        .count()
}

/// Fraction of the previous revision's length that the overlap covers.
pub fn overlap_ratio(prefix_len: usize, prev_len: usize) -> f64 {
    if prev_len == 0 {
        return 0.0;
    }
    prefix_len as f64 / prev_len as f64
}

/// Splice an incoming continuation onto the previous committed text, given
/// the char-length of their common prefix. The result's length equals
/// `prev.chars().count() + (incoming.chars().count() - prefix_len)`.
pub fn splice_continuation(prev_text: &str, incoming_text: &str, prefix_len: usize) -> String {
    let tail: String = incoming_text.chars().skip(prefix_len).collect();
    format!("{prev_text}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── split_text ──────────────────────────────────────────────────

    #[test]
    fn short_text_not_split() {
        let chunks = split_text("Hello world.", 200);
        assert_eq!(chunks, vec!["Hello world."]);
    }

    #[test]
    fn splits_at_sentence_boundary() {
        let text = "First sentence. Second sentence. Third sentence that is long enough to push past the limit.";
        let chunks = split_text(text, 40);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn splits_at_word_boundary() {
        let text = "word ".repeat(50);
        let chunks = split_text(text.trim(), 30);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 30, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn hard_splits_long_word() {
        let text = "a".repeat(300);
        let chunks = split_text(&text, 100);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn default_max_chunk_len() {
        assert_eq!(DEFAULT_MAX_CHUNK_LEN, 200);
    }

    // ── split_sentences ───────────────────────────────────────────

    #[test]
    fn split_sentences_basic() {
        let s = split_sentences("Hello world. How are you? I am fine!");
        assert_eq!(s, vec!["Hello world.", "How are you?", "I am fine!"]);
    }

    #[test]
    fn split_sentences_paragraph_break() {
        let s = split_sentences("First paragraph.\n\nSecond paragraph.");
        assert_eq!(s, vec!["First paragraph.", "Second paragraph."]);
    }

    #[test]
    fn split_sentences_empty() {
        let s = split_sentences("");
        assert!(s.is_empty());
    }

    // ── FillerConfig ─────────────────────────────────────────────────

    #[test]
    fn strips_leading_filler() {
        let cfg = FillerConfig::default_english();
        assert_eq!(cfg.strip("um, so the meeting is at noon"), "so the meeting is at noon");
    }

    #[test]
    fn strips_inline_filler() {
        let cfg = FillerConfig::default_english();
        assert_eq!(cfg.strip("it's like really good"), "it's really good");
    }

    #[test]
    fn strips_chained_leading_fillers() {
        let cfg = FillerConfig::default_english();
        assert_eq!(cfg.strip("um, uh, you know, it works"), "it works");
    }

    #[test]
    fn filler_strip_is_idempotent() {
        let cfg = FillerConfig::default_english();
        let once = cfg.strip("um, uh, it works");
        let twice = cfg.strip(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn leaves_non_filler_text_untouched() {
        let cfg = FillerConfig::default_english();
        assert_eq!(cfg.strip("the likelihood is low"), "the likelihood is low");
    }

    // ── continuation dedupe ─────────────────────────────────────────

    #[test]
    fn normalize_preserves_char_count() {
        let s = "Hello, How ARE you?";
        assert_eq!(normalize_for_dedupe(s).chars().count(), s.chars().count());
    }

    #[test]
    fn splice_continuation_matches_spec_example() {
        // prev v2 "Hello, how" + incoming v3 "hello, how are you"
        let prev = "Hello, how";
        let incoming = "hello, how are you";
        let prev_norm = normalize_for_dedupe(prev);
        let incoming_norm = normalize_for_dedupe(incoming);
        let prefix_len = prefix_overlap_len(&prev_norm, &incoming_norm);
        assert_eq!(prefix_len, prev.chars().count());
        let merged = splice_continuation(prev, incoming, prefix_len);
        assert_eq!(merged, "Hello, how are you");
    }

    #[test]
    fn overlap_ratio_full_prefix_is_one() {
        let prev = "hello there";
        let incoming = "hello there friend";
        let prefix_len = prefix_overlap_len(prev, incoming);
        assert_eq!(overlap_ratio(prefix_len, incoming.chars().count()), 11.0 / 19.0);
    }

    #[test]
    fn overlap_ratio_zero_length_is_zero() {
        assert_eq!(overlap_ratio(0, 0), 0.0);
    }

    #[test]
    fn no_overlap_prefix_len_zero() {
        let a = normalize_for_dedupe("completely different");
        let b = normalize_for_dedupe("totally unrelated");
        assert_eq!(prefix_overlap_len(&a, &b), 0);
    }
}
