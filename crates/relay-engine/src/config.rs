//! Room core configuration, one field per row of the configuration table.
//!
//! `Default` matches the defaults stated in the specification; `from_env`
//! reads `RELAY_*`-prefixed environment variables, mirroring the teacher's
//! environment-driven service configuration.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Unit Store / Translation Cache / patch-history LRU bound, per room.
    pub patch_lru_per_room: usize,
    /// Age cutoff (ms) when replaying history to a late subscriber. 0 disables replay.
    pub patch_history_max_ms: u64,

    pub translation_merge_enabled: bool,
    pub translation_merge_window_ms: u64,
    pub translation_merge_min_chars: usize,
    pub translation_merge_max_count: usize,

    /// Context Buffer size, clamped 1..5.
    pub translation_context_segments: usize,

    pub translation_peek_enabled: bool,
    pub translation_peek_window_ms: u64,
    pub translation_peek_max_segments: usize,
    pub translation_peek_min_confidence: f64,

    pub tts_base_speed: f64,
    pub tts_max_speed: f64,
    pub tts_backlog_ramp_start_sec: f64,
    pub tts_backlog_ramp_end_sec: f64,
    pub tts_max_speed_change_percent: f64,

    pub default_tts_voice: String,
    pub default_tts_voice_by_lang: HashMap<String, String>,

    pub watchdog_event_idle_ms: u64,
    pub watchdog_pcm_idle_ms: u64,

    pub filter_filler_words: bool,
    pub filler_words_en: Vec<String>,
    pub filler_words_fr: Vec<String>,

    /// Translator call timeouts (§5).
    pub translator_primary_timeout: Duration,
    pub translator_fallback_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            patch_lru_per_room: 500,
            patch_history_max_ms: 0,

            translation_merge_enabled: true,
            translation_merge_window_ms: 1300,
            translation_merge_min_chars: 0,
            translation_merge_max_count: 3,

            translation_context_segments: 2,

            translation_peek_enabled: true,
            translation_peek_window_ms: 500,
            translation_peek_max_segments: 2,
            translation_peek_min_confidence: 0.7,

            tts_base_speed: 1.05,
            tts_max_speed: 1.35,
            tts_backlog_ramp_start_sec: 5.0,
            tts_backlog_ramp_end_sec: 20.0,
            tts_max_speed_change_percent: 0.15,

            default_tts_voice: "default".to_string(),
            default_tts_voice_by_lang: HashMap::new(),

            watchdog_event_idle_ms: 12_000,
            watchdog_pcm_idle_ms: 7_000,

            filter_filler_words: true,
            filler_words_en: vec![
                "um", "uh", "uhh", "umm", "er", "erm", "you know", "like", "i mean",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            filler_words_fr: vec!["euh", "ben", "genre", "tu vois", "quoi"]
                .into_iter()
                .map(String::from)
                .collect(),

            translator_primary_timeout: Duration::from_secs(10),
            translator_fallback_timeout: Duration::from_secs(15),
        }
    }
}

impl Config {
    /// Build a `Config` by overlaying `RELAY_*` environment variables onto
    /// the defaults. Unset or unparseable variables fall back silently to
    /// the default value for that field.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_usize("RELAY_PATCH_LRU_PER_ROOM") {
            cfg.patch_lru_per_room = v;
        }
        if let Some(v) = env_u64("RELAY_PATCH_HISTORY_MAX_MS") {
            cfg.patch_history_max_ms = v;
        }
        if let Some(v) = env_bool("RELAY_TRANSLATION_MERGE_ENABLED") {
            cfg.translation_merge_enabled = v;
        }
        if let Some(v) = env_u64("RELAY_TRANSLATION_MERGE_WINDOW_MS") {
            cfg.translation_merge_window_ms = v;
        }
        if let Some(v) = env_usize("RELAY_TRANSLATION_MERGE_MIN_CHARS") {
            cfg.translation_merge_min_chars = v;
        }
        if let Some(v) = env_usize("RELAY_TRANSLATION_MERGE_MAX_COUNT") {
            cfg.translation_merge_max_count = v;
        }
        if let Some(v) = env_usize("RELAY_TRANSLATION_CONTEXT_SEGMENTS") {
            cfg.translation_context_segments = v.clamp(1, 5);
        }
        if let Some(v) = env_bool("RELAY_TRANSLATION_PEEK_ENABLED") {
            cfg.translation_peek_enabled = v;
        }
        if let Some(v) = env_u64("RELAY_TRANSLATION_PEEK_WINDOW_MS") {
            cfg.translation_peek_window_ms = v;
        }
        if let Some(v) = env_usize("RELAY_TRANSLATION_PEEK_MAX_SEGMENTS") {
            cfg.translation_peek_max_segments = v;
        }
        if let Some(v) = env_f64("RELAY_TRANSLATION_PEEK_MIN_CONFIDENCE") {
            cfg.translation_peek_min_confidence = v;
        }
        if let Some(v) = env_f64("RELAY_TTS_BASE_SPEED") {
            cfg.tts_base_speed = v;
        }
        if let Some(v) = env_f64("RELAY_TTS_MAX_SPEED") {
            cfg.tts_max_speed = v;
        }
        if let Some(v) = env_f64("RELAY_TTS_BACKLOG_RAMP_START_SEC") {
            cfg.tts_backlog_ramp_start_sec = v;
        }
        if let Some(v) = env_f64("RELAY_TTS_BACKLOG_RAMP_END_SEC") {
            cfg.tts_backlog_ramp_end_sec = v;
        }
        if let Some(v) = env_f64("RELAY_TTS_MAX_SPEED_CHANGE_PERCENT") {
            cfg.tts_max_speed_change_percent = v;
        }
        if let Ok(v) = std::env::var("RELAY_DEFAULT_TTS_VOICE") {
            cfg.default_tts_voice = v;
        }
        if let Some(v) = env_u64("RELAY_WATCHDOG_EVENT_IDLE_MS") {
            cfg.watchdog_event_idle_ms = v;
        }
        if let Some(v) = env_u64("RELAY_WATCHDOG_PCM_IDLE_MS") {
            cfg.watchdog_pcm_idle_ms = v;
        }
        if let Some(v) = env_bool("RELAY_FILTER_FILLER_WORDS") {
            cfg.filter_filler_words = v;
        }

        cfg
    }

    /// The configured voice for `lang`, falling back to the global default.
    pub fn voice_for_lang(&self, lang: &str) -> &str {
        self.default_tts_voice_by_lang
            .get(lang)
            .or_else(|| self.default_tts_voice_by_lang.get(relay_core::types::lang_base(lang)))
            .map(String::as_str)
            .unwrap_or(&self.default_tts_voice)
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok()?.parse().ok()
}
fn env_bool(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.translation_context_segments, 2);
        assert_eq!(cfg.translation_peek_window_ms, 500);
        assert_eq!(cfg.translation_peek_max_segments, 2);
        assert_eq!(cfg.translation_peek_min_confidence, 0.7);
        assert_eq!(cfg.tts_base_speed, 1.05);
        assert_eq!(cfg.tts_max_speed, 1.35);
        assert_eq!(cfg.tts_backlog_ramp_start_sec, 5.0);
        assert_eq!(cfg.tts_backlog_ramp_end_sec, 20.0);
        assert_eq!(cfg.tts_max_speed_change_percent, 0.15);
        assert_eq!(cfg.watchdog_event_idle_ms, 12_000);
        assert_eq!(cfg.watchdog_pcm_idle_ms, 7_000);
    }

    #[test]
    fn voice_for_lang_falls_back_to_default() {
        let cfg = Config::default();
        assert_eq!(cfg.voice_for_lang("fr-CA"), "default");
    }

    #[test]
    fn voice_for_lang_prefers_exact_then_base() {
        let mut cfg = Config::default();
        cfg.default_tts_voice_by_lang.insert("fr".to_string(), "claire".to_string());
        assert_eq!(cfg.voice_for_lang("fr-CA"), "claire");
        cfg.default_tts_voice_by_lang.insert("fr-CA".to_string(), "amelie".to_string());
        assert_eq!(cfg.voice_for_lang("fr-CA"), "amelie");
    }
}
