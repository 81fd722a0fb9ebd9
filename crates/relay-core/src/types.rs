//! Shared wire and domain types for the transcription relay.
//!
//! Kept dependency-free (serde + regex only) so relay-server and downstream
//! consumers can share these types without pulling in tokio or reqwest.

use serde::{Deserialize, Serialize};

// ─── Units ─────────────────────────────────────────────────────────────────

/// A revision's commitment level. Only `Hard` units translate and are
/// eligible for TTS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Soft,
    Hard,
}

/// Optional millisecond timestamps carried on a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeSpan {
    pub t0: Option<u64>,
    pub t1: Option<u64>,
}

/// The canonical state of one utterance-in-progress, keyed by `root`.
#[derive(Debug, Clone)]
pub struct Unit {
    pub unit_id: String,
    pub root: String,
    pub stage: Stage,
    pub version: u64,
    pub text: String,
    pub src_lang: Option<String>,
    pub ts: Option<TimeSpan>,
    pub updated_at: std::time::Instant,
    pub tts_final: bool,
}

/// Strip any `"#<n>"` suffix from a unit id, returning its root.
pub fn root_of(unit_id: &str) -> &str {
    match unit_id.find('#') {
        Some(idx) => &unit_id[..idx],
        None => unit_id,
    }
}

/// The base language code of a BCP-47-ish tag, e.g. `"fr-CA"` -> `"fr"`.
pub fn lang_base(lang: &str) -> &str {
    match lang.find('-') {
        Some(idx) => &lang[..idx],
        None => lang,
    }
}

/// Whether two language tags share the same base (e.g. `fr-FR` vs `fr-CA`).
pub fn same_lang_family(a: &str, b: &str) -> bool {
    lang_base(a).eq_ignore_ascii_case(lang_base(b))
}

// ─── Ingress patches ────────────────────────────────────────────────────────

/// Raw ingress patch as received from the speaker connection. Both the
/// `stage`/`version` and the `isFinal`/`rev` field-name families are
/// accepted; `resolve` normalizes them into a [`CanonicalPatch`].
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawIngressPatch {
    pub unit_id: Option<String>,
    pub stage: Option<String>,
    pub is_final: Option<bool>,
    pub version: Option<u64>,
    pub rev: Option<u64>,
    pub text: Option<String>,
    pub src_lang: Option<String>,
    pub ts: Option<TimeSpan>,
    pub tts_final: Option<bool>,
}

/// A validation failure while resolving a [`RawIngressPatch`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchValidationError {
    #[error("patch missing unitId")]
    MissingUnitId,
    #[error("patch has unknown stage {0:?}")]
    UnknownStage(String),
    #[error("patch missing both stage and isFinal")]
    MissingStage,
}

/// The canonical, internally-used shape of an accepted ingress patch.
#[derive(Debug, Clone)]
pub struct CanonicalPatch {
    pub unit_id: String,
    pub stage: Stage,
    pub version: u64,
    pub text: String,
    pub src_lang: Option<String>,
    pub ts: Option<TimeSpan>,
    pub tts_final: Option<bool>,
}

impl RawIngressPatch {
    /// Resolve the raw, doubly-named wire fields into canonical form.
    /// Implements §4.1 step 1 of the Segment Processor's acceptance
    /// algorithm (field-name reconciliation and fatal validation).
    pub fn resolve(self) -> Result<CanonicalPatch, PatchValidationError> {
        let unit_id = self.unit_id.ok_or(PatchValidationError::MissingUnitId)?;

        let stage = match (self.stage, self.is_final) {
            (Some(s), _) => parse_stage(&s)?,
            (None, Some(is_final)) => {
                if is_final {
                    Stage::Hard
                } else {
                    Stage::Soft
                }
            }
            (None, None) => return Err(PatchValidationError::MissingStage),
        };

        let version = self.version.or(self.rev).unwrap_or(0);

        Ok(CanonicalPatch {
            unit_id,
            stage,
            version,
            text: self.text.unwrap_or_default(),
            src_lang: self.src_lang,
            ts: self.ts,
            tts_final: self.tts_final,
        })
    }
}

fn parse_stage(s: &str) -> Result<Stage, PatchValidationError> {
    match s {
        "soft" => Ok(Stage::Soft),
        "hard" => Ok(Stage::Hard),
        other => Err(PatchValidationError::UnknownStage(other.to_string())),
    }
}

// ─── Egress patches ─────────────────────────────────────────────────────────

/// What kind of revision an egress patch represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchOp {
    Replace,
    TranslationRevision,
}

/// Parallel source/target sentence character-length arrays, carried so a
/// subscriber can align synthesized audio spans with displayed text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentLen {
    pub src: Vec<usize>,
    pub target: Vec<usize>,
}

/// One wire record per language per accepted revision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressPatch {
    pub unit_id: String,
    pub stage: Stage,
    pub op: PatchOp,
    pub version: u64,
    pub text: String,
    pub src_lang: Option<String>,
    pub target_lang: Option<String>,
    pub tts_final: Option<bool>,
    pub sent_len: Option<SentLen>,
    pub ts: Option<TimeSpan>,
    pub emitted_at: u64,
    pub provider: Option<String>,
}

/// Synthesized audio for one finalized sentence.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioRecord {
    pub unit_id: String,
    pub root_unit_id: String,
    pub lang: String,
    pub text: String,
    #[serde(skip_serializing)]
    pub audio: Vec<u8>,
    pub format: String,
    pub voice: String,
    pub sent_len: Option<usize>,
    pub version: u64,
}

// ─── Subscribers ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Speaker,
    Listener,
}

/// Subscription parameters for one subscriber. The outbound channel and
/// `lastSeen` watermark live alongside this in `relay-engine` since they
/// require tokio types; this is the pure, transport-independent part.
#[derive(Debug, Clone)]
pub struct SubscriberInfo {
    pub role: Role,
    pub lang: String,
    pub wants_tts: bool,
    pub voice: Option<String>,
}

// ─── Room metadata (read-only external input) ──────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLang {
    Auto,
    Fixed(String),
}

#[derive(Debug, Clone)]
pub struct RoomMetadata {
    pub slug: String,
    pub source_lang: SourceLang,
    pub auto_detect_langs: Vec<String>,
    pub default_target_langs: Vec<String>,
    pub starts_at_ms: u64,
    pub ends_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Early,
    Open,
    Expired,
}
