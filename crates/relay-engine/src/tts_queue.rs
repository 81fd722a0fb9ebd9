//! Per-(room, language) ordered TTS queue: prefetch of N+1, deduplication by
//! root unit, smooth speed ramp, sentence-length-driven segmentation. §4.6.
//!
//! Structured after the teacher's `tts.rs` cloneable-handle-over-channels
//! engine: a background task owns all queue state and is driven by
//! commands sent over an unbounded channel; the handle itself is cheap to
//! clone and share.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use relay_core::text_prep::split_sentences;
use relay_core::types::{root_of, AudioRecord};

use crate::metrics::MetricsCollector;
use crate::synthesizer::{SynthesizedAudio, Synthesizer};

const WORDS_PER_MINUTE: f64 = 160.0;
const MIN_DURATION_SECS: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct SpeedCurveConfig {
    pub base: f64,
    pub max: f64,
    pub ramp_start_sec: f64,
    pub ramp_end_sec: f64,
    pub max_change_pct: f64,
}

/// Compute the speed multiplier for a given backlog, per §4.6's piecewise
/// curve: flat at `base` below `ramp_start`, linear up to `max` by
/// `ramp_end`, flat at `max` beyond.
pub fn speed_for_backlog(backlog_secs: f64, cfg: &SpeedCurveConfig) -> f64 {
    if backlog_secs < cfg.ramp_start_sec {
        cfg.base
    } else if backlog_secs < cfg.ramp_end_sec {
        let span = (cfg.ramp_end_sec - cfg.ramp_start_sec).max(f64::EPSILON);
        let t = (backlog_secs - cfg.ramp_start_sec) / span;
        cfg.base + t * (cfg.max - cfg.base)
    } else {
        cfg.max
    }
}

/// Clamp the transition from `prev` to `raw` by `±maxChangePct` relative to
/// `prev`, then clamp the result into `[base, max]`.
pub fn clamp_transition(prev: f64, raw: f64, cfg: &SpeedCurveConfig) -> f64 {
    let delta_cap = prev * cfg.max_change_pct;
    let clamped = raw.clamp(prev - delta_cap, prev + delta_cap);
    clamped.clamp(cfg.base, cfg.max)
}

pub struct EnqueueRequest {
    pub unit_id: String,
    pub text: String,
    pub voice: Option<String>,
    pub sent_len: Option<Vec<usize>>,
    pub version: u64,
}

#[derive(Debug, Clone)]
pub enum TtsEvent {
    AudioReady(AudioRecord),
    Error { lang: String, unit_id: String },
    SpeedRampStart { lang: String },
    SpeedRampEnd { lang: String },
}

enum Cmd {
    Enqueue(EnqueueRequest),
    CancelRoot(String),
    Reset,
    Shutdown,
}

#[derive(Clone)]
pub struct TtsQueueHandle {
    cmd_tx: mpsc::UnboundedSender<Cmd>,
}

impl TtsQueueHandle {
    pub fn enqueue(&self, req: EnqueueRequest) {
        let _ = self.cmd_tx.send(Cmd::Enqueue(req));
    }

    pub fn cancel_root(&self, root_unit_id: impl Into<String>) {
        let _ = self.cmd_tx.send(Cmd::CancelRoot(root_unit_id.into()));
    }

    pub fn reset(&self) {
        let _ = self.cmd_tx.send(Cmd::Reset);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Cmd::Shutdown);
    }
}

struct QueueItem {
    unit_id: String,
    root_unit_id: String,
    text: String,
    voice: String,
    sent_len: Option<usize>,
    version: u64,
    duration_estimate: Duration,
    prefetch: Option<JoinHandle<Result<SynthesizedAudio, String>>>,
}

struct QueueState {
    items: std::collections::VecDeque<QueueItem>,
    latest_version: HashMap<String, u64>,
    rate: f64,
    in_ramp: bool,
}

/// Spawn the background task for one (room, lang) TTS queue and return a
/// cloneable handle to it.
#[allow(clippy::too_many_arguments)]
pub fn spawn(
    room_id: String,
    lang: String,
    default_voice: String,
    curve: SpeedCurveConfig,
    synthesizer: Arc<dyn Synthesizer>,
    metrics: Arc<dyn MetricsCollector>,
    events: mpsc::UnboundedSender<TtsEvent>,
) -> TtsQueueHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(room_id, lang, default_voice, curve, synthesizer, metrics, events, cmd_rx));
    TtsQueueHandle { cmd_tx }
}

async fn run(
    room_id: String,
    lang: String,
    default_voice: String,
    curve: SpeedCurveConfig,
    synthesizer: Arc<dyn Synthesizer>,
    metrics: Arc<dyn MetricsCollector>,
    events: mpsc::UnboundedSender<TtsEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<Cmd>,
) {
    let mut state = QueueState {
        items: std::collections::VecDeque::new(),
        latest_version: HashMap::new(),
        rate: curve.base,
        in_ramp: false,
    };

    loop {
        ensure_prefetch(&mut state, &synthesizer, &lang, &default_voice);

        let head_done = async {
            match state.items.front_mut() {
                Some(item) => match item.prefetch.as_mut() {
                    Some(h) => h.await,
                    None => std::future::pending().await,
                },
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Cmd::Enqueue(req)) => handle_enqueue(&mut state, &lang, &default_voice, req, &metrics),
                    Some(Cmd::CancelRoot(root)) => cancel_root(&mut state, &root),
                    Some(Cmd::Reset) => {
                        for item in state.items.drain(..) {
                            if let Some(h) = item.prefetch {
                                h.abort();
                            }
                        }
                        state.latest_version.clear();
                        state.rate = curve.base;
                        state.in_ramp = false;
                    }
                    Some(Cmd::Shutdown) | None => {
                        for item in state.items.drain(..) {
                            if let Some(h) = item.prefetch {
                                h.abort();
                            }
                        }
                        return;
                    }
                }
            }
            res = head_done, if !state.items.is_empty() => {
                handle_head_completion(&mut state, &room_id, &lang, &curve, res, &events, &metrics);
            }
        }
    }
}

fn handle_enqueue(state: &mut QueueState, lang: &str, default_voice: &str, req: EnqueueRequest, metrics: &dyn MetricsCollector) {
    let word_count = req.text.split_whitespace().count();
    if req.text.trim().is_empty() {
        return;
    }
    if word_count < 2 && !ends_with_terminal_punctuation(&req.text) {
        return;
    }

    let root_unit_id = root_of(&req.unit_id).to_string();
    let latest = state.latest_version.get(&root_unit_id).copied().unwrap_or(0);
    if req.version <= latest {
        let reason = if req.version == latest { "duplicate_version" } else { "stale_version" };
        metrics.count_tts_enqueue(lang, reason);
        return;
    }
    state.latest_version.insert(root_unit_id.clone(), req.version);

    // Cancel any already-queued items (and the in-flight head) sharing this root.
    cancel_root(state, &root_unit_id);

    let voice = req.voice.unwrap_or_else(|| default_voice.to_string());
    let sentences = split_for_tts(&req.text, req.sent_len.as_deref());

    for (i, (sentence, sent_len)) in sentences.into_iter().enumerate() {
        let words = sentence.split_whitespace().count().max(1);
        let duration_secs = (words as f64 / WORDS_PER_MINUTE * 60.0).max(MIN_DURATION_SECS) / state.rate.max(0.01);
        state.items.push_back(QueueItem {
            unit_id: format!("{root_unit_id}#{i}"),
            root_unit_id: root_unit_id.clone(),
            text: sentence,
            voice: voice.clone(),
            sent_len,
            version: req.version,
            duration_estimate: Duration::from_secs_f64(duration_secs),
            prefetch: None,
        });
    }
    metrics.count_tts_enqueue(lang, "enqueued");
}

/// Split `text` into sentence segments. When `sent_len` is provided and its
/// sum is close enough to `text`'s length (`max(12, 5% of length)`), split
/// by those character boundaries instead of re-deriving sentence breaks.
fn split_for_tts(text: &str, sent_len: Option<&[usize]>) -> Vec<(String, Option<usize>)> {
    if let Some(lens) = sent_len {
        let sum: usize = lens.iter().sum();
        let text_len = text.chars().count();
        let tolerance = (text_len as f64 * 0.05).max(12.0) as usize;
        if sum.abs_diff(text_len) <= tolerance && sum > 0 {
            let mut out = Vec::with_capacity(lens.len());
            let mut chars = text.chars();
            for &len in lens {
                let segment: String = chars.by_ref().take(len).collect();
                if !segment.trim().is_empty() {
                    out.push((segment, Some(len)));
                }
            }
            if !out.is_empty() {
                return out;
            }
        }
    }

    split_sentences(text).into_iter().map(|s| (s, None)).collect()
}

fn ends_with_terminal_punctuation(text: &str) -> bool {
    matches!(text.trim_end().chars().last(), Some('.') | Some('!') | Some('?'))
}

fn cancel_root(state: &mut QueueState, root: &str) {
    state.items.retain_mut(|item| {
        if item.root_unit_id == root {
            if let Some(h) = item.prefetch.take() {
                h.abort();
            }
            false
        } else {
            true
        }
    });
}

fn ensure_prefetch(state: &mut QueueState, synthesizer: &Arc<dyn Synthesizer>, lang: &str, _default_voice: &str) {
    let rate = state.rate;
    let lang = lang.to_string();
    for item in state.items.iter_mut().take(2) {
        if item.prefetch.is_none() {
            let synth = synthesizer.clone();
            let text = item.text.clone();
            let voice = item.voice.clone();
            let lang = lang.clone();
            item.prefetch = Some(tokio::spawn(async move { synth.synthesize(&text, &lang, &voice, rate).await }));
        }
    }
}

fn backlog(state: &QueueState) -> Duration {
    state.items.iter().map(|i| i.duration_estimate).sum()
}

fn handle_head_completion(
    state: &mut QueueState,
    room_id: &str,
    lang: &str,
    curve: &SpeedCurveConfig,
    res: Result<Result<SynthesizedAudio, String>, tokio::task::JoinError>,
    events: &mpsc::UnboundedSender<TtsEvent>,
    metrics: &dyn MetricsCollector,
) {
    let Some(item) = state.items.pop_front() else { return };

    match res {
        Ok(Ok(audio)) => {
            debug!(room_id, lang, unit_id = %item.unit_id, "tts audio ready");
            let _ = events.send(TtsEvent::AudioReady(AudioRecord {
                unit_id: item.unit_id,
                root_unit_id: item.root_unit_id,
                lang: lang.to_string(),
                text: item.text,
                audio: audio.audio,
                format: audio.format,
                voice: item.voice,
                sent_len: item.sent_len,
                version: item.version,
            }));
        }
        Ok(Err(e)) => {
            warn!(room_id, lang, unit_id = %item.unit_id, error = %e, "tts synthesis failed");
            metrics.count_synthesis_failure(lang);
            let _ = events.send(TtsEvent::Error { lang: lang.to_string(), unit_id: item.unit_id });
        }
        Err(_) => {
            // Aborted (cancelled) — no event, already handled by the cancel path.
        }
    }

    let new_backlog = backlog(state).as_secs_f64();
    let raw = speed_for_backlog(new_backlog, curve);
    let new_rate = clamp_transition(state.rate, raw, curve);
    if (new_rate - state.rate).abs() > f64::EPSILON {
        metrics.record_speed_multiplier(lang, new_rate);
        let was_ramped = state.in_ramp;
        let now_ramped = new_rate > curve.base + 1e-6;
        if !was_ramped && now_ramped {
            let _ = events.send(TtsEvent::SpeedRampStart { lang: lang.to_string() });
        } else if was_ramped && !now_ramped {
            let _ = events.send(TtsEvent::SpeedRampEnd { lang: lang.to_string() });
        }
        state.in_ramp = now_ramped;
        state.rate = new_rate;
    }
}
