//! Room Supervisor: owns one room's state and mediates every subscriber and
//! ingress interaction through a single worker task. §4.8, §5.
//!
//! All state mutation happens on this task; translation, synthesis, and
//! subscriber writes run elsewhere and reintegrate via channels, per the
//! single-writer-per-room discipline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use relay_core::types::{EgressPatch, PatchOp, RawIngressPatch, Role, Stage, SubscriberInfo};

use crate::config::Config;
use crate::context::ContextBuffer;
use crate::error::RelayError;
use crate::fanout::{self, EgressEvent, Subscriber, TtsTriggeredSet};
use crate::metrics::MetricsCollector;
use crate::peek::PeekWindow;
use crate::segment_processor::{Outcome, SegmentProcessor};
use crate::store::Store;
use crate::synthesizer::Synthesizer;
use crate::translation_buffer::{self, TranslationBuffer};
use crate::translation_cache::TranslationCache;
use crate::translator::Translator;
use crate::tts_queue::{self, SpeedCurveConfig, TtsEvent, TtsQueueHandle};
use crate::unit_store::UnitStore;
use crate::watchdog::Watchdog;

pub struct RoomDeps {
    pub config: Config,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub store: Arc<dyn Store>,
    pub metrics: Arc<dyn MetricsCollector>,
}

enum Cmd {
    Ingress { raw: RawIngressPatch, reply: oneshot::Sender<Result<(), RelayError>> },
    RegisterSubscriber { info: SubscriberInfo, tx: mpsc::UnboundedSender<EgressEvent>, reply: oneshot::Sender<u64> },
    UnregisterSubscriber(u64),
    /// Speaker heartbeat control message; `pcm` mirrors `payload.pcm`.
    Heartbeat { pcm: bool },
    /// Speaker `resume` control message updating one subscriber's watermarks.
    ResumeVersions { subscriber_id: u64, versions: HashMap<String, u64> },
    /// Raw binary PCM frame: bumps the audio-idle timer only.
    AudioHeartbeat,
    /// Speaker-initiated `reset` control message.
    ExplicitReset,
    Shutdown,
}

#[derive(Clone)]
pub struct RoomHandle {
    cmd_tx: mpsc::UnboundedSender<Cmd>,
}

impl RoomHandle {
    pub async fn ingress(&self, raw: RawIngressPatch) -> Result<(), RelayError> {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Cmd::Ingress { raw, reply }).is_err() {
            return Err(RelayError::Store("room worker gone".into()));
        }
        rx.await.unwrap_or_else(|_| Err(RelayError::Store("room worker dropped reply".into())))
    }

    pub async fn register_subscriber(&self, info: SubscriberInfo, tx: mpsc::UnboundedSender<EgressEvent>) -> Option<u64> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx.send(Cmd::RegisterSubscriber { info, tx, reply }).ok()?;
        rx.await.ok()
    }

    pub fn unregister_subscriber(&self, id: u64) {
        let _ = self.cmd_tx.send(Cmd::UnregisterSubscriber(id));
    }

    pub fn heartbeat(&self, pcm: bool) {
        let _ = self.cmd_tx.send(Cmd::Heartbeat { pcm });
    }

    pub fn resume(&self, subscriber_id: u64, versions: HashMap<String, u64>) {
        let _ = self.cmd_tx.send(Cmd::ResumeVersions { subscriber_id, versions });
    }

    pub fn audio_heartbeat(&self) {
        let _ = self.cmd_tx.send(Cmd::AudioHeartbeat);
    }

    pub fn explicit_reset(&self) {
        let _ = self.cmd_tx.send(Cmd::ExplicitReset);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Cmd::Shutdown);
    }
}

/// Spawn the worker task for one room and return a cloneable handle to it.
pub fn spawn(room_id: String, target_langs: Vec<String>, deps: RoomDeps) -> RoomHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(room_id, target_langs, deps, cmd_rx));
    RoomHandle { cmd_tx }
}

struct RoomState {
    unit_store: UnitStore,
    cache: TranslationCache,
    context: ContextBuffer,
    peek: PeekWindow,
    buffer: TranslationBuffer,
    tts_queues: HashMap<String, TtsQueueHandle>,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
    tts_triggered: TtsTriggeredSet,
    watchdog: Watchdog,
    last_src_lang: Option<String>,
}

async fn run(room_id: String, target_langs: Vec<String>, deps: RoomDeps, mut cmd_rx: mpsc::UnboundedReceiver<Cmd>) {
    let RoomDeps { config, translator, synthesizer, store, metrics } = deps;

    let processor = SegmentProcessor::new(config.filler_words_en.clone(), config.filler_words_fr.clone(), config.filter_filler_words);

    let mut state = RoomState {
        unit_store: UnitStore::new(config.patch_lru_per_room),
        cache: TranslationCache::new(config.patch_lru_per_room),
        context: ContextBuffer::new(config.translation_context_segments),
        peek: PeekWindow::new(Duration::from_millis(config.translation_peek_window_ms), config.translation_peek_max_segments),
        buffer: TranslationBuffer::new(
            config.translation_merge_enabled,
            Duration::from_millis(config.translation_merge_window_ms),
            config.translation_merge_min_chars,
            config.translation_merge_max_count,
        ),
        tts_queues: HashMap::new(),
        subscribers: Vec::new(),
        next_subscriber_id: 0,
        tts_triggered: TtsTriggeredSet::new(),
        watchdog: Watchdog::new(Duration::from_millis(config.watchdog_event_idle_ms), Duration::from_millis(config.watchdog_pcm_idle_ms)),
        last_src_lang: None,
    };

    let (tts_event_tx, mut tts_event_rx) = mpsc::unbounded_channel::<TtsEvent>();
    let curve = SpeedCurveConfig {
        base: config.tts_base_speed,
        max: config.tts_max_speed,
        ramp_start_sec: config.tts_backlog_ramp_start_sec,
        ramp_end_sec: config.tts_backlog_ramp_end_sec,
        max_change_pct: config.tts_max_speed_change_percent,
    };

    let mut watchdog_tick = tokio::time::interval(crate::watchdog::CHECK_INTERVAL);
    watchdog_tick.tick().await; // first tick fires immediately; consume it

    loop {
        let flush_sleep = async {
            match state.buffer.deadline() {
                Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Cmd::Ingress { raw, reply }) => {
                        let result = handle_ingress(
                            &room_id, &processor, raw, &mut state, &target_langs,
                            config.translation_peek_min_confidence, &*translator, &*metrics,
                            &mut tts_event_tx.clone(), &curve, &synthesizer, &metrics, &config,
                        ).await;
                        let _ = reply.send(result);
                    }
                    Some(Cmd::RegisterSubscriber { info, tx, reply }) => {
                        let id = state.next_subscriber_id;
                        state.next_subscriber_id += 1;
                        state.subscribers.push(Subscriber {
                            id,
                            role: info.role,
                            lang: info.lang,
                            wants_tts: info.wants_tts,
                            voice: info.voice,
                            last_seen: HashMap::new(),
                            tx,
                        });
                        let _ = reply.send(id);
                    }
                    Some(Cmd::UnregisterSubscriber(id)) => {
                        state.subscribers.retain(|s| s.id != id);
                    }
                    Some(Cmd::Heartbeat { pcm }) => {
                        let now = Instant::now();
                        state.watchdog.record_event(now);
                        if pcm {
                            state.watchdog.record_audio(now);
                        }
                    }
                    Some(Cmd::ResumeVersions { subscriber_id, versions }) => {
                        if let Some(sub) = state.subscribers.iter_mut().find(|s| s.id == subscriber_id) {
                            sub.last_seen = versions;
                        }
                    }
                    Some(Cmd::AudioHeartbeat) => {
                        state.watchdog.record_audio(Instant::now());
                    }
                    Some(Cmd::ExplicitReset) => {
                        reset_room(&mut state);
                    }
                    Some(Cmd::Shutdown) | None => {
                        shutdown(&mut state, &store, &room_id).await;
                        return;
                    }
                }
            }
            _ = flush_sleep, if !state.buffer.is_empty() => {
                if let Some(segments) = state.buffer.take_due(Instant::now()) {
                    flush_and_distribute(&room_id, segments, &mut state, &*translator, &*metrics, &tts_event_tx, &curve, &synthesizer, &metrics, &config).await;
                }
            }
            Some(event) = tts_event_rx.recv() => {
                deliver_tts_event(&mut state, event, &*metrics);
            }
            _ = watchdog_tick.tick() => {
                if state.watchdog.check(Instant::now()) {
                    metrics.count_watchdog_advisory();
                    warn!(room_id, "watchdog advisory");
                    broadcast_to_speaker(&mut state.subscribers, EgressEvent::Watchdog { idle: true }, &*metrics);
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_ingress(
    room_id: &str,
    processor: &SegmentProcessor,
    raw: RawIngressPatch,
    state: &mut RoomState,
    target_langs: &[String],
    peek_min_confidence: f64,
    translator: &dyn Translator,
    metrics: &dyn MetricsCollector,
    tts_event_tx: &mut mpsc::UnboundedSender<TtsEvent>,
    curve: &SpeedCurveConfig,
    synthesizer: &Arc<dyn Synthesizer>,
    metrics_arc: &Arc<dyn MetricsCollector>,
    config: &Config,
) -> Result<(), RelayError> {
    let patch = raw.resolve().map_err(|e| RelayError::Validation(e.to_string()))?;

    if state.last_src_lang.as_deref() != patch.src_lang.as_deref() && patch.src_lang.is_some() {
        // A new declared source language is treated as a new speaker: reset
        // per §4.8 before processing this patch.
        if state.last_src_lang.is_some() {
            reset_room(state);
        }
        state.last_src_lang = patch.src_lang.clone();
    }

    let now = Instant::now();
    state.watchdog.record_event(now);

    let outcome = processor.process(
        patch,
        &mut state.unit_store,
        &mut state.cache,
        &mut state.context,
        &mut state.peek,
        target_langs,
        peek_min_confidence,
        metrics,
        now,
    )?;

    let (source_patch, pending_translation, peek_trigger) = match outcome {
        Outcome::Stale | Outcome::StaleEmpty => return Ok(()),
        Outcome::Accepted { source_patch, pending_translation, peek_trigger } => (source_patch, pending_translation, peek_trigger),
    };

    let mut closed = Vec::new();
    let enqueues = fanout::fan_out(room_id, Some(&source_patch), &[], &mut state.subscribers, translator, &mut state.tts_triggered, metrics, &mut closed).await;
    close_subscribers(state, &closed);
    route_tts_enqueues(state, enqueues, tts_event_tx, curve, synthesizer, metrics_arc, config);

    if let Some(trigger) = peek_trigger.filter(|_| config.translation_peek_enabled) {
        metrics.count_peek_revision();
        let results = translator
            .translate(room_id, &trigger.text, Some(&trigger.src_lang), &trigger.target_langs, std::slice::from_ref(&trigger.gender_context))
            .await;
        let now_ms = unix_ms();
        let revision_patches: Vec<EgressPatch> = results
            .into_iter()
            .map(|r| EgressPatch {
                unit_id: trigger.unit_id.clone(),
                stage: Stage::Hard,
                op: PatchOp::TranslationRevision,
                version: trigger.version,
                text: r.text,
                src_lang: Some(trigger.src_lang.clone()),
                target_lang: Some(r.lang),
                tts_final: Some(false),
                sent_len: None,
                ts: None,
                emitted_at: now_ms,
                provider: Some(r.provider),
            })
            .collect();
        let mut closed = Vec::new();
        fanout::fan_out(room_id, None, &revision_patches, &mut state.subscribers, translator, &mut state.tts_triggered, metrics, &mut closed).await;
        close_subscribers(state, &closed);
    }

    if let Some(pending) = pending_translation {
        if state.buffer.add(pending) {
            if let Some(segments) = Some(state.buffer.flush_now()).filter(|s| !s.is_empty()) {
                flush_and_distribute(room_id, segments, state, translator, metrics, tts_event_tx, curve, synthesizer, metrics_arc, config).await;
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn flush_and_distribute(
    room_id: &str,
    segments: Vec<translation_buffer::PendingSegment>,
    state: &mut RoomState,
    translator: &dyn Translator,
    metrics: &dyn MetricsCollector,
    tts_event_tx: &mpsc::UnboundedSender<TtsEvent>,
    curve: &SpeedCurveConfig,
    synthesizer: &Arc<dyn Synthesizer>,
    metrics_arc: &Arc<dyn MetricsCollector>,
    config: &Config,
) {
    let min_merge_chars = config.translation_merge_min_chars;
    let merge_window = Duration::from_millis(config.translation_merge_window_ms);
    let plan = translation_buffer::plan_flush(segments, min_merge_chars, merge_window);
    let context_texts = state.context.texts();
    let patches = translation_buffer::execute_flush(room_id, plan, translator, &mut state.cache, &context_texts).await;

    let mut closed = Vec::new();
    let enqueues = fanout::fan_out(room_id, None, &patches, &mut state.subscribers, translator, &mut state.tts_triggered, metrics, &mut closed).await;
    close_subscribers(state, &closed);
    route_tts_enqueues(state, enqueues, &mut tts_event_tx.clone(), curve, synthesizer, metrics_arc, config);
}

fn route_tts_enqueues(
    state: &mut RoomState,
    enqueues: Vec<fanout::TtsEnqueueRequest>,
    tts_event_tx: &mut mpsc::UnboundedSender<TtsEvent>,
    curve: &SpeedCurveConfig,
    synthesizer: &Arc<dyn Synthesizer>,
    metrics: &Arc<dyn MetricsCollector>,
    config: &Config,
) {
    for req in enqueues {
        let handle = state.tts_queues.entry(req.lang.clone()).or_insert_with(|| {
            tts_queue::spawn(
                "room".to_string(),
                req.lang.clone(),
                config.voice_for_lang(&req.lang).to_string(),
                curve.clone(),
                synthesizer.clone(),
                metrics.clone(),
                tts_event_tx.clone(),
            )
        });
        handle.enqueue(tts_queue::EnqueueRequest {
            unit_id: req.unit_id,
            text: req.text,
            voice: req.voice,
            sent_len: req.sent_len,
            version: req.version,
        });
    }
}

fn deliver_tts_event(state: &mut RoomState, event: TtsEvent, metrics: &dyn MetricsCollector) {
    match event {
        TtsEvent::AudioReady(audio) => {
            state.watchdog.record_audio(Instant::now());
            let lang = audio.lang.clone();
            broadcast_to_lang(&mut state.subscribers, &lang, EgressEvent::Audio(audio), metrics);
        }
        TtsEvent::Error { lang, unit_id } => {
            warn!(lang, unit_id, "tts synthesis error, skipping clip");
        }
        TtsEvent::SpeedRampStart { lang } => info!(lang, "tts speed ramp engaged"),
        TtsEvent::SpeedRampEnd { lang } => info!(lang, "tts speed ramp cleared"),
    }
}

fn broadcast_to_speaker(subscribers: &mut Vec<Subscriber>, event: EgressEvent, metrics: &dyn MetricsCollector) {
    let mut closed = Vec::new();
    for sub in subscribers.iter().filter(|s| s.role == Role::Speaker) {
        if sub.tx.send(event.clone()).is_err() {
            closed.push(sub.id);
            metrics.count_subscriber_write_failure();
        }
    }
    subscribers.retain(|s| !closed.contains(&s.id));
}

fn broadcast_to_lang(subscribers: &mut Vec<Subscriber>, lang: &str, event: EgressEvent, metrics: &dyn MetricsCollector) {
    let mut closed = Vec::new();
    for sub in subscribers.iter().filter(|s| s.wants_tts && s.lang == lang) {
        if sub.tx.send(event.clone()).is_err() {
            closed.push(sub.id);
            metrics.count_subscriber_write_failure();
        }
    }
    subscribers.retain(|s| !closed.contains(&s.id));
}

fn close_subscribers(state: &mut RoomState, closed: &[u64]) {
    if closed.is_empty() {
        return;
    }
    state.subscribers.retain(|s| !closed.contains(&s.id));
}

fn reset_room(state: &mut RoomState) {
    state.unit_store.clear();
    state.cache = TranslationCache::new(state.cache.len().max(1));
    state.context.clear();
    state.peek.clear();
    let _ = state.buffer.flush_now();
    for (_, q) in state.tts_queues.drain() {
        q.reset();
        q.shutdown();
    }
    state.tts_triggered.clear();
    state.watchdog.reset();
    for sub in &state.subscribers {
        let _ = sub.tx.send(EgressEvent::Reset);
    }
}

async fn shutdown(state: &mut RoomState, store: &Arc<dyn Store>, room_id: &str) {
    info!(room_id, "room shutting down");
    for (_, q) in state.tts_queues.drain() {
        q.shutdown();
    }
    for sub in state.subscribers.drain(..) {
        drop(sub.tx);
    }
    if let Err(e) = store.delete(&format!("{room_id}/state")).await {
        warn!(room_id, error = %e, "store delete failed during shutdown");
    }
}

fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::store::NoopStore;
    use crate::synthesizer::NoopSynthesizer;
    use crate::translator::NoopTranslator;

    fn deps() -> RoomDeps {
        RoomDeps {
            config: Config::default(),
            translator: Arc::new(NoopTranslator),
            synthesizer: Arc::new(NoopSynthesizer),
            store: Arc::new(NoopStore),
            metrics: Arc::new(NoopMetrics),
        }
    }

    #[tokio::test]
    async fn ingress_and_subscriber_round_trip() {
        let handle = spawn("room1".to_string(), vec!["fr-CA".to_string()], deps());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = handle
            .register_subscriber(
                SubscriberInfo {
                    role: Role::Listener,
                    lang: fanout::SOURCE_ALIAS.to_string(),
                    wants_tts: false,
                    voice: None,
                },
                tx,
            )
            .await
            .unwrap();
        assert_eq!(id, 0);

        let raw = RawIngressPatch {
            unit_id: Some("u1".to_string()),
            stage: Some("hard".to_string()),
            version: Some(1),
            text: Some("Hello there, how are you today?".to_string()),
            src_lang: Some("en-US".to_string()),
            ..Default::default()
        };
        handle.ingress(raw).await.unwrap();

        let event = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await.unwrap().unwrap();
        match event {
            EgressEvent::Patch(p) => assert_eq!(p.text, "Hello there, how are you today?"),
            other => panic!("unexpected event: {other:?}"),
        }

        handle.unregister_subscriber(id);
        handle.shutdown();
    }
}
