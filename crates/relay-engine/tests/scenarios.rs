//! End-to-end room scenarios wiring the Segment Processor, Translation
//! Buffer, Broadcast Fan-out, and TTS Queue together through the Room
//! Supervisor's public handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use relay_core::types::{RawIngressPatch, Role, SubscriberInfo};
use relay_engine::config::Config;
use relay_engine::fanout::EgressEvent;
use relay_engine::metrics::NoopMetrics;
use relay_engine::room::{self, RoomDeps};
use relay_engine::store::NoopStore;
use relay_engine::synthesizer::NoopSynthesizer;
use relay_engine::translator::{TranslatedSegment, Translator};

/// A translator that prefixes the target language tag onto the source text,
/// and produces a feminine-marked translation when the caller supplies a
/// `"Gender: female"` context hint (simulating how a real provider would use
/// the Peek Window's gender context to fix pronoun agreement).
struct MockTranslator;

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        _room_id: &str,
        text: &str,
        _from_lang: Option<&str>,
        targets: &[String],
        context_texts: &[String],
    ) -> Vec<TranslatedSegment> {
        let feminine = context_texts.iter().any(|c| c == "Gender: female");
        targets
            .iter()
            .map(|lang| {
                let translated = if feminine {
                    format!("[{lang}] elle {text}")
                } else {
                    format!("[{lang}] {text}")
                };
                TranslatedSegment {
                    lang: lang.clone(),
                    text: translated,
                    src_sent_len: vec![text.chars().count()],
                    trans_sent_len: vec![text.chars().count()],
                    provider: "mock".to_string(),
                }
            })
            .collect()
    }
}

fn no_merge_config() -> Config {
    Config {
        translation_merge_enabled: false,
        ..Config::default()
    }
}

fn deps(config: Config) -> RoomDeps {
    RoomDeps {
        config,
        translator: Arc::new(MockTranslator),
        synthesizer: Arc::new(NoopSynthesizer),
        store: Arc::new(NoopStore),
        metrics: Arc::new(NoopMetrics),
    }
}

fn raw(unit_id: &str, stage: &str, version: u64, text: &str, src_lang: Option<&str>) -> RawIngressPatch {
    RawIngressPatch {
        unit_id: Some(unit_id.to_string()),
        stage: Some(stage.to_string()),
        version: Some(version),
        text: Some(text.to_string()),
        src_lang: src_lang.map(str::to_string),
        ..Default::default()
    }
}

async fn recv_patch_text(rx: &mut mpsc::UnboundedReceiver<EgressEvent>) -> String {
    match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap() {
        EgressEvent::Patch(p) => p.text,
        other => panic!("expected patch, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_1_soft_refinement_then_stale() {
    let handle = room::spawn("room1".to_string(), vec![], deps(no_merge_config()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    handle
        .register_subscriber(
            SubscriberInfo { role: Role::Listener, lang: relay_engine::fanout::SOURCE_ALIAS.to_string(), wants_tts: false, voice: None },
            tx,
        )
        .await
        .unwrap();

    handle.ingress(raw("u|en|0", "soft", 1, "Hello", Some("en-US"))).await.unwrap();
    assert_eq!(recv_patch_text(&mut rx).await, "Hello");

    handle.ingress(raw("u|en|0", "soft", 2, "Hello, how", Some("en-US"))).await.unwrap();
    assert_eq!(recv_patch_text(&mut rx).await, "Hello, how");

    handle.ingress(raw("u|en|0", "soft", 2, "Hello, how are", Some("en-US"))).await.unwrap();
    assert!(rx.try_recv().is_err(), "stale patch must not be delivered");
}

#[tokio::test]
async fn scenario_2_continuation_dedupe() {
    let handle = room::spawn("room2".to_string(), vec![], deps(no_merge_config()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    handle
        .register_subscriber(
            SubscriberInfo { role: Role::Listener, lang: relay_engine::fanout::SOURCE_ALIAS.to_string(), wants_tts: false, voice: None },
            tx,
        )
        .await
        .unwrap();

    handle.ingress(raw("u|en|0", "soft", 1, "Hello", Some("en-US"))).await.unwrap();
    recv_patch_text(&mut rx).await;
    handle.ingress(raw("u|en|0", "soft", 2, "Hello, how", Some("en-US"))).await.unwrap();
    recv_patch_text(&mut rx).await;

    handle.ingress(raw("u|en|0", "soft", 3, "hello, how are you", Some("en-US"))).await.unwrap();
    assert_eq!(recv_patch_text(&mut rx).await, "Hello, how are you");
}

#[tokio::test]
async fn scenario_3_hard_finalization_triggers_translation_and_tts() {
    let handle = room::spawn("room3".to_string(), vec!["fr-CA".to_string()], deps(no_merge_config()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    handle
        .register_subscriber(SubscriberInfo { role: Role::Listener, lang: "fr-CA".to_string(), wants_tts: true, voice: None }, tx)
        .await
        .unwrap();

    handle
        .ingress(raw("u|en|0", "hard", 4, "Hello, how are you today?", Some("en-US")))
        .await
        .unwrap();

    let mut saw_patch = false;
    let mut saw_audio = false;
    for _ in 0..2 {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap() {
            EgressEvent::Patch(p) => {
                assert_eq!(p.text, "[fr-CA] Hello, how are you today?");
                assert_eq!(p.tts_final, Some(true));
                saw_patch = true;
            }
            EgressEvent::Audio(a) => {
                assert_eq!(a.lang, "fr-CA");
                assert_eq!(a.root_unit_id, "u|en|0");
                saw_audio = true;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(saw_patch && saw_audio);
}

#[tokio::test]
async fn scenario_4_tts_anti_duplication() {
    let handle = room::spawn("room4".to_string(), vec!["fr-CA".to_string()], deps(no_merge_config()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    handle
        .register_subscriber(SubscriberInfo { role: Role::Listener, lang: "fr-CA".to_string(), wants_tts: true, voice: None }, tx)
        .await
        .unwrap();

    handle
        .ingress(raw("u|en|0", "hard", 4, "Hello, how are you today?", Some("en-US")))
        .await
        .unwrap();
    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    }

    handle
        .ingress(raw("u|en|0", "hard", 5, "Hello, how are you today?", Some("en-US")))
        .await
        .unwrap();

    // Only the patch should arrive again; no second audio clip for the same root.
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    match event {
        EgressEvent::Patch(p) => assert_eq!(p.version, 5),
        other => panic!("expected patch, got {other:?}"),
    }
    assert!(rx.try_recv().is_err(), "root already triggered TTS, must not re-enqueue");
}

#[tokio::test]
async fn scenario_6_backward_peek_revises_prior_unit() {
    let handle = room::spawn("room6".to_string(), vec!["fr-CA".to_string()], deps(no_merge_config()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    handle
        .register_subscriber(SubscriberInfo { role: Role::Listener, lang: "fr-CA".to_string(), wants_tts: false, voice: None }, tx)
        .await
        .unwrap();

    handle
        .ingress(raw("u1", "hard", 1, "They arrived yesterday.", Some("en-US")))
        .await
        .unwrap();
    assert_eq!(recv_patch_text(&mut rx).await, "[fr-CA] They arrived yesterday.");

    handle.ingress(raw("u2", "hard", 1, "She looked tired.", Some("en-US"))).await.unwrap();
    assert_eq!(recv_patch_text(&mut rx).await, "[fr-CA] She looked tired.");

    let revision = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    match revision {
        EgressEvent::Patch(p) => {
            assert_eq!(p.unit_id, "u1");
            assert!(p.text.contains("elle"), "revision should carry feminine agreement: {}", p.text);
        }
        other => panic!("expected translation-revision patch, got {other:?}"),
    }
}

#[tokio::test]
async fn subscriber_never_sees_version_regress() {
    let handle = room::spawn("room7".to_string(), vec![], deps(no_merge_config()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    handle
        .register_subscriber(
            SubscriberInfo { role: Role::Listener, lang: relay_engine::fanout::SOURCE_ALIAS.to_string(), wants_tts: false, voice: None },
            tx,
        )
        .await
        .unwrap();

    handle.ingress(raw("u|en|0", "hard", 5, "Finalized.", Some("en-US"))).await.unwrap();
    recv_patch_text(&mut rx).await;

    handle.ingress(raw("u|en|0", "soft", 5, "Different", Some("en-US"))).await.unwrap();
    assert!(rx.try_recv().is_err(), "equal-version soft patch must not regress a hard unit");
}

#[allow(dead_code)]
fn unused_versions_helper() -> HashMap<String, u64> {
    HashMap::new()
}
