//! WebSocket transport for the speaker ingress and subscriber egress
//! channels. §6, §12.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use relay_core::types::{RawIngressPatch, Role, SubscriberInfo, WindowState};
use relay_engine::fanout::EgressEvent;

use crate::AppState;

pub async fn healthz() -> &'static str {
    "ok"
}

fn window_rejection(state: &AppState, slug: &str) -> Option<Response> {
    let metadata = state.metadata.get(slug)?;
    let window = state.metadata.window_state(&metadata, now_ms());
    match window {
        WindowState::Early => Some((axum::http::StatusCode::FORBIDDEN, "room not open yet").into_response()),
        WindowState::Expired => Some((axum::http::StatusCode::GONE, "room window has closed").into_response()),
        WindowState::Open => None,
    }
}

pub async fn speaker_ws(Path(slug): Path<String>, State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if let Some(rejection) = window_rejection(&state, &slug) {
        return rejection;
    }
    ws.on_upgrade(move |socket| handle_speaker(socket, state, slug))
}

#[derive(Debug, Deserialize)]
struct ListenParams {
    lang: String,
    #[serde(default)]
    tts: bool,
    #[serde(default)]
    voice: Option<String>,
}

pub async fn listener_ws(
    Path(slug): Path<String>,
    Query(params): Query<ListenParams>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(rejection) = window_rejection(&state, &slug) {
        return rejection;
    }
    ws.on_upgrade(move |socket| handle_listener(socket, state, slug, params))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
enum SpeakerControl {
    Heartbeat {
        #[serde(default)]
        pcm: bool,
    },
    Resume {
        versions: HashMap<String, u64>,
    },
    Reset,
}

async fn handle_speaker(socket: WebSocket, state: AppState, slug: String) {
    let room = state.registry.get_or_create(&slug);
    let (tx, mut rx) = mpsc::unbounded_channel::<EgressEvent>();
    let subscriber_id = room
        .register_subscriber(
            SubscriberInfo {
                role: Role::Speaker,
                lang: relay_engine::fanout::SOURCE_ALIAS.to_string(),
                wants_tts: false,
                voice: None,
            },
            tx.clone(),
        )
        .await;
    let Some(subscriber_id) = subscriber_id else {
        return;
    };

    let _ = tx.send(EgressEvent::Hello {
        room_id: slug.clone(),
        role: Role::Speaker,
        lang: relay_engine::fanout::SOURCE_ALIAS.to_string(),
        wants_tts: false,
    });

    let (mut sink, mut stream) = socket.split();

    let outbound = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(msg) = egress_to_message(&event) {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                if let Ok(raw) = serde_json::from_str::<RawIngressPatch>(&text) {
                    if let Err(e) = room.ingress(raw).await {
                        debug!(slug, status = e.status_code(), error = %e, "ingress rejected");
                    }
                    continue;
                }
                if let Ok(ctrl) = serde_json::from_str::<SpeakerControl>(&text) {
                    match ctrl {
                        SpeakerControl::Heartbeat { pcm } => room.heartbeat(pcm),
                        SpeakerControl::Resume { versions } => room.resume(subscriber_id, versions),
                        SpeakerControl::Reset => room.explicit_reset(),
                    }
                } else {
                    warn!(slug, "unrecognized speaker text frame");
                }
            }
            Message::Binary(_) => room.audio_heartbeat(),
            Message::Close(_) => break,
            _ => {}
        }
    }

    room.unregister_subscriber(subscriber_id);
    outbound.abort();
}

async fn handle_listener(socket: WebSocket, state: AppState, slug: String, params: ListenParams) {
    let room = state.registry.get_or_create(&slug);
    let (tx, mut rx) = mpsc::unbounded_channel::<EgressEvent>();
    let info = SubscriberInfo {
        role: Role::Listener,
        lang: params.lang.clone(),
        wants_tts: params.tts,
        voice: params.voice,
    };
    let subscriber_id = room.register_subscriber(info, tx.clone()).await;
    let Some(subscriber_id) = subscriber_id else {
        return;
    };

    let _ = tx.send(EgressEvent::Hello {
        room_id: slug.clone(),
        role: Role::Listener,
        lang: params.lang.clone(),
        wants_tts: params.tts,
    });

    let (mut sink, mut stream) = socket.split();

    let outbound = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(msg) = egress_to_message(&event) {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                if let Ok(ctrl) = serde_json::from_str::<SpeakerControl>(&text) {
                    if let SpeakerControl::Resume { versions } = ctrl {
                        room.resume(subscriber_id, versions);
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    room.unregister_subscriber(subscriber_id);
    outbound.abort();
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum EgressWire<'a> {
    Hello { room_id: &'a str, role: &'a str, lang: &'a str, wants_tts: bool },
    Patch { payload: &'a relay_core::types::EgressPatch },
    Tts { payload: AudioWire<'a> },
    Reset,
    Watchdog { idle: bool },
}

#[derive(Serialize)]
struct AudioWire<'a> {
    unit_id: &'a str,
    root_unit_id: &'a str,
    lang: &'a str,
    text: &'a str,
    audio: String,
    format: &'a str,
    voice: &'a str,
    sent_len: Option<usize>,
    version: u64,
}

fn egress_to_message(event: &EgressEvent) -> Option<Message> {
    let wire = match event {
        EgressEvent::Hello { room_id, role, lang, wants_tts } => EgressWire::Hello {
            room_id,
            role: match role {
                Role::Speaker => "speaker",
                Role::Listener => "listener",
            },
            lang,
            wants_tts: *wants_tts,
        },
        EgressEvent::Patch(patch) => EgressWire::Patch { payload: patch },
        EgressEvent::Audio(audio) => EgressWire::Tts {
            payload: AudioWire {
                unit_id: &audio.unit_id,
                root_unit_id: &audio.root_unit_id,
                lang: &audio.lang,
                text: &audio.text,
                audio: base64::engine::general_purpose::STANDARD.encode(&audio.audio),
                format: &audio.format,
                voice: &audio.voice,
                sent_len: audio.sent_len,
                version: audio.version,
            },
        },
        EgressEvent::Reset => EgressWire::Reset,
        EgressEvent::Watchdog { idle } => EgressWire::Watchdog { idle: *idle },
    };
    serde_json::to_string(&wire).ok().map(|s| Message::Text(s.into()))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
