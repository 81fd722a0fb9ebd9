//! Pluggable text-to-speech backend. §6's "Synthesizer backend contract".

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub audio: Vec<u8>,
    pub format: String,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` spoken as `lang`/`voice` at `rate` (the TTS Queue's
    /// current speed multiplier).
    async fn synthesize(&self, text: &str, lang: &str, voice: &str, rate: f64) -> Result<SynthesizedAudio, String>;
}

/// No-op synthesizer: returns an empty, tagged "silence" clip. Used when no
/// synthesis backend is configured; callers still observe `audio-ready` so
/// the pipeline's bookkeeping stays exercised.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSynthesizer;

#[async_trait]
impl Synthesizer for NoopSynthesizer {
    async fn synthesize(&self, _text: &str, _lang: &str, _voice: &str, _rate: f64) -> Result<SynthesizedAudio, String> {
        Ok(SynthesizedAudio {
            audio: Vec::new(),
            format: "audio/silence".to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    text: &'a str,
    lang: &'a str,
    voice: &'a str,
    rate: f64,
}

/// Thin `reqwest`-backed client that POSTs a synthesis request and reads
/// back raw audio bytes, mirroring the teacher's streaming-fetch client in
/// shape but treating the response as one complete clip rather than a PCM
/// stream, since downstream listeners receive base64-framed clips over
/// their own WebSocket rather than a local audio sink.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: String,
    timeout: std::time::Duration,
}

impl HttpSynthesizer {
    pub fn new(url: String, timeout: std::time::Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout,
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, lang: &str, voice: &str, rate: f64) -> Result<SynthesizedAudio, String> {
        let body = RequestBody { text, lang, voice, rate };

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!(%status, "synthesizer returned non-success status");
            return Err(format!("synthesizer returned {status}"));
        }

        let format = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let audio = resp.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(SynthesizedAudio { audio, format })
    }
}
