//! Pluggable text-translation backend. §4.2.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// One target language's translation result.
#[derive(Debug, Clone)]
pub struct TranslatedSegment {
    pub lang: String,
    pub text: String,
    pub src_sent_len: Vec<usize>,
    pub trans_sent_len: Vec<usize>,
    pub provider: String,
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` (optionally tagged `from_lang`) into every language
    /// in `targets`, using `context_texts` (most recent last) as leading
    /// context for providers that support batched context windows.
    async fn translate(
        &self,
        room_id: &str,
        text: &str,
        from_lang: Option<&str>,
        targets: &[String],
        context_texts: &[String],
    ) -> Vec<TranslatedSegment>;
}

/// Identity passthrough used when no translation credentials are configured.
/// Per §4.2: every target receives the source text unchanged, stamped
/// `provider="noop"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
    async fn translate(
        &self,
        _room_id: &str,
        text: &str,
        _from_lang: Option<&str>,
        targets: &[String],
        _context_texts: &[String],
    ) -> Vec<TranslatedSegment> {
        let len = text.chars().count();
        targets
            .iter()
            .map(|lang| TranslatedSegment {
                lang: lang.clone(),
                text: text.to_string(),
                src_sent_len: vec![len],
                trans_sent_len: vec![len],
                provider: "noop".to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    text: &'a str,
    from: Option<&'a str>,
    to: &'a [String],
    context: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ResponseRecord {
    lang: String,
    text: String,
    #[serde(default)]
    sent_len: Option<Vec<usize>>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    translations: Vec<ResponseRecord>,
}

/// Thin `reqwest`-backed client over a primary/fallback pair of HTTP
/// translation services, mirroring the teacher's `reqwest`-based backend
/// clients in shape (JSON body out, JSON back) without any vendor-specific
/// API surface.
pub struct HttpTranslator {
    client: reqwest::Client,
    primary_url: String,
    fallback_url: Option<String>,
    primary_timeout: std::time::Duration,
    fallback_timeout: std::time::Duration,
    metrics: std::sync::Arc<dyn crate::metrics::MetricsCollector>,
}

impl HttpTranslator {
    pub fn new(
        primary_url: String,
        fallback_url: Option<String>,
        primary_timeout: std::time::Duration,
        fallback_timeout: std::time::Duration,
        metrics: std::sync::Arc<dyn crate::metrics::MetricsCollector>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            primary_url,
            fallback_url,
            primary_timeout,
            fallback_timeout,
            metrics,
        }
    }

    async fn call_one(
        &self,
        url: &str,
        timeout: std::time::Duration,
        text: &str,
        from_lang: Option<&str>,
        targets: &[String],
        context_texts: &[String],
    ) -> Result<ResponseBody, String> {
        let body = RequestBody {
            text,
            from: from_lang,
            to: targets,
            context: context_texts,
        };

        let resp = self
            .client
            .post(url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("translator returned {}", resp.status()));
        }

        resp.json::<ResponseBody>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        room_id: &str,
        text: &str,
        from_lang: Option<&str>,
        targets: &[String],
        context_texts: &[String],
    ) -> Vec<TranslatedSegment> {
        let src_len = text.chars().count();

        let primary_start = Instant::now();
        let primary = self
            .call_one(&self.primary_url, self.primary_timeout, text, from_lang, targets, context_texts)
            .await;
        let primary_ms = crate::metrics::duration_to_ms(primary_start.elapsed());
        for target in targets {
            self.metrics.record_translation(target, "primary", primary_ms, primary.is_ok());
        }

        let (body, provider) = match primary {
            Ok(body) => (Some(body), "primary"),
            Err(e) => {
                warn!(room_id, error = %e, "primary translator failed, trying fallback");
                match &self.fallback_url {
                    Some(url) => {
                        let fallback_start = Instant::now();
                        let fallback = self
                            .call_one(url, self.fallback_timeout, text, from_lang, targets, context_texts)
                            .await;
                        let fallback_ms = crate::metrics::duration_to_ms(fallback_start.elapsed());
                        for target in targets {
                            self.metrics.record_translation(target, "fallback", fallback_ms, fallback.is_ok());
                        }
                        match fallback {
                            Ok(body) => (Some(body), "fallback"),
                            Err(e2) => {
                                warn!(room_id, error = %e2, "fallback translator also failed");
                                (None, "none")
                            }
                        }
                    }
                    None => (None, "none"),
                }
            }
        };

        match body {
            Some(body) => body
                .translations
                .into_iter()
                .map(|r| {
                    let trans_len = r.sent_len.clone().unwrap_or_else(|| vec![r.text.chars().count()]);
                    TranslatedSegment {
                        lang: r.lang,
                        text: r.text,
                        src_sent_len: vec![src_len],
                        trans_sent_len: trans_len,
                        provider: provider.to_string(),
                    }
                })
                .collect(),
            None => {
                debug!(room_id, "translator exhausted, returning identity records");
                targets
                    .iter()
                    .map(|lang| TranslatedSegment {
                        lang: lang.clone(),
                        text: text.to_string(),
                        src_sent_len: vec![src_len],
                        trans_sent_len: vec![src_len],
                        provider: "none".to_string(),
                    })
                    .collect()
            }
        }
    }
}
