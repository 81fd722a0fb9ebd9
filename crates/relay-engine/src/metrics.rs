//! Metrics collection for the room core.
//!
//! [`MetricsCollector`] decouples the engine from any specific metrics
//! backend (Prometheus, StatsD, ...). [`NoopMetrics`] is the zero-cost
//! default used when no backend is configured.

pub trait MetricsCollector: Send + Sync {
    /// A patch was rejected before reaching the Unit Store, with `reason`
    /// one of `stale_version`, `only_filler`.
    fn count_rejected(&self, reason: &str);

    /// A patch was accepted and a Unit was created or updated.
    fn count_accepted(&self, stage: &str);

    /// Translator outcome for one target language.
    fn record_translation(&self, target_lang: &str, provider: &str, latency_ms: u64, success: bool);

    /// A peek revision fired for a previous unit.
    fn count_peek_revision(&self);

    /// A TTS item was enqueued, deduplicated, or dropped as a duplicate,
    /// with `reason` one of `enqueued`, `duplicate_version`, `stale_version`.
    fn count_tts_enqueue(&self, lang: &str, reason: &str);

    /// A synthesis attempt failed for an enqueued item.
    fn count_synthesis_failure(&self, lang: &str);

    /// The TTS speed multiplier changed for a (room, lang) queue.
    fn record_speed_multiplier(&self, lang: &str, multiplier: f64);

    /// A subscriber's outbound channel write failed and the subscriber was closed.
    fn count_subscriber_write_failure(&self);

    /// A watchdog idle threshold was crossed and a restart advisory was sent.
    fn count_watchdog_advisory(&self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {
    fn count_rejected(&self, _reason: &str) {}
    fn count_accepted(&self, _stage: &str) {}
    fn record_translation(&self, _target_lang: &str, _provider: &str, _latency_ms: u64, _success: bool) {}
    fn count_peek_revision(&self) {}
    fn count_tts_enqueue(&self, _lang: &str, _reason: &str) {}
    fn count_synthesis_failure(&self, _lang: &str) {}
    fn record_speed_multiplier(&self, _lang: &str, _multiplier: f64) {}
    fn count_subscriber_write_failure(&self) {}
    fn count_watchdog_advisory(&self) {}
}

/// Helper to convert [`std::time::Duration`] to milliseconds as `u64`.
pub fn duration_to_ms(duration: std::time::Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_metrics_compiles() {
        let metrics = NoopMetrics;
        metrics.count_rejected("stale_version");
        metrics.record_translation("fr-CA", "noop", 10, true);
    }

    #[test]
    fn noop_metrics_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopMetrics>();
    }
}
