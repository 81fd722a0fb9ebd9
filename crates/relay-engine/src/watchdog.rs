//! Per-room liveness watchdog. §4.7.
//!
//! Tracks the wall-clock time of the last accepted ingress event and the
//! last produced audio clip; a periodic check compares both against their
//! idle thresholds and emits a restart advisory when both are stale at once.

use std::time::{Duration, Instant};

pub const CHECK_INTERVAL: Duration = Duration::from_secs(5);

pub struct Watchdog {
    event_idle: Duration,
    pcm_idle: Duration,
    last_event: Option<Instant>,
    last_audio: Option<Instant>,
    advisory_active: bool,
}

impl Watchdog {
    pub fn new(event_idle: Duration, pcm_idle: Duration) -> Self {
        Self {
            event_idle,
            pcm_idle,
            last_event: None,
            last_audio: None,
            advisory_active: false,
        }
    }

    pub fn record_event(&mut self, now: Instant) {
        self.last_event = Some(now);
    }

    pub fn record_audio(&mut self, now: Instant) {
        self.last_audio = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_event = None;
        self.last_audio = None;
        self.advisory_active = false;
    }

    /// Check both idle thresholds against `now`. Returns `true` the first
    /// time both the event and audio timers have crossed their thresholds
    /// at once; returns `false` on subsequent checks while still stalled
    /// (the advisory is edge-triggered, not level-driven), and clears the
    /// latched state once the room has seen fresh activity on either timer.
    pub fn check(&mut self, now: Instant) -> bool {
        let event_stalled = self.last_event.is_some_and(|t| now.duration_since(t) >= self.event_idle);
        let audio_stalled = self.last_audio.is_some_and(|t| now.duration_since(t) >= self.pcm_idle);

        let stalled = event_stalled && audio_stalled;
        if stalled && !self.advisory_active {
            self.advisory_active = true;
            return true;
        }
        if !stalled {
            self.advisory_active = false;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_advisory_with_no_activity_recorded() {
        let mut wd = Watchdog::new(Duration::from_millis(100), Duration::from_millis(100));
        assert!(!wd.check(Instant::now()));
    }

    #[test]
    fn event_stall_alone_does_not_fire() {
        let mut wd = Watchdog::new(Duration::from_millis(10), Duration::from_millis(10));
        let t0 = Instant::now();
        wd.record_event(t0);
        wd.record_audio(t0 + Duration::from_millis(15));
        let later = t0 + Duration::from_millis(20);
        assert!(!wd.check(later));
    }

    #[test]
    fn audio_stall_alone_does_not_fire() {
        let mut wd = Watchdog::new(Duration::from_secs(60), Duration::from_millis(10));
        let t0 = Instant::now();
        wd.record_event(t0);
        wd.record_audio(t0);
        let later = t0 + Duration::from_millis(20);
        assert!(!wd.check(later));
    }

    #[test]
    fn both_stalled_fires_once() {
        let mut wd = Watchdog::new(Duration::from_millis(10), Duration::from_millis(10));
        let t0 = Instant::now();
        wd.record_event(t0);
        wd.record_audio(t0);
        let later = t0 + Duration::from_millis(20);
        assert!(wd.check(later));
        // Still stalled on the next check, but already latched.
        assert!(!wd.check(later + Duration::from_millis(1)));
    }

    #[test]
    fn advisory_clears_after_fresh_activity() {
        let mut wd = Watchdog::new(Duration::from_millis(10), Duration::from_millis(10));
        let t0 = Instant::now();
        wd.record_event(t0);
        wd.record_audio(t0);
        let later = t0 + Duration::from_millis(20);
        assert!(wd.check(later));
        wd.record_event(later);
        wd.record_audio(later);
        assert!(!wd.check(later + Duration::from_millis(1)));
        let stalled_again = later + Duration::from_millis(25);
        assert!(wd.check(stalled_again));
    }
}
