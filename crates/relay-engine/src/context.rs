//! Rolling buffer of the last N hard units, used as translation context.
//! §4.1 step 7, §4.4.

use std::collections::VecDeque;

/// Bounded FIFO of recent hard-unit texts. Size is clamped 1..5 per the
/// `TRANSLATION_CONTEXT_SEGMENTS` configuration option.
///
/// Units are pushed as soon as they're accepted, which is before the unit
/// itself has gone through translation. To keep `texts()` excluding the
/// current unit (per §4.4), entries stay marked pending until the next
/// `texts()` call surfaces them — a unit's own push never appears in the
/// `texts()` result used for its own flush, only in later ones.
pub struct ContextBuffer {
    capacity: usize,
    entries: VecDeque<String>,
    pending: usize,
}

impl ContextBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, 5);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            pending: 0,
        }
    }

    pub fn push(&mut self, text: String) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.pending = self.pending.saturating_sub(1);
        }
        self.entries.push_back(text);
        self.pending = (self.pending + 1).min(self.entries.len());
    }

    /// The texts pushed before the last call to `texts()`, oldest first —
    /// excluding whatever has been pushed since, i.e. excluding the unit(s)
    /// about to be flushed using this context.
    pub fn texts(&mut self) -> Vec<String> {
        let visible = self.entries.len() - self.pending;
        let result = self.entries.iter().take(visible).cloned().collect();
        self.pending = 0;
        result
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending = 0;
    }
}
