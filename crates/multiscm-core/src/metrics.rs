//! Global atomic counters for composite source activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a build).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    children_polled: AtomicU64,
    checkouts_performed: AtomicU64,
    changelog_sections: AtomicU64,
    env_collisions: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            children_polled: AtomicU64::new(0),
            checkouts_performed: AtomicU64::new(0),
            changelog_sections: AtomicU64::new(0),
            env_collisions: AtomicU64::new(0),
        }
    }

    pub fn inc_children_polled(&self) {
        self.children_polled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_checkouts(&self) {
        self.checkouts_performed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_changelog_sections(&self) {
        self.changelog_sections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_env_collisions(&self) {
        self.env_collisions.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            children_polled = self.children_polled(),
            checkouts_performed = self.checkouts_performed(),
            changelog_sections = self.changelog_sections(),
            env_collisions = self.env_collisions(),
        );
    }

    pub fn children_polled(&self) -> u64 {
        self.children_polled.load(Ordering::Relaxed)
    }

    pub fn checkouts_performed(&self) -> u64 {
        self.checkouts_performed.load(Ordering::Relaxed)
    }

    pub fn changelog_sections(&self) -> u64 {
        self.changelog_sections.load(Ordering::Relaxed)
    }

    pub fn env_collisions(&self) -> u64 {
        self.env_collisions.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.children_polled.store(0, Ordering::Relaxed);
        self.checkouts_performed.store(0, Ordering::Relaxed);
        self.changelog_sections.store(0, Ordering::Relaxed);
        self.env_collisions.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let m = Metrics::new();
        m.inc_children_polled();
        m.inc_children_polled();
        m.inc_checkouts();
        m.inc_env_collisions();
        assert_eq!(m.children_polled(), 2);
        assert_eq!(m.checkouts_performed(), 1);
        assert_eq!(m.changelog_sections(), 0);
        assert_eq!(m.env_collisions(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_children_polled();
        m.inc_changelog_sections();
        m.reset();
        assert_eq!(m.children_polled(), 0);
        assert_eq!(m.changelog_sections(), 0);
    }
}
