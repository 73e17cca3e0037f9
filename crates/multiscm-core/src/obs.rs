//! Structured observability hooks for polling and checkout cycles.
//!
//! This module provides:
//! - Cycle-scoped tracing spans via [`cycle_span`]
//! - Emission functions for per-child and per-cycle lifecycle events
//!
//! Events are emitted at `info!`/`debug!` level; filter with `RUST_LOG`.

use tracing::{debug, info};

use crate::build::BuildRecord;
use crate::source::{Change, ChildKey};

/// Span covering one polling or checkout cycle.
///
/// Attach it with [`tracing::Instrument`] so it follows the cycle across
/// await points.
///
/// # Example
///
/// ```ignore
/// checkout_children(..).instrument(cycle_span("checkout", ctx.record())).await
/// // every event inside carries cycle=checkout build=<number> build_id=<uuid>
/// ```
pub fn cycle_span(cycle: &'static str, record: &BuildRecord) -> tracing::Span {
    tracing::info_span!(
        "multiscm.cycle",
        cycle = cycle,
        build = record.number,
        build_id = %record.id
    )
}

/// Emit event: one child finished polling.
pub fn emit_poll_child(key: &ChildKey, change: Change) {
    debug!(event = "poll.child", key = %key, change = ?change);
}

/// Emit event: a baseline entry was skipped because it is a composite state
/// handed to a non-composite child.
pub fn emit_poll_skipped(key: &ChildKey) {
    tracing::warn!(
        event = "poll.skipped",
        key = %key,
        "baseline entry is a composite state; not handing it to a leaf source"
    );
}

/// Emit event: polling cycle finished with the overall verdict.
pub fn emit_poll_finished(project: &str, children: usize, change: Change) {
    info!(event = "poll.finished", project = %project, children = children, change = ?change);
}

/// Emit event: one child finished its checkout.
pub fn emit_checkout_child(key: &ChildKey, recorded_states: usize) {
    debug!(event = "checkout.child", key = %key, recorded_states = recorded_states);
}

/// Emit event: checkout cycle finished.
pub fn emit_checkout_finished(record: &BuildRecord, children: usize, success: bool) {
    info!(
        event = "checkout.finished",
        build = record.number,
        build_id = %record.id,
        elapsed_ms = record.elapsed_ms(),
        children = children,
        success = success
    );
}

/// Emit event: a child's change-log was merged into the composite document.
pub fn emit_changelog_section(key: &ChildKey, bytes: usize) {
    debug!(event = "changelog.section", key = %key, bytes = bytes);
}

/// Emit event: an environment variable was renamed to avoid a collision.
pub fn emit_env_collision(name: &str, renamed: &str, index: usize) {
    debug!(event = "env.collision", name = %name, renamed = %renamed, index = index);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_span_create() {
        let record = BuildRecord::new(1);
        let span = cycle_span("poll", &record);
        let _entered = span.enter();
        emit_poll_child(&ChildKey::new("git:a"), Change::None);
        emit_checkout_finished(&record, 1, true);
    }
}
