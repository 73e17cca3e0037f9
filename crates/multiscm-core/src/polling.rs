//! Polling: compare a composite baseline against every child's live state.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::build::BuildContext;
use crate::error::{ScmError, ScmResult};
use crate::metrics::METRICS;
use crate::obs::{cycle_span, emit_poll_child, emit_poll_finished, emit_poll_skipped};
use crate::registry::ChildRegistry;
use crate::revision::{CompositeRevisionState, RevisionState};
use crate::source::{Change, PollingResult};

/// Outcome of one composite polling cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositePollingResult {
    /// The composite baseline the cycle compared against, if there was one.
    pub baseline: Option<CompositeRevisionState>,
    /// Live state reported by every polled child.
    pub current: CompositeRevisionState,
    /// Most severe change reported by any child.
    pub change: Change,
}

impl From<CompositePollingResult> for PollingResult {
    fn from(result: CompositePollingResult) -> Self {
        PollingResult::new(
            result.baseline.map(RevisionState::Composite),
            RevisionState::Composite(result.current),
            result.change,
        )
    }
}

/// Poll every child in registry order and merge the verdicts.
///
/// A `baseline` that is not a composite state is treated as no baseline at
/// all. A child failure aborts the whole cycle; there is no partial result.
pub async fn poll(
    children: &ChildRegistry,
    project: &str,
    ctx: &BuildContext,
    workspace: Option<&Path>,
    baseline: Option<&RevisionState>,
) -> ScmResult<CompositePollingResult> {
    poll_children(children, project, ctx, workspace, baseline)
        .instrument(cycle_span("poll", ctx.record()))
        .await
}

async fn poll_children(
    children: &ChildRegistry,
    project: &str,
    ctx: &BuildContext,
    workspace: Option<&Path>,
    baseline: Option<&RevisionState>,
) -> ScmResult<CompositePollingResult> {
    let baseline = baseline.and_then(RevisionState::as_composite);
    let mut current = CompositeRevisionState::new();
    let mut overall = Change::None;

    for child in children {
        ctx.check_interrupted()?;
        let key = child.key();
        let child_baseline = baseline.and_then(|b| b.get(&key, workspace));

        if child_baseline.is_some_and(RevisionState::is_composite) && !child.is_composite() {
            emit_poll_skipped(&key);
            continue;
        }

        let result = child
            .poll(ctx, workspace, child_baseline.unwrap_or(&RevisionState::None))
            .await
            .map_err(|e| ScmError::child(&key, e))?;
        METRICS.inc_children_polled();
        emit_poll_child(&key, result.change);

        current.add(&key, workspace, Some(result.remote));
        overall = overall.max(result.change);
    }

    emit_poll_finished(project, children.len(), overall);
    Ok(CompositePollingResult {
        baseline: baseline.cloned(),
        current,
        change: overall,
    })
}
