//! Sequential checkout of every child into the shared workspace.
//!
//! The composite revision state is attached to the build before the first
//! child runs, so a failure part-way through still leaves a (partial) state
//! on the build record. The merged change-log is streamed: the root tag is
//! written first and each child's section right after that child finishes.
//! When a child fails, the sections written so far are flushed but the root
//! element is left open.

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncWrite, BufWriter};
use tracing::{debug, warn, Instrument};

use crate::build::{ArtifactId, BuildArtifact, BuildContext, SharedRevisionState};
use crate::changelog::ChangelogWriter;
use crate::error::{ScmError, ScmResult};
use crate::metrics::METRICS;
use crate::obs::{cycle_span, emit_changelog_section, emit_checkout_child, emit_checkout_finished};
use crate::registry::ChildRegistry;
use crate::revision::{CompositeRevisionState, RevisionState};
use crate::source::{ChildKey, ScmSource};

type ChangelogFile = ChangelogWriter<BufWriter<File>>;

/// Private change-log location for the child at `index`.
pub fn child_changelog_path(target: &Path, index: usize) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(format!(".{index}.temp"));
    PathBuf::from(name)
}

/// Check out every child in registry order.
///
/// Returns the composite revision state recorded during the checkout; the
/// same state is attached to the build record.
pub async fn checkout(
    children: &ChildRegistry,
    ctx: &BuildContext,
    workspace: &Path,
    changelog: Option<&Path>,
    baseline: Option<&RevisionState>,
) -> ScmResult<CompositeRevisionState> {
    let result = run(children, ctx, workspace, changelog, baseline)
        .instrument(cycle_span("checkout", ctx.record()))
        .await;
    emit_checkout_finished(ctx.record(), children.len(), result.is_ok());
    METRICS.flush();
    result
}

async fn run(
    children: &ChildRegistry,
    ctx: &BuildContext,
    workspace: &Path,
    changelog: Option<&Path>,
    baseline: Option<&RevisionState>,
) -> ScmResult<CompositeRevisionState> {
    let baseline = baseline.and_then(RevisionState::as_composite);
    let state: SharedRevisionState = Arc::default();
    let _scope = ctx.begin_checkout(Arc::clone(&state));

    let mut writer = match changelog {
        Some(path) => Some(ChangelogWriter::start(BufWriter::new(File::create(path).await?)).await?),
        None => None,
    };

    // Artifacts attached before this checkout are not ours to absorb.
    let mut consumed: HashSet<ArtifactId> = ctx
        .record()
        .artifacts()
        .into_iter()
        .map(|(id, _)| id)
        .collect();

    let outcome = checkout_children(
        children,
        ctx,
        workspace,
        changelog,
        baseline,
        &state,
        &mut consumed,
        writer.as_mut(),
    )
    .await;

    if let Some(writer) = writer {
        match &outcome {
            Ok(()) => {
                writer.finish().await?;
            }
            Err(_) => {
                // Keep what was written; the error being returned matters more.
                if let Err(e) = writer.abandon().await {
                    tracing::warn!(event = "changelog.flush_failed", error = %e);
                }
            }
        }
    }
    outcome?;

    let recorded = state
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    Ok(recorded)
}

#[allow(clippy::too_many_arguments)]
async fn checkout_children(
    children: &ChildRegistry,
    ctx: &BuildContext,
    workspace: &Path,
    changelog: Option<&Path>,
    baseline: Option<&CompositeRevisionState>,
    state: &SharedRevisionState,
    consumed: &mut HashSet<ArtifactId>,
    mut writer: Option<&mut ChangelogFile>,
) -> ScmResult<()> {
    for (index, child) in children.iter().enumerate() {
        ctx.check_interrupted()?;
        let key = child.key();
        let child_log = changelog.map(|target| child_changelog_path(target, index));
        if let Some(path) = &child_log {
            remove_if_present(path).await?;
        }

        let child_baseline = baseline.and_then(|b| b.get(&key, Some(workspace)));
        if let Err(e) = child
            .checkout(ctx, workspace, child_log.as_deref(), child_baseline)
            .await
        {
            if let Some(path) = &child_log {
                if let Err(cleanup) = remove_if_present(path).await {
                    warn!(event = "checkout.temp_cleanup_failed", key = %key, error = %cleanup);
                }
            }
            return Err(ScmError::child(&key, e));
        }
        METRICS.inc_checkouts();

        let recorded = absorb_revisions(&**child, ctx, workspace, state, consumed);
        emit_checkout_child(&key, recorded);

        if let (Some(path), Some(writer)) = (&child_log, writer.as_deref_mut()) {
            merge_child_changelog(&key, path, writer).await?;
        }
    }
    Ok(())
}

/// Record what `child` attached during its checkout under its key.
///
/// A leaf contributes its revision artifacts; composite states are never
/// taken from a leaf. A nested composite contributes the composite state it
/// attached for itself, and the leaf revisions beneath it stay inside that
/// state. Everything seen is marked consumed.
fn absorb_revisions(
    child: &dyn ScmSource,
    ctx: &BuildContext,
    workspace: &Path,
    state: &SharedRevisionState,
    consumed: &mut HashSet<ArtifactId>,
) -> usize {
    let key = child.key();
    let nested = child.is_composite();
    let mut nested_recorded = false;
    let mut recorded = 0;
    for (id, artifact) in ctx.record().artifacts() {
        if !consumed.insert(id) {
            continue;
        }
        let revision = match artifact {
            BuildArtifact::CompositeRevision(inner) if nested && !nested_recorded => {
                nested_recorded = true;
                let snapshot = inner
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                RevisionState::Composite(snapshot)
            }
            BuildArtifact::Revision { source, state: revision }
                if !nested && !revision.is_composite() =>
            {
                if source != key {
                    debug!(event = "checkout.foreign_revision", key = %key, source = %source);
                }
                revision
            }
            _ => continue,
        };
        state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .add(&key, Some(workspace), Some(revision));
        recorded += 1;
    }
    recorded
}

async fn merge_child_changelog<W: AsyncWrite + Unpin>(
    key: &ChildKey,
    path: &Path,
    writer: &mut ChangelogWriter<W>,
) -> ScmResult<()> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if !raw.is_empty() {
        let text = String::from_utf8_lossy(&raw);
        if matches!(text, Cow::Owned(_)) {
            warn!(
                event = "changelog.invalid_utf8",
                key = %key,
                "change-log is not valid UTF-8; invalid bytes were replaced"
            );
        }
        writer.write_section(key, &text).await?;
        METRICS.inc_changelog_sections();
        emit_changelog_section(key, raw.len());
    }
    tokio::fs::remove_file(path).await?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> ScmResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
