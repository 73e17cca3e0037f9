//! Build context and the build record children attach artifacts to.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ScmError, ScmResult};
use crate::revision::{CompositeRevisionState, RevisionState};
use crate::source::ChildKey;

/// Composite revision state shared between the build record and the
/// checkout in progress.
pub type SharedRevisionState = Arc<RwLock<CompositeRevisionState>>;

/// Unique identity of an attached artifact (object identity, not content).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(pub u64);

/// Something a source or the composite attached to a build.
#[derive(Debug, Clone)]
pub enum BuildArtifact {
    /// A child's revision snapshot, contributed during checkout.
    Revision {
        source: ChildKey,
        state: RevisionState,
    },
    /// A composite's own revision state, attached when its checkout starts.
    CompositeRevision(SharedRevisionState),
}

/// Append-only list of artifacts attached to one build.
#[derive(Debug)]
pub struct BuildRecord {
    pub id: Uuid,
    pub number: u64,
    pub started_at: DateTime<Utc>,
    next_artifact: AtomicU64,
    artifacts: Mutex<Vec<(ArtifactId, BuildArtifact)>>,
    checkout_depth: AtomicUsize,
    outermost_checkout: Mutex<Option<ArtifactId>>,
}

impl BuildRecord {
    pub fn new(number: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            started_at: Utc::now(),
            next_artifact: AtomicU64::new(1),
            artifacts: Mutex::new(Vec::new()),
            checkout_depth: AtomicUsize::new(0),
            outermost_checkout: Mutex::new(None),
        }
    }

    /// Milliseconds since the build started.
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }

    /// Attach an artifact and return its identity.
    pub fn attach(&self, artifact: BuildArtifact) -> ArtifactId {
        let id = ArtifactId(self.next_artifact.fetch_add(1, Ordering::Relaxed));
        self.artifacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, artifact));
        id
    }

    /// Snapshot of every attached artifact, in attachment order.
    pub fn artifacts(&self) -> Vec<(ArtifactId, BuildArtifact)> {
        self.artifacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current contents of the composite revision state attached by the
    /// most recent top-level checkout. States attached by nested composites
    /// during that checkout are not returned; they live inside it.
    ///
    /// Before any checkout has run, returns the latest composite state
    /// attached directly.
    pub fn composite_revision(&self) -> Option<CompositeRevisionState> {
        let outermost = *self
            .outermost_checkout
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.artifacts()
            .into_iter()
            .rev()
            .filter(|(id, _)| outermost.map_or(true, |o| *id == o))
            .find_map(|(_, artifact)| match artifact {
                BuildArtifact::CompositeRevision(shared) => Some(
                    shared
                        .read()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .clone(),
                ),
                _ => None,
            })
    }
}

/// Marks a composite checkout in progress. Nested checkouts started while a
/// scope is alive are not top-level; dropping the scope ends the checkout.
#[derive(Debug)]
pub struct CheckoutScope {
    record: Arc<BuildRecord>,
    id: ArtifactId,
}

impl CheckoutScope {
    /// Id of the composite state attached when the scope began.
    pub fn artifact_id(&self) -> ArtifactId {
        self.id
    }
}

impl Drop for CheckoutScope {
    fn drop(&mut self) {
        self.record.checkout_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a source needs to know about the build it runs in.
#[derive(Debug, Clone)]
pub struct BuildContext {
    record: Arc<BuildRecord>,
    interrupted: Arc<AtomicBool>,
}

impl BuildContext {
    pub fn new(record: Arc<BuildRecord>) -> Self {
        Self {
            record,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Context for a fresh build numbered `number`.
    pub fn for_build(number: u64) -> Self {
        Self::new(Arc::new(BuildRecord::new(number)))
    }

    pub fn record(&self) -> &Arc<BuildRecord> {
        &self.record
    }

    /// Attach `state` as a composite checkout's revision state and open its
    /// scope. The first scope opened while no other is alive becomes the
    /// build's top-level checkout.
    pub fn begin_checkout(&self, state: SharedRevisionState) -> CheckoutScope {
        let depth = self.record.checkout_depth.fetch_add(1, Ordering::SeqCst);
        let id = self.record.attach(BuildArtifact::CompositeRevision(state));
        if depth == 0 {
            *self
                .record
                .outermost_checkout
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(id);
        }
        CheckoutScope {
            record: Arc::clone(&self.record),
            id,
        }
    }

    /// Mark the build interrupted. Visible to every clone of this context.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Fail with [`ScmError::Interrupted`] once the build was interrupted.
    pub fn check_interrupted(&self) -> ScmResult<()> {
        if self.is_interrupted() {
            return Err(ScmError::Interrupted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_assigns_distinct_ids_for_equal_content() {
        let record = BuildRecord::new(7);
        let artifact = BuildArtifact::Revision {
            source: ChildKey::new("git:a"),
            state: RevisionState::None,
        };
        let first = record.attach(artifact.clone());
        let second = record.attach(artifact);
        assert_ne!(first, second);
        assert_eq!(record.artifacts().len(), 2);
    }

    #[test]
    fn composite_revision_reads_latest_shared_state() {
        let record = BuildRecord::new(1);
        assert!(record.composite_revision().is_none());

        let shared: SharedRevisionState = Arc::default();
        record.attach(BuildArtifact::CompositeRevision(Arc::clone(&shared)));
        shared
            .write()
            .unwrap()
            .add(&ChildKey::new("git:a"), None, Some(RevisionState::None));

        let seen = record.composite_revision().expect("attached");
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn composite_revision_prefers_the_outermost_checkout() {
        let ctx = BuildContext::for_build(2);
        let outer: SharedRevisionState = Arc::default();
        let inner: SharedRevisionState = Arc::default();

        let outer_scope = ctx.begin_checkout(Arc::clone(&outer));
        {
            let _inner_scope = ctx.begin_checkout(Arc::clone(&inner));
            inner
                .write()
                .unwrap()
                .add(&ChildKey::new("inner:x"), None, Some(RevisionState::None));
        }
        outer
            .write()
            .unwrap()
            .add(&ChildKey::new("leaf"), None, None);
        outer
            .write()
            .unwrap()
            .add(&ChildKey::new("inner"), None, None);
        drop(outer_scope);

        let seen = ctx.record().composite_revision().expect("attached");
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&ChildKey::new("leaf"), None));

        // A later top-level checkout takes over.
        let next: SharedRevisionState = Arc::default();
        let scope = ctx.begin_checkout(Arc::clone(&next));
        assert_ne!(scope.artifact_id(), ArtifactId(0));
        drop(scope);
        assert_eq!(ctx.record().composite_revision(), Some(CompositeRevisionState::new()));
    }

    #[test]
    fn elapsed_is_never_negative() {
        let record = BuildRecord::new(1);
        assert!(record.elapsed_ms() >= 0);
    }

    #[test]
    fn interrupt_is_shared_between_clones() {
        let ctx = BuildContext::for_build(3);
        let clone = ctx.clone();
        assert!(ctx.check_interrupted().is_ok());
        clone.interrupt();
        assert!(ctx.is_interrupted());
        assert!(matches!(ctx.check_interrupted(), Err(ScmError::Interrupted)));
    }
}
