//! The collaborator interface every child source implements.
//!
//! Concrete backends (git, hg, svn, ...) live outside this crate. The
//! composite only orchestrates implementations of [`ScmSource`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::build::BuildContext;
use crate::error::ScmResult;
use crate::revision::RevisionState;

/// Stable identity of a child source.
///
/// Persisted inside saved build state, so it must survive process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildKey(String);

impl ChildKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChildKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Severity of a detected change. Ordered: `None < Insignificant < Significant`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    /// Nothing changed.
    #[default]
    None,
    /// Something changed, but not enough to warrant a build.
    Insignificant,
    /// A build should be triggered.
    Significant,
}

impl Change {
    pub fn is_significant(self) -> bool {
        self == Change::Significant
    }
}

/// Outcome of polling one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingResult {
    /// The baseline the poll compared against, if any.
    pub baseline: Option<RevisionState>,
    /// What the remote looks like right now.
    pub remote: RevisionState,
    pub change: Change,
}

impl PollingResult {
    pub fn new(baseline: Option<RevisionState>, remote: RevisionState, change: Change) -> Self {
        Self {
            baseline,
            remote,
            change,
        }
    }

    /// Remote state unknown, nothing changed.
    pub fn no_changes() -> Self {
        Self::new(None, RevisionState::None, Change::None)
    }
}

/// Environment variables contributed by a source, ordered by name.
pub type EnvVars = BTreeMap<String, String>;

/// Capability interface for one version-control backend.
#[async_trait]
pub trait ScmSource: Send + Sync {
    /// Stable key used to correlate state across builds.
    fn key(&self) -> ChildKey;

    /// Snapshot of the repository as the given build left it.
    ///
    /// `Ok(None)` means the source legitimately has no state (e.g. an
    /// uninitialised repository).
    async fn snapshot(
        &self,
        ctx: &BuildContext,
        workspace: Option<&Path>,
    ) -> ScmResult<Option<RevisionState>>;

    /// Compare `baseline` against the live repository.
    async fn poll(
        &self,
        ctx: &BuildContext,
        workspace: Option<&Path>,
        baseline: &RevisionState,
    ) -> ScmResult<PollingResult>;

    /// Check out into `workspace`, writing this source's native change-log to
    /// `changelog` when given.
    async fn checkout(
        &self,
        ctx: &BuildContext,
        workspace: &Path,
        changelog: Option<&Path>,
        baseline: Option<&RevisionState>,
    ) -> ScmResult<()>;

    /// Environment contributions. `Ok(None)` means nothing to contribute.
    async fn build_environment(&self, ctx: &BuildContext) -> ScmResult<Option<EnvVars>>;

    /// Directories inside `workspace` this source owns.
    fn module_roots(&self, workspace: &Path) -> Vec<PathBuf>;

    fn supports_polling(&self) -> bool {
        true
    }

    fn requires_workspace_for_polling(&self) -> bool {
        true
    }

    /// Whether this source aggregates other sources.
    fn is_composite(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_total_order() {
        assert!(Change::None < Change::Insignificant);
        assert!(Change::Insignificant < Change::Significant);
        assert_eq!(
            [Change::Insignificant, Change::Significant, Change::None]
                .into_iter()
                .max(),
            Some(Change::Significant)
        );
    }

    #[test]
    fn child_key_serializes_as_plain_string() {
        let key = ChildKey::new("git:org/app");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"git:org/app\"");
        assert_eq!(key.to_string(), "git:org/app");
    }

    #[test]
    fn change_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Change::Insignificant).unwrap(),
            "\"insignificant\""
        );
    }
}
