//! Revision snapshots and the composite revision state.
//!
//! A [`CompositeRevisionState`] maps each child (by stable key plus the
//! workspace it was evaluated against) to that child's opaque
//! [`RevisionState`]. The composite never looks inside a child snapshot; it
//! stores, retrieves, and forwards it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::source::ChildKey;

/// A child-defined snapshot of "what the repository looked like".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RevisionState {
    /// Neutral "no revision" sentinel handed to children without a baseline.
    None,
    /// Child-defined payload, opaque to the composite.
    Opaque {
        kind: String,
        data: serde_json::Value,
    },
    /// A nested composite state.
    Composite(CompositeRevisionState),
}

impl RevisionState {
    pub fn opaque(kind: impl Into<String>, data: serde_json::Value) -> Self {
        RevisionState::Opaque {
            kind: kind.into(),
            data,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, RevisionState::Composite(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RevisionState::None)
    }

    pub fn as_composite(&self) -> Option<&CompositeRevisionState> {
        match self {
            RevisionState::Composite(state) => Some(state),
            _ => None,
        }
    }
}

/// Identifies one entry inside a [`CompositeRevisionState`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionKey {
    pub child: ChildKey,
    /// Workspace the snapshot was evaluated against; `None` when polling ran
    /// without a workspace.
    pub workspace: Option<PathBuf>,
}

impl RevisionKey {
    pub fn new(child: &ChildKey, workspace: Option<&Path>) -> Self {
        Self {
            child: child.clone(),
            workspace: workspace.map(Path::to_path_buf),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RevisionEntry {
    key: RevisionKey,
    /// `None` records that the child explicitly reported "no state".
    state: Option<RevisionState>,
}

/// Aggregate snapshot: one entry per `(child key, workspace)` pair, kept in
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeRevisionState {
    entries: Vec<RevisionEntry>,
}

impl CompositeRevisionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `state` for `(child, workspace)`, overwriting any earlier entry
    /// for the same pair.
    pub fn add(&mut self, child: &ChildKey, workspace: Option<&Path>, state: Option<RevisionState>) {
        let key = RevisionKey::new(child, workspace);
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.state = state,
            None => self.entries.push(RevisionEntry { key, state }),
        }
    }

    /// Look up the snapshot for `(child, workspace)`.
    ///
    /// Absence is a normal outcome: the baseline predates the child, or the
    /// child explicitly recorded "no state".
    pub fn get(&self, child: &ChildKey, workspace: Option<&Path>) -> Option<&RevisionState> {
        let key = RevisionKey::new(child, workspace);
        self.entries
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.state.as_ref())
    }

    /// Whether an entry (possibly an explicit absence) exists for the pair.
    pub fn contains(&self, child: &ChildKey, workspace: Option<&Path>) -> bool {
        let key = RevisionKey::new(child, workspace);
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RevisionKey> {
        self.entries.iter().map(|e| &e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<CompositeRevisionState> for RevisionState {
    fn from(state: CompositeRevisionState) -> Self {
        RevisionState::Composite(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sha(s: &str) -> RevisionState {
        RevisionState::opaque("git", json!({ "sha": s }))
    }

    #[test]
    fn add_then_get_returns_stored_snapshot() {
        let mut state = CompositeRevisionState::new();
        let key = ChildKey::new("git:org/a");
        let ws = Path::new("/ws");
        state.add(&key, Some(ws), Some(sha("abc")));
        assert_eq!(state.get(&key, Some(ws)), Some(&sha("abc")));
    }

    #[test]
    fn add_same_pair_overwrites() {
        let mut state = CompositeRevisionState::new();
        let key = ChildKey::new("git:org/a");
        state.add(&key, None, Some(sha("abc")));
        state.add(&key, None, Some(sha("def")));
        assert_eq!(state.len(), 1);
        assert_eq!(state.get(&key, None), Some(&sha("def")));
    }

    #[test]
    fn workspace_is_part_of_the_key() {
        let mut state = CompositeRevisionState::new();
        let key = ChildKey::new("git:org/a");
        state.add(&key, Some(Path::new("/ws1")), Some(sha("one")));
        state.add(&key, Some(Path::new("/ws2")), Some(sha("two")));
        assert_eq!(state.len(), 2);
        assert_eq!(state.get(&key, Some(Path::new("/ws1"))), Some(&sha("one")));
        assert_eq!(state.get(&key, None), None);
    }

    #[test]
    fn explicit_absence_is_recorded_but_reads_as_none() {
        let mut state = CompositeRevisionState::new();
        let key = ChildKey::new("hg:fresh");
        state.add(&key, None, None);
        assert!(state.contains(&key, None));
        assert_eq!(state.get(&key, None), None);
    }

    #[test]
    fn unknown_child_is_absent_not_an_error() {
        let state = CompositeRevisionState::new();
        assert_eq!(state.get(&ChildKey::new("never-seen"), None), None);
        assert!(!state.contains(&ChildKey::new("never-seen"), None));
    }

    #[test]
    fn keys_preserve_insertion_order() {
        let mut state = CompositeRevisionState::new();
        for name in ["c", "a", "b"] {
            state.add(&ChildKey::new(name), None, Some(RevisionState::None));
        }
        let order: Vec<&str> = state.keys().map(|k| k.child.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn composite_state_survives_json_persistence() {
        let mut inner = CompositeRevisionState::new();
        inner.add(&ChildKey::new("svn:lib"), None, Some(sha("r42")));
        let mut state = CompositeRevisionState::new();
        state.add(&ChildKey::new("git:org/a"), Some(Path::new("/ws")), Some(sha("abc")));
        state.add(&ChildKey::new("nested"), None, Some(inner.into()));
        state.add(&ChildKey::new("fresh"), None, None);

        let raw = serde_json::to_string(&state).expect("serialize");
        let back: CompositeRevisionState = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(state, back);
        assert!(back
            .get(&ChildKey::new("nested"), None)
            .is_some_and(RevisionState::is_composite));
    }
}
