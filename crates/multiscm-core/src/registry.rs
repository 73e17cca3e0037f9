//! Ordered set of child sources.
//!
//! Configuration order is the canonical iteration order for polling,
//! checkout, environment merging and module-root aggregation.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::source::{ChildKey, ScmSource};

/// Immutable, ordered sequence of child sources.
#[derive(Clone, Default)]
pub struct ChildRegistry {
    children: Vec<Arc<dyn ScmSource>>,
}

impl ChildRegistry {
    pub fn builder() -> ChildRegistryBuilder {
        ChildRegistryBuilder::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ScmSource>> {
        self.children.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn ScmSource>> {
        self.children.get(index)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Child keys in registry order.
    pub fn keys(&self) -> Vec<ChildKey> {
        self.children.iter().map(|c| c.key()).collect()
    }

    /// Position of the first child with `key`.
    pub fn position(&self, key: &ChildKey) -> Option<usize> {
        self.children.iter().position(|c| &c.key() == key)
    }
}

impl std::fmt::Debug for ChildRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

impl<'a> IntoIterator for &'a ChildRegistry {
    type Item = &'a Arc<dyn ScmSource>;
    type IntoIter = std::slice::Iter<'a, Arc<dyn ScmSource>>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

/// Collects children in order, then freezes them into a [`ChildRegistry`].
#[derive(Default)]
pub struct ChildRegistryBuilder {
    children: Vec<Arc<dyn ScmSource>>,
}

impl ChildRegistryBuilder {
    pub fn child(mut self, source: Arc<dyn ScmSource>) -> Self {
        self.children.push(source);
        self
    }

    pub fn push(&mut self, source: Arc<dyn ScmSource>) {
        self.children.push(source);
    }

    pub fn build(self) -> ChildRegistry {
        let mut seen = HashSet::new();
        for child in &self.children {
            let key = child.key();
            if !seen.insert(key.clone()) {
                warn!(
                    event = "registry.duplicate_key",
                    key = %key,
                    "two children share a key; their revision entries will overwrite each other"
                );
            }
        }
        ChildRegistry {
            children: self.children,
        }
    }
}
