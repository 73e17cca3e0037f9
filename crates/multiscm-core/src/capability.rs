//! Capability flags and module roots aggregated across children.

use std::path::{Path, PathBuf};

use crate::registry::ChildRegistry;

/// Polling is supported only when every child supports it.
pub fn supports_polling(children: &ChildRegistry) -> bool {
    children.iter().all(|c| c.supports_polling())
}

/// A workspace is required for polling when any child requires one.
pub fn requires_workspace_for_polling(children: &ChildRegistry) -> bool {
    children.iter().any(|c| c.requires_workspace_for_polling())
}

/// Every child's module roots, concatenated in registry order. No dedup.
pub fn module_roots(children: &ChildRegistry, workspace: &Path) -> Vec<PathBuf> {
    children
        .iter()
        .flat_map(|c| c.module_roots(workspace))
        .collect()
}
