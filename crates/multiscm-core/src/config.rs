//! Composite configuration and the factory that resolves it.
//!
//! Configuration parsing lives here, outside the orchestration core. A
//! [`SourceFactory`] is passed in explicitly; nothing is looked up from
//! process-wide state.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BoxedSourceError, ConfigError};
use crate::source::ScmSource;

/// Kind name reserved for the composite itself.
pub const COMPOSITE_KIND: &str = "multiscm";

/// One configured child: which implementation to build, plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildConfig {
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ChildConfig {
    pub fn new(kind: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }
}

/// Ordered list of child configurations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeConfig {
    /// Key of the composite itself; derived from the children when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub children: Vec<ChildConfig>,
}

impl CompositeConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a `.toml` or `.json` file (anything else is read as JSON).
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&raw),
            _ => Self::from_json(&raw),
        }
    }

    /// Structural checks that need no factory: every entry names a kind and
    /// none nests the composite.
    pub fn lint(&self) -> Result<(), ConfigError> {
        for (index, child) in self.children.iter().enumerate() {
            let kind = child.kind.trim();
            if kind.is_empty() {
                return Err(ConfigError::EmptyKind { index });
            }
            if kind == COMPOSITE_KIND {
                return Err(ConfigError::NestedComposite {
                    kind: kind.to_string(),
                });
            }
        }
        Ok(())
    }
}

type Constructor =
    Box<dyn Fn(&serde_json::Value) -> Result<Arc<dyn ScmSource>, BoxedSourceError> + Send + Sync>;

/// Explicit registry mapping a kind name to a source constructor.
#[derive(Default)]
pub struct SourceFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl SourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constructor` under `kind`, replacing any earlier one.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F) -> Result<(), ConfigError>
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn ScmSource>, BoxedSourceError>
            + Send
            + Sync
            + 'static,
    {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(ConfigError::EmptyKind { index: 0 });
        }
        if kind == COMPOSITE_KIND {
            return Err(ConfigError::NestedComposite { kind });
        }
        self.constructors.insert(kind, Box::new(constructor));
        Ok(())
    }

    /// Kinds a composite child may use, sorted.
    pub fn applicable_kinds(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Fail fast on the first entry that cannot be resolved, without
    /// constructing anything.
    pub fn validate(&self, config: &CompositeConfig) -> Result<(), ConfigError> {
        config.lint()?;
        for child in &config.children {
            let kind = child.kind.trim();
            if !self.contains(kind) {
                return Err(ConfigError::UnknownKind {
                    kind: kind.to_string(),
                    available: self.applicable_kinds(),
                });
            }
        }
        Ok(())
    }

    /// Construct one source from its configuration.
    pub fn create(&self, child: &ChildConfig) -> Result<Arc<dyn ScmSource>, ConfigError> {
        let kind = child.kind.trim();
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownKind {
                kind: kind.to_string(),
                available: self.applicable_kinds(),
            })?;
        constructor(&child.config).map_err(|e| ConfigError::Invalid {
            kind: kind.to_string(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for SourceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFactory")
            .field("kinds", &self.applicable_kinds())
            .finish()
    }
}
