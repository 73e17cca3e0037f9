//! Error taxonomy for composite source control.

use thiserror::Error;

use crate::source::ChildKey;

/// Boxed error raised by a child collaborator.
pub type BoxedSourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Configuration problems, surfaced before any child runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No factory is registered under the referenced kind.
    #[error("unknown source kind '{kind}' (registered: {available:?})")]
    UnknownKind { kind: String, available: Vec<String> },

    /// A child entry did not name a kind at all.
    #[error("child #{index} does not declare a source kind")]
    EmptyKind { index: usize },

    /// The composite kind may not be registered or nested through configuration.
    #[error("composite source kind '{kind}' cannot be used as a child")]
    NestedComposite { kind: String },

    /// The factory for `kind` rejected its configuration payload.
    #[error("invalid configuration for source kind '{kind}': {reason}")]
    Invalid { kind: String, reason: String },

    /// The configuration document itself could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by composite source operations.
#[derive(Debug, Error)]
pub enum ScmError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A child's poll, checkout or environment call failed.
    #[error("source '{key}' failed: {source}")]
    ChildOperation {
        key: ChildKey,
        #[source]
        source: BoxedSourceError,
    },

    /// The child has no context to contribute (e.g. no environment).
    #[error("source context not available")]
    MissingContext,

    /// The enclosing build was interrupted.
    #[error("build interrupted")]
    Interrupted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScmError {
    /// Wrap a collaborator failure with the key of the child that raised it.
    ///
    /// Errors that already carry composite meaning (interruption, missing
    /// context, an inner child failure) pass through unchanged.
    pub fn child(key: &ChildKey, err: ScmError) -> Self {
        match err {
            ScmError::Interrupted | ScmError::MissingContext | ScmError::ChildOperation { .. } => {
                err
            }
            other => ScmError::ChildOperation {
                key: key.clone(),
                source: Box::new(other),
            },
        }
    }

    /// Build a child failure from any error type.
    pub fn from_source(key: &ChildKey, err: impl Into<BoxedSourceError>) -> Self {
        ScmError::ChildOperation {
            key: key.clone(),
            source: err.into(),
        }
    }
}

/// Result type for composite source operations.
pub type ScmResult<T> = std::result::Result<T, ScmError>;
