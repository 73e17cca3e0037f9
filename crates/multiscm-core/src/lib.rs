//! MultiSCM Core Library
//!
//! Treats a set of heterogeneous version-control sources as one logical
//! source for a CI build:
//! - [`polling`] merges per-child change verdicts into one
//! - [`checkout`] checks children out in order and merges their change-logs
//! - [`env`] merges environment variables without silent collisions
//! - [`capability`] combines capability flags and module roots
//!
//! Concrete backends implement [`ScmSource`] outside this crate.

pub mod build;
pub mod capability;
pub mod changelog;
pub mod checkout;
pub mod composite;
pub mod config;
pub mod env;
pub mod error;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod polling;
pub mod registry;
pub mod revision;
pub mod source;
pub mod telemetry;

pub use build::{ArtifactId, BuildArtifact, BuildContext, BuildRecord, SharedRevisionState};
pub use changelog::{ChangelogSection, ChangelogWriter, ParsedChangelog};
pub use composite::{CompositeScm, CompositeScmBuilder};
pub use config::{ChildConfig, CompositeConfig, SourceFactory, COMPOSITE_KIND};
pub use error::{BoxedSourceError, ConfigError, ScmError, ScmResult};
pub use polling::CompositePollingResult;
pub use registry::{ChildRegistry, ChildRegistryBuilder};
pub use revision::{CompositeRevisionState, RevisionKey, RevisionState};
pub use source::{Change, ChildKey, EnvVars, PollingResult, ScmSource};

pub use metrics::METRICS;
pub use telemetry::init_tracing;

/// MultiSCM version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
