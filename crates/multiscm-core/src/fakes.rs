//! In-memory fakes for the source interface (testing only)
//!
//! [`ScriptedSource`] satisfies the [`ScmSource`] contract without touching
//! any real repository: verdicts, snapshots, change-log text, environment and
//! failures are all scripted up front.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::build::{BuildArtifact, BuildContext};
use crate::error::{ScmError, ScmResult};
use crate::revision::RevisionState;
use crate::source::{Change, ChildKey, EnvVars, PollingResult, ScmSource};

/// Shared, ordered record of calls made across several fakes.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// What [`ScriptedSource::build_environment`] does.
#[derive(Debug, Clone)]
pub enum EnvBehavior {
    Vars(EnvVars),
    /// `Ok(None)`.
    Nothing,
    /// `Err(ScmError::MissingContext)`.
    MissingContext,
    /// Any other failure.
    Fail,
}

/// Scripted [`ScmSource`] for tests.
#[derive(Debug)]
pub struct ScriptedSource {
    key: ChildKey,
    change: Change,
    remote: RevisionState,
    snapshot: Option<RevisionState>,
    changelog: Option<String>,
    checkout_revision: Option<RevisionState>,
    env: EnvBehavior,
    module_roots: Vec<PathBuf>,
    supports_polling: bool,
    requires_workspace: bool,
    composite: bool,
    fail_poll: bool,
    fail_checkout: bool,
    interrupt: Option<BuildContext>,
    journal: Journal,
    seen_baselines: Mutex<Vec<Option<RevisionState>>>,
}

impl ScriptedSource {
    pub fn new(key: impl Into<String>) -> Self {
        let key = ChildKey::new(key);
        Self {
            remote: RevisionState::opaque("scripted", serde_json::json!({ "key": key.as_str() })),
            key,
            change: Change::None,
            snapshot: None,
            changelog: None,
            checkout_revision: None,
            env: EnvBehavior::Nothing,
            module_roots: Vec::new(),
            supports_polling: true,
            requires_workspace: true,
            composite: false,
            fail_poll: false,
            fail_checkout: false,
            interrupt: None,
            journal: Journal::default(),
            seen_baselines: Mutex::new(Vec::new()),
        }
    }

    pub fn with_change(mut self, change: Change) -> Self {
        self.change = change;
        self
    }

    pub fn with_remote(mut self, remote: RevisionState) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_snapshot(mut self, snapshot: RevisionState) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Text written to the change-log location during checkout.
    pub fn with_changelog(mut self, text: impl Into<String>) -> Self {
        self.changelog = Some(text.into());
        self
    }

    /// Revision artifact attached to the build during checkout.
    pub fn with_checkout_revision(mut self, state: RevisionState) -> Self {
        self.checkout_revision = Some(state);
        self
    }

    pub fn with_env(mut self, vars: EnvVars) -> Self {
        self.env = EnvBehavior::Vars(vars);
        self
    }

    pub fn with_env_behavior(mut self, behavior: EnvBehavior) -> Self {
        self.env = behavior;
        self
    }

    /// Module roots, relative to the workspace.
    pub fn with_module_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.module_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_polling_support(mut self, supported: bool) -> Self {
        self.supports_polling = supported;
        self
    }

    pub fn with_workspace_requirement(mut self, required: bool) -> Self {
        self.requires_workspace = required;
        self
    }

    /// Claim to be a composite source.
    pub fn as_composite(mut self) -> Self {
        self.composite = true;
        self
    }

    pub fn failing_poll(mut self) -> Self {
        self.fail_poll = true;
        self
    }

    /// Fail the checkout after the change-log (if any) was written.
    pub fn failing_checkout(mut self) -> Self {
        self.fail_checkout = true;
        self
    }

    /// Interrupt `ctx` while checking out, as an operator abort would.
    pub fn interrupting(mut self, ctx: &BuildContext) -> Self {
        self.interrupt = Some(ctx.clone());
        self
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = journal.clone();
        self
    }

    /// Baselines handed to `poll` and `checkout`, in call order.
    pub fn seen_baselines(&self) -> Vec<Option<RevisionState>> {
        self.seen_baselines.lock().unwrap().clone()
    }

    fn scripted_failure(&self, operation: &str) -> ScmError {
        ScmError::from_source(&self.key, format!("scripted {operation} failure"))
    }
}

#[async_trait]
impl ScmSource for ScriptedSource {
    fn key(&self) -> ChildKey {
        self.key.clone()
    }

    async fn snapshot(
        &self,
        _ctx: &BuildContext,
        _workspace: Option<&Path>,
    ) -> ScmResult<Option<RevisionState>> {
        self.journal.record(format!("snapshot:{}", self.key));
        Ok(self.snapshot.clone())
    }

    async fn poll(
        &self,
        _ctx: &BuildContext,
        _workspace: Option<&Path>,
        baseline: &RevisionState,
    ) -> ScmResult<PollingResult> {
        self.journal.record(format!("poll:{}", self.key));
        self.seen_baselines
            .lock()
            .unwrap()
            .push(Some(baseline.clone()));
        if self.fail_poll {
            return Err(self.scripted_failure("poll"));
        }
        Ok(PollingResult::new(
            Some(baseline.clone()),
            self.remote.clone(),
            self.change,
        ))
    }

    async fn checkout(
        &self,
        ctx: &BuildContext,
        _workspace: &Path,
        changelog: Option<&Path>,
        baseline: Option<&RevisionState>,
    ) -> ScmResult<()> {
        self.journal.record(format!("checkout:{}", self.key));
        self.seen_baselines.lock().unwrap().push(baseline.cloned());
        if let Some(other) = &self.interrupt {
            other.interrupt();
        }
        if let (Some(path), Some(text)) = (changelog, &self.changelog) {
            tokio::fs::write(path, text).await?;
        }
        if self.fail_checkout {
            return Err(self.scripted_failure("checkout"));
        }
        if let Some(state) = &self.checkout_revision {
            ctx.record().attach(BuildArtifact::Revision {
                source: self.key.clone(),
                state: state.clone(),
            });
        }
        Ok(())
    }

    async fn build_environment(&self, _ctx: &BuildContext) -> ScmResult<Option<EnvVars>> {
        match &self.env {
            EnvBehavior::Vars(vars) => Ok(Some(vars.clone())),
            EnvBehavior::Nothing => Ok(None),
            EnvBehavior::MissingContext => Err(ScmError::MissingContext),
            EnvBehavior::Fail => Err(self.scripted_failure("environment")),
        }
    }

    fn module_roots(&self, workspace: &Path) -> Vec<PathBuf> {
        self.module_roots.iter().map(|r| workspace.join(r)).collect()
    }

    fn supports_polling(&self) -> bool {
        self.supports_polling
    }

    fn requires_workspace_for_polling(&self) -> bool {
        self.requires_workspace
    }

    fn is_composite(&self) -> bool {
        self.composite
    }
}
