//! The composite source: several children behind one source interface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::build::BuildContext;
use crate::capability;
use crate::changelog::{self, ChangelogSection};
use crate::checkout;
use crate::config::{CompositeConfig, SourceFactory};
use crate::env;
use crate::error::{ConfigError, ScmError, ScmResult};
use crate::polling::{self, CompositePollingResult};
use crate::registry::{ChildRegistry, ChildRegistryBuilder};
use crate::revision::{CompositeRevisionState, RevisionState};
use crate::source::{ChildKey, EnvVars, PollingResult, ScmSource};

/// Several independent sources treated as one logical checkout.
#[derive(Debug, Clone)]
pub struct CompositeScm {
    key: ChildKey,
    children: ChildRegistry,
}

impl CompositeScm {
    pub fn builder() -> CompositeScmBuilder {
        CompositeScmBuilder::default()
    }

    /// Resolve every configured child through `factory`.
    ///
    /// The whole configuration is validated before any source is constructed.
    pub fn from_config(
        config: &CompositeConfig,
        factory: &SourceFactory,
    ) -> Result<Self, ConfigError> {
        factory.validate(config)?;
        let mut builder = Self::builder();
        for child in &config.children {
            builder = builder.child(factory.create(child)?);
        }
        if let Some(key) = &config.key {
            builder = builder.key(key.as_str());
        }
        Ok(builder.build())
    }

    pub fn children(&self) -> &ChildRegistry {
        &self.children
    }

    /// Snapshot every child as `ctx` left it.
    pub async fn calc_revisions(
        &self,
        ctx: &BuildContext,
        workspace: Option<&Path>,
    ) -> ScmResult<CompositeRevisionState> {
        let mut state = CompositeRevisionState::new();
        for child in &self.children {
            ctx.check_interrupted()?;
            let key = child.key();
            let snapshot = child
                .snapshot(ctx, workspace)
                .await
                .map_err(|e| ScmError::child(&key, e))?;
            state.add(&key, workspace, snapshot);
        }
        Ok(state)
    }

    /// Compare `baseline` against every child's live state.
    pub async fn compare_remote(
        &self,
        project: &str,
        ctx: &BuildContext,
        workspace: Option<&Path>,
        baseline: Option<&RevisionState>,
    ) -> ScmResult<CompositePollingResult> {
        polling::poll(&self.children, project, ctx, workspace, baseline).await
    }

    /// Check out every child and write the merged change-log to `changelog`.
    pub async fn checkout_all(
        &self,
        ctx: &BuildContext,
        workspace: &Path,
        changelog: Option<&Path>,
        baseline: Option<&RevisionState>,
    ) -> ScmResult<CompositeRevisionState> {
        checkout::checkout(&self.children, ctx, workspace, changelog, baseline).await
    }

    /// Merge every child's environment into `env`.
    pub async fn build_env_vars(&self, ctx: &BuildContext, env: &mut EnvVars) -> ScmResult<()> {
        env::merge_into(&self.children, ctx, env).await
    }

    pub fn module_roots(&self, workspace: &Path) -> Vec<PathBuf> {
        capability::module_roots(&self.children, workspace)
    }

    pub fn supports_polling(&self) -> bool {
        capability::supports_polling(&self.children)
    }

    pub fn requires_workspace_for_polling(&self) -> bool {
        capability::requires_workspace_for_polling(&self.children)
    }

    /// Split a merged change-log and pair each section with its owning child.
    ///
    /// Sections whose key no longer matches a configured child are skipped.
    pub fn changelog_sections(&self, document: &str) -> Vec<(Arc<dyn ScmSource>, ChangelogSection)> {
        let parsed = changelog::parse(document);
        if !parsed.complete {
            tracing::warn!(
                event = "changelog.incomplete",
                sections = parsed.sections.len(),
                "change-log is missing its closing tag"
            );
        }
        parsed
            .sections
            .into_iter()
            .filter_map(|section| {
                let child = self
                    .children
                    .position(&section.key)
                    .and_then(|i| self.children.get(i))
                    .cloned();
                if child.is_none() {
                    tracing::debug!(event = "changelog.unknown_source", key = %section.key);
                }
                child.map(|c| (c, section))
            })
            .collect()
    }
}

#[async_trait]
impl ScmSource for CompositeScm {
    fn key(&self) -> ChildKey {
        self.key.clone()
    }

    async fn snapshot(
        &self,
        ctx: &BuildContext,
        workspace: Option<&Path>,
    ) -> ScmResult<Option<RevisionState>> {
        let state = self.calc_revisions(ctx, workspace).await?;
        Ok(Some(RevisionState::Composite(state)))
    }

    async fn poll(
        &self,
        ctx: &BuildContext,
        workspace: Option<&Path>,
        baseline: &RevisionState,
    ) -> ScmResult<PollingResult> {
        let project = self.key.to_string();
        let result = self.compare_remote(&project, ctx, workspace, Some(baseline)).await?;
        Ok(result.into())
    }

    async fn checkout(
        &self,
        ctx: &BuildContext,
        workspace: &Path,
        changelog: Option<&Path>,
        baseline: Option<&RevisionState>,
    ) -> ScmResult<()> {
        self.checkout_all(ctx, workspace, changelog, baseline).await?;
        Ok(())
    }

    async fn build_environment(&self, ctx: &BuildContext) -> ScmResult<Option<EnvVars>> {
        let mut vars = EnvVars::new();
        self.build_env_vars(ctx, &mut vars).await?;
        Ok((!vars.is_empty()).then_some(vars))
    }

    fn module_roots(&self, workspace: &Path) -> Vec<PathBuf> {
        CompositeScm::module_roots(self, workspace)
    }

    fn supports_polling(&self) -> bool {
        CompositeScm::supports_polling(self)
    }

    fn requires_workspace_for_polling(&self) -> bool {
        CompositeScm::requires_workspace_for_polling(self)
    }

    fn is_composite(&self) -> bool {
        true
    }
}

/// Builder for [`CompositeScm`].
#[derive(Default)]
pub struct CompositeScmBuilder {
    key: Option<ChildKey>,
    children: ChildRegistryBuilder,
}

impl CompositeScmBuilder {
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(ChildKey::new(key));
        self
    }

    pub fn child(mut self, source: Arc<dyn ScmSource>) -> Self {
        self.children.push(source);
        self
    }

    pub fn build(self) -> CompositeScm {
        let children = self.children.build();
        let key = self.key.unwrap_or_else(|| derived_key(&children));
        CompositeScm { key, children }
    }
}

/// `multiscm(<child>|<child>|...)`, stable as long as the children are.
fn derived_key(children: &ChildRegistry) -> ChildKey {
    let keys: Vec<String> = children.keys().iter().map(ToString::to_string).collect();
    ChildKey::new(format!("{}({})", crate::config::COMPOSITE_KIND, keys.join("|")))
}
