//! Environment-variable merging across children.
//!
//! Children are visited in registry order. A name first contributed by an
//! earlier child keeps its value; a later child's same-named variable is
//! stored as `<name>_<index>`, where `index` is that child's zero-based
//! position.

use crate::build::BuildContext;
use crate::error::{ScmError, ScmResult};
use crate::metrics::METRICS;
use crate::obs::emit_env_collision;
use crate::registry::ChildRegistry;
use crate::source::EnvVars;

/// Merge every child's contributions into `env`.
///
/// A child returning `Ok(None)` or [`ScmError::MissingContext`] contributes
/// nothing. Any other failure aborts the merge.
pub async fn merge_into(
    children: &ChildRegistry,
    ctx: &BuildContext,
    env: &mut EnvVars,
) -> ScmResult<()> {
    for (index, child) in children.iter().enumerate() {
        let key = child.key();
        let contributed = match child.build_environment(ctx).await {
            Ok(Some(vars)) => vars,
            Ok(None) | Err(ScmError::MissingContext) => {
                tracing::debug!(event = "env.no_contribution", key = %key, index = index);
                continue;
            }
            Err(e) => return Err(ScmError::child(&key, e)),
        };

        for (name, value) in contributed {
            if env.contains_key(&name) {
                let renamed = format!("{name}_{index}");
                emit_env_collision(&name, &renamed, index);
                METRICS.inc_env_collisions();
                env.insert(renamed, value);
            } else {
                env.insert(name, value);
            }
        }
    }
    Ok(())
}

/// Merge every child's contributions into a fresh set.
pub async fn merge(children: &ChildRegistry, ctx: &BuildContext) -> ScmResult<EnvVars> {
    let mut env = EnvVars::new();
    merge_into(children, ctx, &mut env).await?;
    Ok(env)
}
