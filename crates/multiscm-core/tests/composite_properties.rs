//! Integration tests for the composite source contract.
//!
//! Covered:
//! - Capability flags combine with AND / OR across any child ordering
//! - Overall polling verdict is the maximum child verdict
//! - Revision state round-trips through add/get and build persistence,
//!   including the state of a nested composite
//! - Environment collisions are renamed with the child's index
//! - Merged change-logs are well-formed and escape child text
//! - Module roots are stable across calls
//! - A failing checkout stops the sequence and keeps earlier output

use std::path::Path;
use std::sync::Arc;

use multiscm_core::changelog;
use multiscm_core::fakes::{EnvBehavior, Journal, ScriptedSource};
use multiscm_core::{
    BuildContext, Change, ChildKey, CompositeRevisionState, CompositeScm, EnvVars, RevisionState,
    ScmError, ScmSource,
};
use serde_json::json;

fn composite(children: Vec<ScriptedSource>) -> CompositeScm {
    children
        .into_iter()
        .fold(CompositeScm::builder(), |b, c| b.child(Arc::new(c)))
        .build()
}

fn permutations(n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return vec![vec![]];
    }
    let mut out = Vec::new();
    for rest in permutations(n - 1) {
        for pos in 0..=rest.len() {
            let mut p = rest.clone();
            p.insert(pos, n - 1);
            out.push(p);
        }
    }
    out
}

// ---- Capability flags ----

#[test]
fn supports_polling_is_and_over_every_ordering() {
    let flags = [true, false, true];
    for order in permutations(flags.len()) {
        let scm = composite(
            order
                .iter()
                .map(|&i| ScriptedSource::new(format!("c{i}")).with_polling_support(flags[i]))
                .collect(),
        );
        assert!(!scm.supports_polling(), "order {order:?}");
    }

    let all = composite(vec![ScriptedSource::new("a"), ScriptedSource::new("b")]);
    assert!(all.supports_polling());
}

#[test]
fn requires_workspace_is_or_over_every_ordering() {
    let flags = [false, true, false];
    for order in permutations(flags.len()) {
        let scm = composite(
            order
                .iter()
                .map(|&i| {
                    ScriptedSource::new(format!("c{i}")).with_workspace_requirement(flags[i])
                })
                .collect(),
        );
        assert!(scm.requires_workspace_for_polling(), "order {order:?}");
    }

    let none = composite(vec![
        ScriptedSource::new("a").with_workspace_requirement(false),
        ScriptedSource::new("b").with_workspace_requirement(false),
    ]);
    assert!(!none.requires_workspace_for_polling());
}

// ---- Polling verdict ----

#[tokio::test]
async fn significant_child_dominates_regardless_of_position() {
    for position in 0..3 {
        let scm = composite(
            (0..3)
                .map(|i| {
                    let change = if i == position {
                        Change::Significant
                    } else {
                        Change::None
                    };
                    ScriptedSource::new(format!("c{i}")).with_change(change)
                })
                .collect(),
        );
        let ctx = BuildContext::for_build(1);
        let result = scm.compare_remote("proj", &ctx, None, None).await.unwrap();
        assert_eq!(result.change, Change::Significant, "position {position}");
    }
}

#[tokio::test]
async fn insignificant_beats_none() {
    let scm = composite(vec![
        ScriptedSource::new("a").with_change(Change::Insignificant),
        ScriptedSource::new("b"),
    ]);
    let ctx = BuildContext::for_build(1);
    let result = scm.compare_remote("proj", &ctx, None, None).await.unwrap();
    assert_eq!(result.change, Change::Insignificant);
}

#[tokio::test]
async fn checkout_state_becomes_next_poll_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let ws = dir.path();
    let a = Arc::new(
        ScriptedSource::new("git:a")
            .with_checkout_revision(RevisionState::opaque("git", json!({ "sha": "111" }))),
    );
    let b = Arc::new(ScriptedSource::new("hg:b"));
    let scm = CompositeScm::builder()
        .child(a.clone())
        .child(b.clone())
        .build();

    let build1 = BuildContext::for_build(1);
    let recorded = scm.checkout_all(&build1, ws, None, None).await.unwrap();

    // Persist with the build, reload for polling.
    let persisted = serde_json::to_string(&recorded).unwrap();
    let reloaded: CompositeRevisionState = serde_json::from_str(&persisted).unwrap();

    let poll_ctx = BuildContext::for_build(2);
    scm.compare_remote("proj", &poll_ctx, Some(ws), Some(&RevisionState::Composite(reloaded)))
        .await
        .unwrap();

    let seen_by_a = a.seen_baselines();
    assert_eq!(
        seen_by_a.last(),
        Some(&Some(RevisionState::opaque("git", json!({ "sha": "111" }))))
    );
    // b never contributed a revision, so it polls from the neutral sentinel.
    assert_eq!(b.seen_baselines().last(), Some(&Some(RevisionState::None)));
}

#[tokio::test]
async fn nested_composite_state_survives_checkout_then_poll() {
    let dir = tempfile::tempdir().unwrap();
    let ws = dir.path();
    let x = Arc::new(
        ScriptedSource::new("git:x")
            .with_checkout_revision(RevisionState::opaque("git", json!({ "sha": "111" }))),
    );
    let inner = Arc::new(CompositeScm::builder().key("inner").child(x.clone()).build());
    let outer = CompositeScm::builder()
        .child(Arc::new(ScriptedSource::new("hg:leaf")))
        .child(inner)
        .build();

    let build1 = BuildContext::for_build(1);
    let recorded = outer.checkout_all(&build1, ws, None, None).await.unwrap();
    assert_eq!(build1.record().composite_revision(), Some(recorded.clone()));

    let persisted = serde_json::to_string(&recorded).unwrap();
    let reloaded: CompositeRevisionState = serde_json::from_str(&persisted).unwrap();
    outer
        .compare_remote(
            "proj",
            &BuildContext::for_build(2),
            Some(ws),
            Some(&RevisionState::Composite(reloaded)),
        )
        .await
        .unwrap();

    assert_eq!(
        x.seen_baselines().last(),
        Some(&Some(RevisionState::opaque("git", json!({ "sha": "111" }))))
    );
}

// ---- Revision state ----

#[test]
fn add_then_get_round_trips() {
    let mut state = CompositeRevisionState::new();
    let key = ChildKey::new("svn:trunk");
    let snapshot = RevisionState::opaque("svn", json!({ "revision": 4021 }));
    state.add(&key, Some(Path::new("/ws")), Some(snapshot.clone()));
    assert_eq!(state.get(&key, Some(Path::new("/ws"))), Some(&snapshot));
}

// ---- Environment ----

#[tokio::test]
async fn env_collision_uses_child_index_suffix() {
    let foo = |v: &str| EnvVars::from([("FOO".to_string(), v.to_string())]);
    let scm = composite(vec![
        ScriptedSource::new("a").with_env(foo("a")),
        ScriptedSource::new("b").with_env(foo("b")),
        ScriptedSource::new("c").with_env_behavior(EnvBehavior::MissingContext),
    ]);
    let ctx = BuildContext::for_build(1);
    let mut env = EnvVars::new();
    scm.build_env_vars(&ctx, &mut env).await.unwrap();
    assert_eq!(
        env,
        EnvVars::from([
            ("FOO".to_string(), "a".to_string()),
            ("FOO_1".to_string(), "b".to_string()),
        ])
    );
}

// ---- Change-log ----

#[tokio::test]
async fn changelog_with_one_silent_child_is_well_formed() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("changelog.xml");
    let scm = composite(vec![
        ScriptedSource::new("A").with_changelog("line&1"),
        ScriptedSource::new("B"),
    ]);
    let ctx = BuildContext::for_build(1);
    scm.checkout_all(&ctx, dir.path(), Some(&target), None)
        .await
        .unwrap();

    let doc = std::fs::read_to_string(&target).unwrap();
    assert_eq!(doc.matches("<sub-log ").count(), 1);
    assert!(doc.contains("line&amp;1"));
    assert!(!doc.contains("line&1"));

    let parsed = changelog::parse(&doc);
    assert!(parsed.complete);
    assert_eq!(parsed.sections.len(), 1);
    assert_eq!(parsed.sections[0].key, ChildKey::new("A"));
    assert_eq!(parsed.sections[0].text, "line&1");
}

// ---- Module roots ----

#[test]
fn module_roots_are_idempotent() {
    let scm = composite(vec![
        ScriptedSource::new("a").with_module_roots(["app"]),
        ScriptedSource::new("b").with_module_roots(["lib", "app"]),
    ]);
    let ws = Path::new("/ws");
    let first = scm.module_roots(ws);
    let second = scm.module_roots(ws);
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

// ---- Failure propagation ----

#[tokio::test]
async fn second_child_failure_skips_third_and_keeps_first_section() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("changelog.xml");
    let journal = Journal::default();
    let scm = composite(vec![
        ScriptedSource::new("one")
            .with_journal(&journal)
            .with_changelog("first change"),
        ScriptedSource::new("two")
            .with_journal(&journal)
            .failing_checkout(),
        ScriptedSource::new("three")
            .with_journal(&journal)
            .with_changelog("third change"),
    ]);
    let ctx = BuildContext::for_build(5);

    let err = ScmSource::checkout(&scm, &ctx, dir.path(), Some(&target), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ScmError::ChildOperation { .. }));
    assert_eq!(journal.entries(), vec!["checkout:one", "checkout:two"]);

    let doc = std::fs::read_to_string(&target).unwrap();
    assert!(doc.contains("first change"));
    assert!(!doc.contains("third change"));
    assert!(!changelog::parse(&doc).complete);
}
