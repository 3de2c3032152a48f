//! End-to-end policy decisions through the permission manager.
//!
//! None of these reach a human: every path either resolves from the agent's
//! rules or fails structurally before escalation.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use warden_approval::{AccessProof, CallContext, Resolution};
use warden_core::{AccessKind, AgentId, Decision, PermissionError};
use warden_policy::{
    AgentRuntimeSpec, DeclarationRegistry, ExecutablePermission, FilePermissionRule,
    FileSystemPermission, ToolPermissionSet, ToolPermissions,
};
use warden_test::{MockApprovalSink, StaticTool, TestHarness, scenario_spec, test_agent_id};

fn ctx() -> CallContext {
    CallContext::new(CancellationToken::new())
}

fn harness() -> TestHarness {
    TestHarness::new().with_spec(&test_agent_id(), scenario_spec())
}

fn denied_rule(err: PermissionError) -> Option<String> {
    match err {
        PermissionError::Denied { rule, .. } => rule,
        other => panic!("expected denial, got {other:?}"),
    }
}

#[tokio::test]
async fn test_write_scenario() {
    let h = harness();
    let sink = h.attach(MockApprovalSink::new());
    let agent = test_agent_id();

    let err = h
        .manager
        .check_file_access(&ctx(), &agent, AccessKind::Write, "src/secrets/key.go")
        .await
        .unwrap_err();
    assert_eq!(denied_rule(err).as_deref(), Some("src/secrets/**"));

    let proof = h
        .manager
        .check_file_access(&ctx(), &agent, AccessKind::Write, "src/app.go")
        .await
        .unwrap();
    assert_eq!(
        proof,
        AccessProof::Policy {
            pattern: Some("src/**".to_owned())
        }
    );

    let err = h
        .manager
        .check_file_access(&ctx(), &agent, AccessKind::Write, "docs/readme.md")
        .await
        .unwrap_err();
    assert_eq!(denied_rule(err).as_deref(), Some("files.write"));

    // Neither denial reached the approval surface.
    assert_eq!(sink.submit_count(), 0);
}

#[tokio::test]
async fn test_bash_scenario() {
    let h = harness();
    let sink = h.attach(MockApprovalSink::new().with_resolution(Resolution::approve()));
    let agent = test_agent_id();
    let env = HashMap::new();

    let err = h
        .manager
        .check_executable(&ctx(), &agent, "git", &["push", "origin", "main"], &env)
        .await
        .unwrap_err();
    assert_eq!(denied_rule(err).as_deref(), Some("git push*"));

    assert!(
        h.manager
            .check_executable(&ctx(), &agent, "git", &["status"], &env)
            .await
            .is_ok()
    );
    assert_eq!(sink.submit_count(), 0);

    // `rm -rf /` matches nothing and defaults to Ask.
    let proof = h
        .manager
        .check_executable(&ctx(), &agent, "rm", &["-rf", "/"], &env)
        .await
        .unwrap();
    assert!(matches!(proof, AccessProof::Approval { .. }));
    let submitted = sink.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].descriptor.action, "command.execute");
    assert_eq!(submitted[0].descriptor.resource, "rm -rf /");
}

#[tokio::test]
async fn test_documentation_only_rejects_allowed_code() {
    let mut spec = AgentRuntimeSpec::default();
    spec.files.write = FilePermissionRule::new(["**"], Vec::<String>::new(), Decision::Allow)
        .unwrap()
        .documentation_only();
    let agent = AgentId::from("scribe");
    let h = TestHarness::new().with_spec(&agent, spec);

    for ok in ["README.md", "docs/guide/intro.md", "NOTES.Md"] {
        assert!(
            h.manager
                .check_file_access(&ctx(), &agent, AccessKind::Write, ok)
                .await
                .is_ok(),
            "{ok}"
        );
    }
    for bad in ["src/main.rs", "README.md.bak", "docs/index.html"] {
        let err = h
            .manager
            .check_file_access(&ctx(), &agent, AccessKind::Write, bad)
            .await
            .unwrap_err();
        assert_eq!(denied_rule(err).as_deref(), Some("documentation_only"), "{bad}");
    }
}

#[tokio::test]
async fn test_require_approval_never_overrides_deny() {
    let mut spec = scenario_spec();
    spec.files.write = FilePermissionRule::new(["src/**"], ["src/secrets/**"], Decision::Deny)
        .unwrap()
        .require_approval();
    let h = TestHarness::new().with_spec(&test_agent_id(), spec);
    let sink = h.attach(MockApprovalSink::new().with_default_resolution(Resolution::approve()));

    assert!(
        h.manager
            .check_file_access(&ctx(), &test_agent_id(), AccessKind::Write, "src/secrets/a")
            .await
            .unwrap_err()
            .is_denied()
    );
    assert_eq!(sink.submit_count(), 0);

    let proof = h
        .manager
        .check_file_access(&ctx(), &test_agent_id(), AccessKind::Write, "src/a.rs")
        .await
        .unwrap();
    assert!(matches!(proof, AccessProof::Approval { .. }));
    assert_eq!(sink.submit_count(), 1);
}

#[tokio::test]
async fn test_tool_declarations_bound_every_call() {
    let h = harness()
        .with_tool(
            "editor",
            ToolPermissionSet::new().with_file(FileSystemPermission::new(
                "src",
                vec![AccessKind::Read, AccessKind::Write],
            )),
        )
        .with_tool(
            "vcs",
            ToolPermissionSet::new()
                .with_executable(ExecutablePermission::new("git").with_args(["status", "log"])),
        );
    let agent = test_agent_id();
    let cancel = CancellationToken::new();
    let editor = CallContext::for_tool("editor", cancel.clone());
    let vcs = CallContext::for_tool("vcs", cancel);

    assert!(
        h.manager
            .check_file_access(&editor, &agent, AccessKind::Write, "src/app.go")
            .await
            .is_ok()
    );
    // Inside the agent's rules, outside the tool's declaration.
    let err = h
        .manager
        .check_file_access(&editor, &agent, AccessKind::Read, "README.md")
        .await
        .unwrap_err();
    assert!(matches!(err, PermissionError::OutOfBounds { .. }));
    assert!(!err.is_denied());

    assert!(
        h.manager
            .check_executable(&vcs, &agent, "git", &["status"], &HashMap::new())
            .await
            .is_ok()
    );
    let err = h
        .manager
        .check_executable(&vcs, &agent, "git", &["push"], &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PermissionError::OutOfBounds { .. }));
}

#[test]
fn test_invalid_declarations_are_excluded() {
    let mut registry = DeclarationRegistry::new();
    let good = StaticTool::new(
        "reader",
        ToolPermissionSet::new().with_file(FileSystemPermission::new(".", vec![AccessKind::Read])),
    );
    let empty = StaticTool::new("nothing", ToolPermissionSet::new());
    let ambiguous = StaticTool::new(
        "writer",
        ToolPermissionSet::new().with_file(FileSystemPermission::new("", vec![AccessKind::Write])),
    );

    let tools: [&dyn ToolPermissions; 3] = [&good, &empty, &ambiguous];
    let excluded = registry.register_all(tools);
    let names: Vec<&str> = excluded.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["nothing", "writer"]);
    assert!(registry.contains("reader"));
    assert_eq!(registry.len(), 1);
}
