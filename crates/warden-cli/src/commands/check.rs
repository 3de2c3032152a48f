//! `warden check-file` and `warden check-exec`: run one permission check
//! against the configured agents, prompting on the terminal when asked.

use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use warden_approval::{AccessProof, CallContext, PermissionManager};
use warden_config::LoadedConfig;
use warden_core::{AccessKind, AgentId, GrantScope, PermissionError, PermissionResult};

use crate::approval_handler::TerminalSink;
use crate::config_bridge;
use crate::theme::Theme;

/// Exit code for a denial.
const EXIT_DENIED: u8 = 1;
/// Exit code for every other failure.
const EXIT_FAILED: u8 = 2;

/// Options shared by both checks.
pub(crate) struct CheckOptions {
    pub(crate) agent: String,
    pub(crate) tool: Option<String>,
    pub(crate) reason: Option<String>,
    pub(crate) scope: Option<GrantScope>,
    pub(crate) timeout: Option<Duration>,
    /// Attach the terminal prompt. Without it, `Ask` fails with no surface.
    pub(crate) interactive: bool,
}

impl CheckOptions {
    fn context(&self) -> CallContext {
        let cancel = CancellationToken::new();
        let mut ctx = match &self.tool {
            Some(tool) => CallContext::for_tool(tool, cancel),
            None => CallContext::new(cancel),
        };
        ctx.reason.clone_from(&self.reason);
        ctx.scope = self.scope;
        ctx.timeout = self.timeout;
        ctx
    }
}

/// Check a file access.
pub(crate) async fn check_file(
    loaded: &LoadedConfig,
    workspace_root: &Path,
    opts: &CheckOptions,
    kind: AccessKind,
    path: &str,
) -> Result<ExitCode> {
    let manager = build_manager(loaded, workspace_root, opts)?;
    let result = manager
        .check_file_access(&opts.context(), &AgentId::from(opts.agent.as_str()), kind, path)
        .await;
    Ok(report(&format!("{kind} {path}"), result))
}

/// Check a command execution. `env` holds `NAME` or `NAME=VALUE` entries.
pub(crate) async fn check_exec(
    loaded: &LoadedConfig,
    workspace_root: &Path,
    opts: &CheckOptions,
    command: &[String],
    env: &[String],
) -> Result<ExitCode> {
    let manager = build_manager(loaded, workspace_root, opts)?;
    let (program, args) = match command.split_first() {
        Some((program, args)) => (program.as_str(), args),
        None => ("", &[][..]),
    };
    let result = manager
        .check_executable(
            &opts.context(),
            &AgentId::from(opts.agent.as_str()),
            program,
            args,
            &parse_env(env),
        )
        .await;
    Ok(report(&command.join(" "), result))
}

fn build_manager(
    loaded: &LoadedConfig,
    workspace_root: &Path,
    opts: &CheckOptions,
) -> Result<PermissionManager> {
    let (manager, excluded) = config_bridge::to_manager(loaded, workspace_root)?;
    for (name, err) in &excluded {
        eprintln!("{}", Theme::warning(&format!("tool {name} excluded: {err}")));
    }
    if opts.interactive {
        TerminalSink::install(manager.broker());
    }
    Ok(manager)
}

fn parse_env(entries: &[String]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) => (name.to_owned(), value.to_owned()),
            None => (entry.clone(), String::new()),
        })
        .collect()
}

fn report(subject: &str, result: PermissionResult<AccessProof>) -> ExitCode {
    match result {
        Ok(proof) => {
            println!("{}", Theme::success(&format!("allowed: {subject}")));
            println!("  {}", Theme::dimmed(&describe(&proof)));
            ExitCode::SUCCESS
        },
        Err(e) if e.is_denied() => {
            println!("{}", Theme::error(&format!("denied: {subject}")));
            if let PermissionError::Denied { rule, reason, .. } = &e {
                println!("  {}", Theme::kv("reason", reason));
                if let Some(rule) = rule {
                    println!("  {}", Theme::kv("rule", rule));
                }
            }
            ExitCode::from(EXIT_DENIED)
        },
        Err(e) => {
            eprintln!("{}", Theme::error(&e.to_string()));
            if e.is_retryable() {
                eprintln!("  {}", Theme::info("the same check may succeed if retried"));
            }
            ExitCode::from(EXIT_FAILED)
        },
    }
}

fn describe(proof: &AccessProof) -> String {
    match proof {
        AccessProof::Policy {
            pattern: Some(pattern),
        } => format!("matched allow pattern {pattern}"),
        AccessProof::Policy { pattern: None } => "allowed by the rule's default".to_owned(),
        AccessProof::Grant { grant_id, scope } => format!("covered by {scope} grant {grant_id}"),
        AccessProof::Approval { approval_id, scope } => {
            format!("approved by a human ({scope}), {approval_id}")
        },
    }
}

#[cfg(test)]
mod tests {
    use warden_core::GrantId;

    use super::*;

    #[test]
    fn parse_env_keeps_names_with_or_without_values() {
        let env = parse_env(&["HOME=/root".to_owned(), "TOKEN".to_owned()]);
        assert_eq!(env["HOME"], "/root");
        assert_eq!(env["TOKEN"], "");
    }

    #[test]
    fn context_carries_options() {
        let opts = CheckOptions {
            agent: "coder".to_owned(),
            tool: Some("editor".to_owned()),
            reason: Some("fix typo".to_owned()),
            scope: Some(GrantScope::Session),
            timeout: Some(Duration::from_secs(5)),
            interactive: false,
        };
        let ctx = opts.context();
        assert_eq!(ctx.tool.as_deref(), Some("editor"));
        assert_eq!(ctx.reason.as_deref(), Some("fix typo"));
        assert_eq!(ctx.scope, Some(GrantScope::Session));
        assert_eq!(ctx.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn report_maps_outcomes_to_exit_codes() {
        let allowed = report("read a", Ok(AccessProof::Policy { pattern: None }));
        assert_eq!(allowed, ExitCode::SUCCESS);

        let denied = report(
            "write b",
            Err(PermissionError::Denied {
                action: "file.write".to_owned(),
                resource: "b".to_owned(),
                rule: Some("files.write".to_owned()),
                reason: "no match".to_owned(),
            }),
        );
        assert_eq!(denied, ExitCode::from(EXIT_DENIED));

        let failed = report(
            "read c",
            Err(PermissionError::UnknownAgent {
                agent: "ghost".to_owned(),
            }),
        );
        assert_eq!(failed, ExitCode::from(EXIT_FAILED));
    }

    #[test]
    fn describe_names_grant() {
        let id = GrantId::new();
        let text = describe(&AccessProof::Grant {
            grant_id: id,
            scope: GrantScope::Persistent,
        });
        assert!(text.contains(&id.to_string()));
    }
}
