//! Terminal approval surface.
//!
//! [`TerminalSink`] implements [`ApprovalSink`] by forwarding each request
//! over a channel to a single prompt task. The task shows one request at a
//! time with `dialoguer` and resolves it through the broker.

use std::sync::Arc;

use async_trait::async_trait;
use dialoguer::{Select, theme::ColorfulTheme};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use warden_approval::{ApprovalBroker, ApprovalSink, PendingApproval, Resolution};
use warden_core::{ApprovalId, GrantScope, PermissionError, PermissionResult};

use crate::theme::Theme;

const OPTIONS: [&str; 4] = [
    "Approve (once)",
    "Approve (session)",
    "Approve (always)",
    "Deny",
];

/// Sink that hands requests to the prompt task.
pub struct TerminalSink {
    tx: mpsc::UnboundedSender<PendingApproval>,
}

impl TerminalSink {
    /// Register a terminal sink with `broker` and start its prompt task.
    ///
    /// The task ends when the sink is cleared from the broker and dropped.
    pub fn install(broker: &Arc<ApprovalBroker>) -> JoinHandle<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        broker.set_sink(Arc::new(Self { tx }));
        tokio::spawn(prompt_loop(Arc::clone(broker), rx))
    }
}

#[async_trait]
impl ApprovalSink for TerminalSink {
    async fn submit(&self, request: PendingApproval) -> PermissionResult<()> {
        self.tx
            .send(request)
            .map_err(|_| PermissionError::Sink("terminal prompt is not running".to_owned()))
    }

    fn withdraw(&self, id: ApprovalId) {
        eprintln!(
            "{}",
            Theme::warning(&format!("{id} expired or was cancelled"))
        );
    }
}

async fn prompt_loop(
    broker: Arc<ApprovalBroker>,
    mut rx: mpsc::UnboundedReceiver<PendingApproval>,
) {
    while let Some(request) = rx.recv().await {
        let id = request.id;
        let resolution = match tokio::task::spawn_blocking(move || ask(&request)).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(approval = %id, error = %e, "approval prompt task failed");
                Resolution::deny("approval prompt failed")
            },
        };
        resolve_answer(Arc::clone(&broker), id, resolution).await;
    }
}

/// Hand an answer to the broker off the async workers; a persistent
/// approval writes the grant file.
async fn resolve_answer(broker: Arc<ApprovalBroker>, id: ApprovalId, resolution: Resolution) {
    match tokio::task::spawn_blocking(move || broker.resolve(id, resolution)).await {
        Ok(Ok(())) => {},
        // The request timed out or was cancelled while the prompt was open.
        Ok(Err(PermissionError::UnknownApproval { .. })) => {
            tracing::debug!(approval = %id, "prompt answer discarded");
        },
        Ok(Err(e)) => {
            eprintln!("{}", Theme::warning(&format!("approval recorded but not saved: {e}")));
        },
        Err(e) => tracing::warn!(approval = %id, error = %e, "resolve task failed"),
    }
}

/// Show one request and read the decision. Any terminal error denies.
fn ask(request: &PendingApproval) -> Resolution {
    let expires = request
        .expires_at
        .map_or_else(|| "never".to_owned(), |t| t.to_string());
    let rows = [
        ("Agent", request.agent_id.as_str()),
        ("Action", request.descriptor.action.as_str()),
        ("Resource", request.descriptor.resource.as_str()),
        ("Reason", request.reason.as_str()),
        ("Expires", expires.as_str()),
    ];

    eprintln!();
    eprintln!(
        "{}",
        Theme::approval_box("Approval required", &rows, request.risk)
    );

    let selection = Select::with_theme(&ColorfulTheme::default())
        .items(&OPTIONS)
        .default(default_index(request.scope))
        .interact();

    match selection {
        Ok(0) => Resolution::approve_with(GrantScope::OneTime),
        Ok(1) => Resolution::approve_with(GrantScope::Session),
        Ok(2) => Resolution::approve_with(GrantScope::Persistent),
        Ok(_) => Resolution::deny("denied by user"),
        Err(e) => {
            tracing::warn!(approval = %request.id, error = %e, "could not read approval answer");
            Resolution::deny("no answer from terminal")
        },
    }
}

/// Preselect the scope the caller asked for.
fn default_index(scope: GrantScope) -> usize {
    match scope {
        GrantScope::OneTime => 0,
        GrantScope::Session => 1,
        GrantScope::Persistent => 2,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;
    use warden_approval::{GrantStore, JsonGrantFile, PermissionDescriptor};
    use warden_core::RiskLevel;

    use super::*;

    #[test]
    fn default_index_matches_options() {
        assert_eq!(OPTIONS[default_index(GrantScope::OneTime)], "Approve (once)");
        assert_eq!(OPTIONS[default_index(GrantScope::Session)], "Approve (session)");
        assert_eq!(OPTIONS[default_index(GrantScope::Persistent)], "Approve (always)");
    }

    #[tokio::test]
    async fn persistent_answer_is_saved_to_grant_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("grants.json");
        let grants = GrantStore::with_persistence(Arc::new(JsonGrantFile::new(&file))).unwrap();
        let broker = Arc::new(ApprovalBroker::new(Arc::new(grants)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        broker.set_sink(Arc::new(TerminalSink { tx }));

        let waiting = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .require_approval(
                        &CancellationToken::new(),
                        &"coder".into(),
                        &PermissionDescriptor::command("make release"),
                        "release",
                        GrantScope::OneTime,
                        RiskLevel::High,
                        Duration::ZERO,
                    )
                    .await
            })
        };
        let request = rx.recv().await.unwrap();
        resolve_answer(
            Arc::clone(&broker),
            request.id,
            Resolution::approve_with(GrantScope::Persistent),
        )
        .await;

        assert!(waiting.await.unwrap().is_ok());
        assert!(file.exists());
        assert_eq!(broker.grants().persistent_grants().len(), 1);

        // A second answer for the same request is dropped quietly.
        resolve_answer(broker, request.id, Resolution::deny("late")).await;
    }

    #[tokio::test]
    async fn submit_fails_once_prompt_task_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = TerminalSink { tx };

        let request = PendingApproval {
            id: ApprovalId::new(),
            agent_id: "coder".into(),
            descriptor: warden_approval::PermissionDescriptor::command("rm -rf /tmp/x"),
            reason: "cleanup".to_owned(),
            scope: GrantScope::OneTime,
            risk: warden_core::RiskLevel::Medium,
            created_at: warden_core::Timestamp::now(),
            expires_at: None,
        };
        assert!(matches!(
            sink.submit(request).await,
            Err(PermissionError::Sink(_))
        ));
    }
}
