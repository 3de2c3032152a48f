use super::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sink that forwards submissions over a channel and records withdrawals.
struct ChannelSink {
    tx: mpsc::UnboundedSender<PendingApproval>,
    withdrawn: Mutex<Vec<ApprovalId>>,
}

impl ChannelSink {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PendingApproval>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                withdrawn: Mutex::new(Vec::new()),
            }),
            rx,
        )
    }

    fn withdrawn(&self) -> Vec<ApprovalId> {
        self.withdrawn.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalSink for ChannelSink {
    async fn submit(&self, request: PendingApproval) -> PermissionResult<()> {
        self.tx
            .send(request)
            .map_err(|e| PermissionError::Sink(e.to_string()))
    }

    fn withdraw(&self, id: ApprovalId) {
        self.withdrawn.lock().unwrap().push(id);
    }
}

struct FailingSink;

#[async_trait]
impl ApprovalSink for FailingSink {
    async fn submit(&self, _request: PendingApproval) -> PermissionResult<()> {
        Err(PermissionError::Sink("surface offline".into()))
    }
}

fn agent() -> AgentId {
    AgentId::from("coder")
}

fn setup() -> (
    Arc<ApprovalBroker>,
    Arc<ChannelSink>,
    mpsc::UnboundedReceiver<PendingApproval>,
) {
    let broker = Arc::new(ApprovalBroker::new(Arc::new(GrantStore::new())));
    let (sink, rx) = ChannelSink::new();
    broker.set_sink(sink.clone());
    (broker, sink, rx)
}

fn spawn_require(
    broker: &Arc<ApprovalBroker>,
    cancel: CancellationToken,
    command: &str,
    scope: GrantScope,
    timeout: Duration,
) -> JoinHandle<PermissionResult<ApprovalOutcome>> {
    let broker = Arc::clone(broker);
    let descriptor = PermissionDescriptor::command(command);
    tokio::spawn(async move {
        broker
            .require_approval(
                &cancel,
                &agent(),
                &descriptor,
                "needs to run a command",
                scope,
                RiskLevel::Medium,
                timeout,
            )
            .await
    })
}

async fn wait_for_waiters(broker: &ApprovalBroker, id: ApprovalId, waiters: usize) {
    loop {
        let current = broker.table().by_id.get(&id).map(|e| e.waiters);
        if current == Some(waiters) {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_no_sink_is_structural() {
    let broker = ApprovalBroker::new(Arc::new(GrantStore::new()));
    let err = broker
        .require_approval(
            &CancellationToken::new(),
            &agent(),
            &PermissionDescriptor::command("ls"),
            "list",
            GrantScope::OneTime,
            RiskLevel::Low,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PermissionError::NoApprovalSurface { .. }));
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn test_one_time_approval_stores_no_grant() {
    let (broker, _sink, mut rx) = setup();
    let handle = spawn_require(
        &broker,
        CancellationToken::new(),
        "rm -rf /tmp/x",
        GrantScope::OneTime,
        Duration::from_secs(60),
    );

    let request = rx.recv().await.unwrap();
    assert_eq!(request.descriptor.resource, "rm -rf /tmp/x");
    assert_eq!(request.reason, "needs to run a command");
    assert!(request.expires_at.is_some());
    assert_eq!(broker.pending(), vec![request.clone()]);

    broker.resolve(request.id, Resolution::approve()).unwrap();
    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        ApprovalOutcome::Approved {
            approval_id: request.id,
            scope: GrantScope::OneTime
        }
    );
    assert!(broker.grants().is_empty());
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn test_denial_carries_reason() {
    let (broker, _sink, mut rx) = setup();
    let handle = spawn_require(
        &broker,
        CancellationToken::new(),
        "git push --force",
        GrantScope::OneTime,
        Duration::from_secs(60),
    );
    let request = rx.recv().await.unwrap();
    broker
        .resolve(request.id, Resolution::deny("not on main"))
        .unwrap();

    let err = handle.await.unwrap().unwrap_err();
    match err {
        PermissionError::Denied {
            action,
            resource,
            reason,
            ..
        } => {
            assert_eq!(action, "command.execute");
            assert_eq!(resource, "git push --force");
            assert_eq!(reason, "not on main");
        },
        other => panic!("expected denial, got {other:?}"),
    }
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_expires_and_withdraws() {
    let (broker, sink, mut rx) = setup();
    let handle = spawn_require(
        &broker,
        CancellationToken::new(),
        "make deploy",
        GrantScope::OneTime,
        Duration::from_millis(50),
    );
    let request = rx.recv().await.unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        PermissionError::ApprovalTimeout { timeout_ms: 50, .. }
    ));
    assert_eq!(broker.pending_count(), 0);
    assert_eq!(sink.withdrawn(), vec![request.id]);
    assert!(matches!(
        broker.resolve(request.id, Resolution::approve()),
        Err(PermissionError::UnknownApproval { .. })
    ));
}

#[tokio::test]
async fn test_cancellation_releases_pending() {
    let (broker, sink, mut rx) = setup();
    let cancel = CancellationToken::new();
    let handle = spawn_require(
        &broker,
        cancel.clone(),
        "cargo publish",
        GrantScope::OneTime,
        Duration::ZERO,
    );
    let request = rx.recv().await.unwrap();
    cancel.cancel();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, PermissionError::ApprovalCancelled { .. }));
    assert_eq!(broker.pending_count(), 0);
    assert_eq!(sink.withdrawn(), vec![request.id]);
}

#[tokio::test]
async fn test_already_cancelled_token_never_creates_request() {
    let (broker, _sink, mut rx) = setup();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = spawn_require(&broker, cancel, "ls", GrantScope::OneTime, Duration::ZERO)
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, PermissionError::ApprovalCancelled { .. }));
    assert_eq!(broker.pending_count(), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_concurrent_requests_coalesce() {
    let (broker, _sink, mut rx) = setup();
    let first = spawn_require(
        &broker,
        CancellationToken::new(),
        "npm install",
        GrantScope::OneTime,
        Duration::from_secs(60),
    );
    let request = rx.recv().await.unwrap();
    let second = spawn_require(
        &broker,
        CancellationToken::new(),
        "npm install",
        GrantScope::OneTime,
        Duration::from_secs(60),
    );
    wait_for_waiters(&broker, request.id, 2).await;
    assert_eq!(broker.pending_count(), 1);

    broker.resolve(request.id, Resolution::approve()).unwrap();
    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert!(rx.try_recv().is_err(), "only one prompt expected");
}

#[tokio::test]
async fn test_one_waiter_cancelling_keeps_request_alive() {
    let (broker, sink, mut rx) = setup();
    let stays = spawn_require(
        &broker,
        CancellationToken::new(),
        "docker build .",
        GrantScope::OneTime,
        Duration::ZERO,
    );
    let request = rx.recv().await.unwrap();

    let leaving_token = CancellationToken::new();
    let leaves = spawn_require(
        &broker,
        leaving_token.clone(),
        "docker build .",
        GrantScope::OneTime,
        Duration::ZERO,
    );
    wait_for_waiters(&broker, request.id, 2).await;
    leaving_token.cancel();

    assert!(matches!(
        leaves.await.unwrap(),
        Err(PermissionError::ApprovalCancelled { .. })
    ));
    assert_eq!(broker.pending_count(), 1);
    assert!(sink.withdrawn().is_empty());

    broker.resolve(request.id, Resolution::approve()).unwrap();
    assert!(stays.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_caller_after_last_detach_gets_fresh_request() {
    let (broker, sink, _rx) = setup();
    let descriptor = PermissionDescriptor::command("make deploy");
    let join = || {
        broker.join_or_create(
            &agent(),
            &descriptor,
            "deploy",
            GrantScope::OneTime,
            RiskLevel::Medium,
            Duration::ZERO,
        )
    };

    let first = join();
    assert!(first.publish.is_some());
    broker.detach(first.id);

    assert_eq!(broker.pending_count(), 0);
    assert_eq!(*first.state.borrow(), ApprovalState::Cancelled);
    assert_eq!(sink.withdrawn(), vec![first.id]);

    let second = join();
    assert_ne!(second.id, first.id);
    assert!(second.publish.is_some());
    assert_eq!(*second.state.borrow(), ApprovalState::Pending);
    assert_eq!(broker.pending_count(), 1);
}

#[tokio::test]
async fn test_joiner_survives_earlier_waiter_detaching() {
    let (broker, sink, _rx) = setup();
    let descriptor = PermissionDescriptor::command("make deploy");
    let join = || {
        broker.join_or_create(
            &agent(),
            &descriptor,
            "deploy",
            GrantScope::OneTime,
            RiskLevel::Medium,
            Duration::ZERO,
        )
    };

    let first = join();
    let second = join();
    assert_eq!(second.id, first.id);
    assert!(second.publish.is_none());

    broker.detach(first.id);
    assert_eq!(*second.state.borrow(), ApprovalState::Pending);
    assert!(sink.withdrawn().is_empty());

    broker.resolve(second.id, Resolution::approve()).unwrap();
    assert_eq!(
        *second.state.borrow(),
        ApprovalState::Approved {
            scope: GrantScope::OneTime
        }
    );
}

#[tokio::test]
async fn test_session_approval_short_circuits_next_call() {
    let (broker, _sink, mut rx) = setup();
    let handle = spawn_require(
        &broker,
        CancellationToken::new(),
        "cargo test",
        GrantScope::Session,
        Duration::from_secs(60),
    );
    let request = rx.recv().await.unwrap();
    broker.resolve(request.id, Resolution::approve()).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(broker.grants().len(), 1);

    let again = spawn_require(
        &broker,
        CancellationToken::new(),
        "cargo test",
        GrantScope::Session,
        Duration::from_secs(60),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(matches!(
        again,
        ApprovalOutcome::Granted {
            scope: GrantScope::Session,
            ..
        }
    ));
    assert!(rx.try_recv().is_err());
    assert_eq!(broker.grants().len(), 1);
}

#[tokio::test]
async fn test_resolver_can_widen_scope() {
    let (broker, _sink, mut rx) = setup();
    let handle = spawn_require(
        &broker,
        CancellationToken::new(),
        "cargo fmt",
        GrantScope::OneTime,
        Duration::from_secs(60),
    );
    let request = rx.recv().await.unwrap();
    broker
        .resolve(request.id, Resolution::approve_with(GrantScope::Persistent))
        .unwrap();
    let outcome = handle.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        ApprovalOutcome::Approved {
            scope: GrantScope::Persistent,
            ..
        }
    ));
    assert_eq!(broker.grants().persistent_grants().len(), 1);
}

#[tokio::test]
async fn test_resolve_twice_fails() {
    let (broker, _sink, mut rx) = setup();
    let handle = spawn_require(
        &broker,
        CancellationToken::new(),
        "ls",
        GrantScope::OneTime,
        Duration::from_secs(60),
    );
    let request = rx.recv().await.unwrap();
    broker.resolve(request.id, Resolution::approve()).unwrap();
    assert!(matches!(
        broker.resolve(request.id, Resolution::deny("late")),
        Err(PermissionError::UnknownApproval { .. })
    ));
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_waits_indefinitely() {
    let (broker, _sink, mut rx) = setup();
    let handle = spawn_require(
        &broker,
        CancellationToken::new(),
        "terraform apply",
        GrantScope::OneTime,
        Duration::ZERO,
    );
    let request = rx.recv().await.unwrap();
    assert!(request.expires_at.is_none());

    tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
    assert_eq!(broker.pending_count(), 1);
    assert!(!handle.is_finished());

    broker.resolve(request.id, Resolution::approve()).unwrap();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_sink_failure_is_returned_and_cleaned_up() {
    let broker = ApprovalBroker::new(Arc::new(GrantStore::new()));
    broker.set_sink(Arc::new(FailingSink));
    let err = broker
        .require_approval(
            &CancellationToken::new(),
            &agent(),
            &PermissionDescriptor::command("ls"),
            "list",
            GrantScope::OneTime,
            RiskLevel::Low,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PermissionError::Sink(_)));
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn test_dropped_future_releases_pending() {
    let (broker, sink, _rx) = setup();
    let descriptor = PermissionDescriptor::command("sleep 1000");
    let cancel = CancellationToken::new();
    let agent = agent();
    let wait = broker.require_approval(
        &cancel,
        &agent,
        &descriptor,
        "wait",
        GrantScope::OneTime,
        RiskLevel::Low,
        Duration::ZERO,
    );
    assert!(
        tokio::time::timeout(Duration::from_millis(20), wait)
            .await
            .is_err()
    );
    assert_eq!(broker.pending_count(), 0);
    assert_eq!(sink.withdrawn().len(), 1);
}

#[tokio::test]
async fn test_seeded_one_time_grant_used_once() {
    let broker = ApprovalBroker::new(Arc::new(GrantStore::new()));
    broker
        .grants()
        .put(Grant::new(
            agent(),
            "command.execute",
            "make",
            GrantScope::OneTime,
        ))
        .unwrap();

    let descriptor = PermissionDescriptor::command("make");
    assert!(matches!(
        require_make(&broker, &descriptor).await,
        Ok(ApprovalOutcome::Granted {
            scope: GrantScope::OneTime,
            ..
        })
    ));
    // Grant consumed; no surface registered for the second attempt.
    assert!(matches!(
        require_make(&broker, &descriptor).await,
        Err(PermissionError::NoApprovalSurface { .. })
    ));
}

async fn require_make(
    broker: &ApprovalBroker,
    descriptor: &PermissionDescriptor,
) -> PermissionResult<ApprovalOutcome> {
    broker
        .require_approval(
            &CancellationToken::new(),
            &agent(),
            descriptor,
            "build",
            GrantScope::OneTime,
            RiskLevel::Medium,
            Duration::from_secs(1),
        )
        .await
}
