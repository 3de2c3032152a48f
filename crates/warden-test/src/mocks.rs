//! Mock implementations for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use warden_approval::{ApprovalBroker, ApprovalSink, PendingApproval, Resolution};
use warden_core::{ApprovalId, PermissionError, PermissionResult};

/// Mock approval surface.
///
/// Each submitted request is recorded and answered with the next queued
/// [`Resolution`], or the default when the queue is empty. With no default,
/// requests stay pending so the test can resolve them through the broker.
///
/// Uses `std::sync::Mutex` internally so builder methods work without a
/// runtime.
#[derive(Debug)]
pub struct MockApprovalSink {
    /// Queued resolutions, answered in order.
    resolutions: Mutex<VecDeque<Resolution>>,
    /// Used when the queue is empty.
    default_resolution: Option<Resolution>,
    /// Delay before answering. Zero answers inside `submit`.
    delay: Duration,
    /// Error returned from every `submit` when set.
    failure: Option<String>,
    /// Captured submissions.
    submitted: Mutex<Vec<PendingApproval>>,
    /// Captured withdrawals.
    withdrawn: Mutex<Vec<ApprovalId>>,
    broker: Mutex<Weak<ApprovalBroker>>,
}

impl MockApprovalSink {
    /// A sink that leaves every request pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolutions: Mutex::new(VecDeque::new()),
            default_resolution: None,
            delay: Duration::ZERO,
            failure: None,
            submitted: Mutex::new(Vec::new()),
            withdrawn: Mutex::new(Vec::new()),
            broker: Mutex::new(Weak::new()),
        }
    }

    /// Queue a resolution.
    #[must_use]
    pub fn with_resolution(self, resolution: Resolution) -> Self {
        self.queue_resolution(resolution);
        self
    }

    /// Answer with `resolution` whenever the queue is empty.
    #[must_use]
    pub fn with_default_resolution(mut self, resolution: Resolution) -> Self {
        self.default_resolution = Some(resolution);
        self
    }

    /// Wait `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reject every submission with a sink error.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Register this sink with `broker` and return the shared handle.
    pub fn install(self, broker: &Arc<ApprovalBroker>) -> Arc<Self> {
        if let Ok(mut guard) = self.broker.lock() {
            *guard = Arc::downgrade(broker);
        }
        let sink = Arc::new(self);
        broker.set_sink(Arc::clone(&sink) as Arc<dyn ApprovalSink>);
        sink
    }

    /// Queue a resolution.
    pub fn queue_resolution(&self, resolution: Resolution) {
        if let Ok(mut guard) = self.resolutions.lock() {
            guard.push_back(resolution);
        }
    }

    /// Requests submitted so far.
    #[must_use]
    pub fn submitted(&self) -> Vec<PendingApproval> {
        self.submitted
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    /// Number of requests submitted so far.
    #[must_use]
    pub fn submit_count(&self) -> usize {
        self.submitted.lock().map(|g| g.len()).unwrap_or_default()
    }

    /// Requests withdrawn so far.
    #[must_use]
    pub fn withdrawn(&self) -> Vec<ApprovalId> {
        self.withdrawn
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    fn next_resolution(&self) -> Option<Resolution> {
        self.resolutions
            .lock()
            .ok()
            .and_then(|mut g| g.pop_front())
            .or_else(|| self.default_resolution.clone())
    }

    fn broker(&self) -> Option<Arc<ApprovalBroker>> {
        self.broker.lock().ok().and_then(|g| g.upgrade())
    }
}

impl Default for MockApprovalSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalSink for MockApprovalSink {
    async fn submit(&self, request: PendingApproval) -> PermissionResult<()> {
        if let Some(message) = &self.failure {
            return Err(PermissionError::Sink(message.clone()));
        }
        let id = request.id;
        if let Ok(mut guard) = self.submitted.lock() {
            guard.push(request);
        }

        let (Some(resolution), Some(broker)) = (self.next_resolution(), self.broker()) else {
            return Ok(());
        };
        if self.delay.is_zero() {
            if let Err(e) = broker.resolve(id, resolution) {
                tracing::debug!(approval = %id, error = %e, "mock resolution not applied");
            }
        } else {
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = broker.resolve(id, resolution) {
                    tracing::debug!(approval = %id, error = %e, "mock resolution not applied");
                }
            });
        }
        Ok(())
    }

    fn withdraw(&self, id: ApprovalId) {
        if let Ok(mut guard) = self.withdrawn.lock() {
            guard.push(id);
        }
    }
}
