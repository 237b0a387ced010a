// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Browse run orchestration.
//!
//! [`BrowseCoordinator::run`] is the entry point of the crate: it connects,
//! browses, and always closes the session it opened, on success, failure, or
//! cancellation. Progress is observable as [`StatusEvent`] snapshots on a
//! watch channel, moving Idle → Connecting → Browsing → Done or Error.
//!
//! Runs never interleave on one coordinator. [`BusyPolicy::Reject`] (the
//! default) fails a concurrent run with [`ClientError::Busy`];
//! [`BusyPolicy::Serialize`] queues it behind the one in flight.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browse::{BrowseEngine, BrowseOutcome, BrowseRequest};
use crate::channel::ServerConnector;
use crate::error::{ClientError, ClientResult};
use crate::session::{RetryPolicy, SessionManager};
use crate::types::EndpointDescriptor;

// =============================================================================
// RunState / StatusEvent
// =============================================================================

/// State of a browse run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run in flight.
    Idle,

    /// Session establishment is in progress.
    Connecting,

    /// The traversal is in progress.
    Browsing,

    /// The last run completed successfully.
    Done,

    /// The last run failed or was cancelled.
    Error,
}

impl RunState {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Browsing => "browsing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A status snapshot published on every run transition.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    /// The run state.
    pub state: RunState,

    /// Human-readable detail, e.g. `items: 12` or an error message.
    pub detail: String,

    /// When the transition happened.
    pub at: DateTime<Utc>,
}

impl StatusEvent {
    fn new(state: RunState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: detail.into(),
            at: Utc::now(),
        }
    }

    fn idle() -> Self {
        Self::new(RunState::Idle, "")
    }
}

// =============================================================================
// BusyPolicy
// =============================================================================

/// What happens when `run` is called while another run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Fail the new run immediately with [`ClientError::Busy`].
    #[default]
    Reject,

    /// Queue the new run behind the one in flight.
    Serialize,
}

// =============================================================================
// BrowseCoordinator
// =============================================================================

/// Orchestrates browse runs: one session per run, status events, busy
/// policy, cancellation.
pub struct BrowseCoordinator {
    manager: SessionManager,
    engine: BrowseEngine,
    busy_policy: BusyPolicy,
    run_lock: Mutex<()>,
    status: watch::Sender<StatusEvent>,
}

impl BrowseCoordinator {
    /// Creates a coordinator over the given connector.
    pub fn new(connector: Arc<dyn ServerConnector>) -> Self {
        let (status, _) = watch::channel(StatusEvent::idle());
        Self {
            manager: SessionManager::new(connector),
            engine: BrowseEngine::new(),
            busy_policy: BusyPolicy::default(),
            run_lock: Mutex::new(()),
            status,
        }
    }

    /// Replaces the connect retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.manager = self.manager.with_retry_policy(retry);
        self
    }

    /// Replaces the busy policy.
    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    /// Subscribes to run status snapshots.
    pub fn subscribe(&self) -> watch::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    /// Runs a browse against the endpoint to completion.
    pub async fn run(
        &self,
        endpoint: &EndpointDescriptor,
        request: &BrowseRequest,
    ) -> ClientResult<BrowseOutcome> {
        self.run_cancellable(endpoint, request, CancellationToken::new())
            .await
    }

    /// Runs a browse that can be cancelled from outside.
    ///
    /// Cancellation is honored at every suspension point. A cancelled run
    /// closes the session it opened before returning
    /// [`ClientError::Cancelled`].
    pub async fn run_cancellable(
        &self,
        endpoint: &EndpointDescriptor,
        request: &BrowseRequest,
        cancel: CancellationToken,
    ) -> ClientResult<BrowseOutcome> {
        let _guard = self.acquire(endpoint).await?;

        if cancel.is_cancelled() {
            return self.finish_cancelled("connect");
        }

        self.publish(RunState::Connecting, format!("connecting to {}", endpoint.url));

        let session = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // The dropped connect future unwinds any half-open channel.
                return self.finish_cancelled("connect");
            }
            result = self.manager.connect(endpoint) => match result {
                Ok(session) => session,
                Err(error) => return self.finish_failed(error),
            },
        };

        self.publish(
            RunState::Browsing,
            format!("browsing {} node(s)", request.effective_starting_nodes().len()),
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.manager.close(&session).await;
                return self.finish_cancelled("browse");
            }
            result = self.engine.browse(&session, request) => result,
        };

        self.manager.close(&session).await;

        match outcome {
            Ok(outcome) => {
                let detail = match outcome.total_references() {
                    0 => "no items".to_owned(),
                    n => format!("items: {n}"),
                };
                info!(endpoint = %endpoint.url, %detail, "browse run done");
                self.publish(RunState::Done, detail);
                Ok(outcome)
            }
            Err(error) => self.finish_failed(error),
        }
    }

    /// Takes the run lock per the busy policy.
    async fn acquire(&self, endpoint: &EndpointDescriptor) -> ClientResult<MutexGuard<'_, ()>> {
        match self.busy_policy {
            BusyPolicy::Reject => self.run_lock.try_lock().map_err(|_| {
                debug!(endpoint = %endpoint.url, "run rejected, coordinator busy");
                ClientError::busy(&endpoint.url)
            }),
            BusyPolicy::Serialize => Ok(self.run_lock.lock().await),
        }
    }

    fn finish_cancelled(&self, stage: &'static str) -> ClientResult<BrowseOutcome> {
        info!(stage, "browse run cancelled");
        self.publish(RunState::Error, format!("cancelled during {stage}"));
        Err(ClientError::cancelled(stage))
    }

    fn finish_failed(&self, error: ClientError) -> ClientResult<BrowseOutcome> {
        warn!(category = error.category(), %error, "browse run failed");
        self.publish(RunState::Error, error.to_string());
        Err(error)
    }

    fn publish(&self, state: RunState, detail: impl Into<String>) {
        self.status.send_replace(StatusEvent::new(state, detail));
    }

    /// Returns a handle to the underlying session manager.
    pub fn session_manager(&self) -> &SessionManager {
        &self.manager
    }
}

impl std::fmt::Debug for BrowseCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowseCoordinator")
            .field("busy_policy", &self.busy_policy)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_names() {
        assert_eq!(RunState::Idle.name(), "idle");
        assert_eq!(RunState::Browsing.to_string(), "browsing");
    }

    #[test]
    fn test_default_busy_policy_rejects() {
        assert_eq!(BusyPolicy::default(), BusyPolicy::Reject);
    }

    #[test]
    fn test_status_event_carries_timestamp() {
        let before = Utc::now();
        let event = StatusEvent::new(RunState::Done, "items: 3");
        assert!(event.at >= before);
        assert_eq!(event.detail, "items: 3");
    }
}
