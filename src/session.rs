// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session lifecycle management.
//!
//! [`SessionManager::connect`] runs the ordered pipeline
//! connect → open channel → CreateSession → ActivateSession and yields an
//! active [`Session`]. Any stage failing unwinds the stages already
//! completed, so a failed connect never leaks a half-open session or
//! channel.
//!
//! Transient failures (refused, unreachable, timed out, link lost during the
//! handshake) are retried with bounded exponential backoff per
//! [`RetryPolicy`]. Identity and security-policy rejections are never
//! retried: the server will reject them again.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::channel::{ServerConnector, TransportChannel};
use crate::error::{ClientError, ClientResult, ConnectError, SessionError};
use crate::service::{AuthToken, ServiceRequest, ServiceResponse, StatusCode};
use crate::types::{EndpointDescriptor, NodeId};

// =============================================================================
// SessionState
// =============================================================================

/// Liveness state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The establishment pipeline is running.
    Connecting,

    /// The session is activated and accepting service calls.
    Active,

    /// The session is still active but close to its server-side timeout.
    Expiring,

    /// The session was closed, locally or by the server.
    Closed,

    /// Establishment failed.
    Failed,
}

impl SessionState {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Expiring => "expiring",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// RetryPolicy
// =============================================================================

/// Bounded exponential backoff for transient connect failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first try included. 1 disables retry.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry.
    pub multiplier: f64,

    /// Upper bound on a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Returns the delay to wait before the given retry.
    ///
    /// `retry` is 1-based: 1 is the delay before the second attempt.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

// =============================================================================
// Session
// =============================================================================

/// Fraction of the revised timeout after which the session reports
/// [`SessionState::Expiring`].
const EXPIRY_WARNING_FRACTION: f64 = 0.75;

/// An activated OPC UA session bound to one transport channel.
///
/// Created only by [`SessionManager::connect`]. Destroyed by an explicit
/// [`close`](Session::close), by channel loss, or by the server expiring it.
pub struct Session {
    channel: Arc<TransportChannel>,
    session_id: NodeId,
    auth_token: AuthToken,
    revised_timeout: Duration,
    activated_at: Instant,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Issues a session-scoped service call.
    ///
    /// Fails with [`SessionError::NotActive`] when the session is closed, and
    /// maps server-side session invalidation
    /// (`Bad_SessionIdInvalid`/`Bad_SessionClosed`) to
    /// [`SessionError::ClosedByServer`], marking the session closed. Other
    /// faults pass through for the caller to interpret.
    pub async fn send(&self, request: ServiceRequest) -> ClientResult<ServiceResponse> {
        let state = self.state();
        if !matches!(state, SessionState::Active | SessionState::Expiring) {
            return Err(SessionError::not_active(state.name()).into());
        }

        let response = match self.channel.send(request).await {
            Ok(response) => response,
            Err(error) => {
                if matches!(error, ClientError::Channel(_)) {
                    self.set_state(SessionState::Closed);
                }
                return Err(error);
            }
        };

        if let Some(status) = response.fault_status() {
            if status == StatusCode::BAD_SESSION_ID_INVALID
                || status == StatusCode::BAD_SESSION_CLOSED
            {
                warn!(session_id = %self.session_id, %status, "session invalidated by server");
                self.set_state(SessionState::Closed);
                return Err(SessionError::ClosedByServer.into());
            }
        }

        Ok(response)
    }

    /// Closes the session and its channel. Safe to call more than once.
    ///
    /// The CloseSession call is best-effort: a server that already dropped
    /// the session cannot block the local teardown.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        let request = ServiceRequest::CloseSession {
            auth_token: self.auth_token,
        };
        if let Err(error) = self.channel.send(request).await {
            debug!(session_id = %self.session_id, %error, "close session call failed");
        }
        self.channel.close();
        info!(session_id = %self.session_id, "session closed");
    }

    /// Returns the current liveness state.
    ///
    /// An active session past [`EXPIRY_WARNING_FRACTION`] of its revised
    /// timeout reports [`SessionState::Expiring`].
    pub fn state(&self) -> SessionState {
        let state = *self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state == SessionState::Active {
            let warn_after = self.revised_timeout.mul_f64(EXPIRY_WARNING_FRACTION);
            if self.activated_at.elapsed() >= warn_after {
                return SessionState::Expiring;
            }
        }
        state
    }

    /// Returns the server-assigned session node ID.
    pub fn session_id(&self) -> &NodeId {
        &self.session_id
    }

    /// Returns the authentication token.
    pub fn auth_token(&self) -> AuthToken {
        self.auth_token
    }

    /// Returns the server-revised session timeout.
    pub fn revised_timeout(&self) -> Duration {
        self.revised_timeout
    }

    /// Returns the endpoint URL this session is bound to.
    pub fn endpoint_url(&self) -> &str {
        self.channel.endpoint_url()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SessionManager
// =============================================================================

/// Establishes and tears down sessions against OPC UA endpoints.
pub struct SessionManager {
    connector: Arc<dyn ServerConnector>,
    retry: RetryPolicy,
    lifecycle: watch::Sender<SessionState>,
}

impl SessionManager {
    /// Creates a manager over the given connector with the default retry
    /// policy.
    pub fn new(connector: Arc<dyn ServerConnector>) -> Self {
        let (lifecycle, _) = watch::channel(SessionState::Closed);
        Self {
            connector,
            retry: RetryPolicy::default(),
            lifecycle,
        }
    }

    /// Replaces the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Subscribes to session lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.lifecycle.subscribe()
    }

    /// Connects to the endpoint and returns an active session.
    ///
    /// Retries transient failures per the retry policy. Non-retryable
    /// failures (identity rejected, security policy rejected, configuration)
    /// fail immediately.
    pub async fn connect(&self, endpoint: &EndpointDescriptor) -> ClientResult<Session> {
        endpoint.validate()?;
        self.lifecycle.send_replace(SessionState::Connecting);

        let mut attempt: u32 = 1;
        loop {
            match self.establish(endpoint).await {
                Ok(session) => {
                    self.lifecycle.send_replace(SessionState::Active);
                    info!(
                        endpoint = %endpoint.url,
                        session_id = %session.session_id,
                        attempt,
                        "session active"
                    );
                    return Ok(session);
                }
                Err(error) if error.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        endpoint = %endpoint.url,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        %error,
                        ?delay,
                        "connect attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    self.lifecycle.send_replace(SessionState::Failed);
                    warn!(endpoint = %endpoint.url, attempt, %error, "connect failed");
                    return Err(error);
                }
            }
        }
    }

    /// Closes a session and publishes the transition.
    pub async fn close(&self, session: &Session) {
        session.close().await;
        self.lifecycle.send_replace(SessionState::Closed);
    }

    /// Runs one establishment pipeline: channel, CreateSession,
    /// ActivateSession. Unwinds completed stages on failure.
    async fn establish(&self, endpoint: &EndpointDescriptor) -> ClientResult<Session> {
        let channel = Arc::new(TransportChannel::open(self.connector.as_ref(), endpoint).await?);

        let (session_id, auth_token, revised_timeout) =
            match self.create_session(&channel, endpoint).await {
                Ok(created) => created,
                Err(error) => {
                    channel.close();
                    return Err(error);
                }
            };

        debug!(endpoint = %endpoint.url, %session_id, "session created, activating");

        if let Err(error) = self.activate_session(&channel, endpoint, auth_token).await {
            // Free the half-open session before abandoning the channel.
            let _ = channel
                .send(ServiceRequest::CloseSession { auth_token })
                .await;
            channel.close();
            return Err(error);
        }

        Ok(Session {
            channel,
            session_id,
            auth_token,
            revised_timeout,
            activated_at: Instant::now(),
            state: Arc::new(Mutex::new(SessionState::Active)),
        })
    }

    async fn create_session(
        &self,
        channel: &TransportChannel,
        endpoint: &EndpointDescriptor,
    ) -> ClientResult<(NodeId, AuthToken, Duration)> {
        let request = ServiceRequest::CreateSession {
            endpoint_url: endpoint.url.clone(),
            session_name: endpoint.effective_session_name().to_owned(),
            requested_timeout: endpoint.session_timeout,
        };

        match channel.send(request).await? {
            ServiceResponse::CreateSession {
                session_id,
                auth_token,
                revised_timeout,
            } => Ok((session_id, auth_token, revised_timeout)),
            ServiceResponse::Fault { status }
                if status == StatusCode::BAD_SECURITY_POLICY_REJECTED =>
            {
                Err(ConnectError::security_policy_rejected(
                    &endpoint.url,
                    endpoint.security_policy.name(),
                )
                .into())
            }
            ServiceResponse::Fault { status } => {
                Err(SessionError::creation_failed(status.to_string()).into())
            }
            _ => Err(SessionError::creation_failed("unexpected response type").into()),
        }
    }

    async fn activate_session(
        &self,
        channel: &TransportChannel,
        endpoint: &EndpointDescriptor,
        auth_token: AuthToken,
    ) -> ClientResult<()> {
        let request = ServiceRequest::ActivateSession {
            auth_token,
            identity: endpoint.identity.clone(),
        };

        match channel.send(request).await? {
            ServiceResponse::ActivateSession => Ok(()),
            ServiceResponse::Fault { status }
                if status == StatusCode::BAD_IDENTITY_TOKEN_REJECTED =>
            {
                Err(SessionError::identity_rejected(&endpoint.url).into())
            }
            ServiceResponse::Fault { status } => {
                Err(SessionError::activation_failed(status.to_string()).into())
            }
            _ => Err(SessionError::activation_failed("unexpected response type").into()),
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("retry", &self.retry)
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
    fn test_retry_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(4), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_none_disables_retry() {
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }

    #[test]
    fn test_session_state_names() {
        assert_eq!(SessionState::Active.name(), "active");
        assert_eq!(SessionState::Expiring.name(), "expiring");
        assert_eq!(SessionState::Failed.to_string(), "failed");
    }
}
