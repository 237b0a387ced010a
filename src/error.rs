// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the browse engine.
//!
//! The error hierarchy mirrors the layers of the client:
//!
//! ```text
//! ClientError
//! ├── Connect    - endpoint unreachable, refused, security rejected
//! ├── Channel    - transport channel failures (connection lost, closed)
//! ├── Session    - session lifecycle errors
//! ├── Browse     - browse/continuation protocol errors
//! ├── Config     - invalid settings and node identifiers
//! ├── Timeout    - per-operation timeouts
//! ├── Busy       - re-entrant run rejected
//! └── Cancelled  - run cancelled at a suspension point
//! ```
//!
//! Transport- and session-level errors abort a whole browse run; per-node
//! browse failures never appear here, they travel inside
//! [`NodeBrowseResult`](crate::browse::NodeBrowseResult) as status codes.
//!
//! # Examples
//!
//! ```
//! use opcua_browse::error::{ClientError, ConnectError};
//!
//! let error = ClientError::from(ConnectError::refused("opc.tcp://localhost:4840"));
//! assert!(error.is_retryable());
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::service::StatusCode;

/// Result alias used throughout the crate.
pub type ClientResult<T> = Result<T, ClientError>;

// =============================================================================
// ClientError - Main Error Type
// =============================================================================

/// The top-level error type for browse client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection establishment errors.
    #[error("{0}")]
    Connect(#[from] ConnectError),

    /// Transport channel errors.
    #[error("{0}")]
    Channel(#[from] ChannelError),

    /// Session lifecycle errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Browse protocol errors.
    #[error("{0}")]
    Browse(#[from] BrowseError),

    /// Configuration errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Operation timeouts.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),

    /// A run was rejected because another run is already in flight.
    #[error("browse run rejected, another run is in progress against {endpoint}")]
    Busy {
        /// The endpoint the rejected run targeted.
        endpoint: String,
    },

    /// A run was cancelled at a suspension point.
    #[error("browse run cancelled during {stage}")]
    Cancelled {
        /// The pipeline stage that was interrupted.
        stage: &'static str,
    },
}

impl ClientError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigError) -> Self {
        Self::Config(error)
    }

    /// Creates a connection-lost error.
    pub fn connection_lost(endpoint: impl Into<String>) -> Self {
        Self::Channel(ChannelError::connection_lost(endpoint))
    }

    /// Creates a busy error.
    pub fn busy(endpoint: impl Into<String>) -> Self {
        Self::Busy {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a cancelled error for the given pipeline stage.
    pub fn cancelled(stage: &'static str) -> Self {
        Self::Cancelled { stage }
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Returns `true` if retrying the failed operation may succeed.
    ///
    /// Transient connection failures (refusal, timeout, connection lost) are
    /// retryable; security/identity rejections and configuration errors are
    /// not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(e) => e.is_retryable(),
            Self::Channel(ChannelError::ConnectionLost { .. }) => true,
            Self::Channel(_) => false,
            Self::Session(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::Browse(_) | Self::Config(_) | Self::Busy { .. } | Self::Cancelled { .. } => {
                false
            }
        }
    }

    /// Returns `true` if the run was cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout(_) | Self::Busy { .. } => ErrorSeverity::Transient,
            Self::Connect(e) if e.is_retryable() => ErrorSeverity::Transient,
            Self::Channel(ChannelError::ConnectionLost { .. }) => ErrorSeverity::Recoverable,
            Self::Cancelled { .. } => ErrorSeverity::Recoverable,
            _ => ErrorSeverity::Fatal,
        }
    }

    /// Returns a short category name for logging and status detail.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Channel(_) => "channel",
            Self::Session(_) => "session",
            Self::Browse(_) => "browse",
            Self::Config(_) => "config",
            Self::Timeout(_) => "timeout",
            Self::Busy { .. } => "busy",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

// =============================================================================
// ConnectError
// =============================================================================

/// Errors establishing a connection to an endpoint.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The server actively refused the connection.
    #[error("connection refused by {endpoint}")]
    Refused {
        /// The endpoint URL.
        endpoint: String,
    },

    /// The endpoint could not be reached.
    #[error("endpoint {endpoint} unreachable: {reason}")]
    Unreachable {
        /// The endpoint URL.
        endpoint: String,
        /// The underlying cause.
        reason: String,
    },

    /// The connection attempt timed out.
    #[error("connecting to {endpoint} timed out after {after:?}")]
    Timeout {
        /// The endpoint URL.
        endpoint: String,
        /// The elapsed timeout.
        after: Duration,
    },

    /// The server rejected the requested security policy or mode.
    ///
    /// Never retried: the same policy will be rejected again.
    #[error("security policy {policy} rejected by {endpoint}")]
    SecurityPolicyRejected {
        /// The endpoint URL.
        endpoint: String,
        /// The rejected policy name.
        policy: String,
    },
}

impl ConnectError {
    /// Creates a connection refused error.
    pub fn refused(endpoint: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
        }
    }

    /// Creates an unreachable error.
    pub fn unreachable(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a connect timeout error.
    pub fn timeout(endpoint: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            endpoint: endpoint.into(),
            after,
        }
    }

    /// Creates a security policy rejection.
    pub fn security_policy_rejected(
        endpoint: impl Into<String>,
        policy: impl Into<String>,
    ) -> Self {
        Self::SecurityPolicyRejected {
            endpoint: endpoint.into(),
            policy: policy.into(),
        }
    }

    /// Returns `true` if this failure is transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::SecurityPolicyRejected { .. })
    }
}

// =============================================================================
// ChannelError
// =============================================================================

/// Errors raised by the transport channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel has never been opened or has been closed locally.
    #[error("channel is not connected")]
    NotConnected,

    /// The underlying transport connection was lost.
    ///
    /// Every in-flight and subsequent request on the channel fails with this
    /// error until the channel is reopened.
    #[error("connection to {endpoint} lost")]
    ConnectionLost {
        /// The endpoint URL.
        endpoint: String,
    },

    /// A request could not be handed to the transport.
    #[error("failed to submit request to {endpoint}: {reason}")]
    SendFailed {
        /// The endpoint URL.
        endpoint: String,
        /// The underlying cause.
        reason: String,
    },
}

impl ChannelError {
    /// Creates a connection-lost error.
    pub fn connection_lost(endpoint: impl Into<String>) -> Self {
        Self::ConnectionLost {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a send-failed error.
    pub fn send_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SendFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Errors in the session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The CreateSession service call failed.
    #[error("session creation failed: {reason}")]
    CreationFailed {
        /// The underlying cause.
        reason: String,
    },

    /// The ActivateSession service call failed.
    #[error("session activation failed: {reason}")]
    ActivationFailed {
        /// The underlying cause.
        reason: String,
    },

    /// The server rejected the user identity token.
    ///
    /// Never retried: the same credentials will be rejected again.
    #[error("user identity rejected by {endpoint}")]
    IdentityRejected {
        /// The endpoint URL.
        endpoint: String,
    },

    /// An operation was attempted on a session that is not active.
    #[error("session is not active (state: {state})")]
    NotActive {
        /// The session state at the time of the call.
        state: String,
    },

    /// The server closed or expired the session.
    #[error("session was closed by the server")]
    ClosedByServer,
}

impl SessionError {
    /// Creates a creation-failed error.
    pub fn creation_failed(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            reason: reason.into(),
        }
    }

    /// Creates an activation-failed error.
    pub fn activation_failed(reason: impl Into<String>) -> Self {
        Self::ActivationFailed {
            reason: reason.into(),
        }
    }

    /// Creates an identity-rejected error.
    pub fn identity_rejected(endpoint: impl Into<String>) -> Self {
        Self::IdentityRejected {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a not-active error.
    pub fn not_active(state: impl Into<String>) -> Self {
        Self::NotActive {
            state: state.into(),
        }
    }

    /// Returns `true` if this failure is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ClosedByServer)
    }
}

// =============================================================================
// BrowseError
// =============================================================================

/// Browse protocol errors that abort a whole call.
///
/// Per-starting-node failures such as an unknown node ID do NOT surface here;
/// they are embedded in the aggregate result so sibling nodes still succeed.
#[derive(Debug, Error)]
pub enum BrowseError {
    /// A continuation point was rejected by the server.
    ///
    /// Happens when a continuation point is replayed against a different
    /// session than the one that issued it, or after it has expired.
    #[error("continuation point rejected: {reason}")]
    BadContinuation {
        /// The underlying cause.
        reason: String,
    },

    /// The starting node does not exist (whole-call form).
    #[error("node {node_id} not found")]
    NodeNotFound {
        /// The textual node ID.
        node_id: String,
    },

    /// The server returned a result list that does not match the request.
    #[error("browse response carried {actual} results, expected {expected}")]
    ResultCountMismatch {
        /// Number of starting nodes requested.
        expected: usize,
        /// Number of results returned.
        actual: usize,
    },

    /// The service call itself faulted.
    #[error("browse service fault: {status}")]
    ServiceFault {
        /// The fault status code.
        status: StatusCode,
    },

    /// The server answered with an unexpected response type.
    #[error("unexpected response to {operation}")]
    UnexpectedResponse {
        /// The operation that was issued.
        operation: &'static str,
    },
}

impl BrowseError {
    /// Creates a bad-continuation error.
    pub fn bad_continuation(reason: impl Into<String>) -> Self {
        Self::BadContinuation {
            reason: reason.into(),
        }
    }

    /// Creates a node-not-found error.
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    /// Creates a service fault error.
    pub fn service_fault(status: StatusCode) -> Self {
        Self::ServiceFault { status }
    }
}

// =============================================================================
// ConfigError
// =============================================================================

/// Invalid configuration or input.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field is missing.
    #[error("missing required field '{field}'")]
    MissingField {
        /// The field name.
        field: &'static str,
    },

    /// The endpoint URL is malformed.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The offending URL.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A node ID string could not be parsed.
    #[error("invalid node id '{input}': {reason}")]
    InvalidNodeId {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Security settings are inconsistent.
    #[error("invalid security configuration: {reason}")]
    InvalidSecurity {
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a missing-field error.
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Creates an invalid-endpoint error.
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid-node-id error.
    pub fn invalid_node_id(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid-security error.
    pub fn invalid_security(reason: impl Into<String>) -> Self {
        Self::InvalidSecurity {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// A suspension point exceeded its configured timeout.
#[derive(Debug, Error)]
pub enum TimeoutError {
    /// A request on the channel timed out waiting for its response.
    #[error("{operation} timed out after {after:?}")]
    Request {
        /// The operation that timed out.
        operation: &'static str,
        /// The elapsed timeout.
        after: Duration,
    },
}

impl TimeoutError {
    /// Creates a request timeout error.
    pub fn request(operation: &'static str, after: Duration) -> Self {
        Self::Request { operation, after }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Coarse severity classification for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// Likely to succeed on retry without intervention.
    Transient,

    /// Requires a fresh connection or run, but no operator action.
    Recoverable,

    /// Requires configuration or operator intervention.
    Fatal,
}

impl ErrorSeverity {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Recoverable => "recoverable",
            Self::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_retryability() {
        assert!(ConnectError::refused("opc.tcp://h:4840").is_retryable());
        assert!(ConnectError::timeout("opc.tcp://h:4840", Duration::from_secs(5)).is_retryable());
        assert!(
            !ConnectError::security_policy_rejected("opc.tcp://h:4840", "Basic256Sha256")
                .is_retryable()
        );
    }

    #[test]
    fn test_client_error_classification() {
        let lost = ClientError::connection_lost("opc.tcp://h:4840");
        assert!(lost.is_retryable());
        assert_eq!(lost.category(), "channel");

        let busy = ClientError::busy("opc.tcp://h:4840");
        assert!(!busy.is_retryable());
        assert_eq!(busy.severity(), ErrorSeverity::Transient);

        let cancelled = ClientError::cancelled("browse");
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.severity(), ErrorSeverity::Recoverable);

        let identity: ClientError = SessionError::identity_rejected("opc.tcp://h:4840").into();
        assert!(!identity.is_retryable());
        assert_eq!(identity.severity(), ErrorSeverity::Fatal);
    }

    #[test]
    fn test_error_display() {
        let error = ClientError::from(BrowseError::bad_continuation("wrong session"));
        assert!(error.to_string().contains("continuation point"));

        let error = ClientError::cancelled("connect");
        assert!(error.to_string().contains("connect"));
    }
}
