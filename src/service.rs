// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Typed OPC UA service model.
//!
//! Binary wire encoding is out of scope for this crate; the service layer is a
//! typed request/response model carried over the transport abstraction in
//! [`channel`](crate::channel). Only the services the browse engine needs are
//! modeled: session lifecycle (CreateSession, ActivateSession, CloseSession)
//! and address-space traversal (Browse, BrowseNext).
//!
//! Status codes use the real OPC UA numeric values so results interoperate
//! with tooling that understands them.

use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{BrowseDirection, NodeClass, NodeId, QualifiedName, UserIdentity};

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code.
///
/// Carries the standard 32-bit encoding: the top bit set means Bad, the
/// second-from-top bit alone means Uncertain, all clear means Good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// The operation succeeded.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);

    /// Bad_UnexpectedError.
    pub const BAD_UNEXPECTED: StatusCode = StatusCode(0x8001_0000);

    /// Bad_Timeout.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);

    /// Bad_TooManyOperations.
    pub const BAD_TOO_MANY_OPERATIONS: StatusCode = StatusCode(0x8010_0000);

    /// Bad_IdentityTokenRejected.
    pub const BAD_IDENTITY_TOKEN_REJECTED: StatusCode = StatusCode(0x8021_0000);

    /// Bad_SessionIdInvalid.
    pub const BAD_SESSION_ID_INVALID: StatusCode = StatusCode(0x8025_0000);

    /// Bad_SessionClosed.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);

    /// Bad_NodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);

    /// Bad_ContinuationPointInvalid.
    pub const BAD_CONTINUATION_POINT_INVALID: StatusCode = StatusCode(0x804A_0000);

    /// Bad_SecurityPolicyRejected.
    pub const BAD_SECURITY_POLICY_REJECTED: StatusCode = StatusCode(0x8055_0000);

    /// Returns `true` if the status is Good.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` if the status is Bad.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name for codes this engine uses.
    pub const fn name(&self) -> &'static str {
        match self.0 {
            0x0000_0000 => "Good",
            0x8001_0000 => "Bad_UnexpectedError",
            0x800A_0000 => "Bad_Timeout",
            0x8010_0000 => "Bad_TooManyOperations",
            0x8021_0000 => "Bad_IdentityTokenRejected",
            0x8025_0000 => "Bad_SessionIdInvalid",
            0x8026_0000 => "Bad_SessionClosed",
            0x8034_0000 => "Bad_NodeIdUnknown",
            0x804A_0000 => "Bad_ContinuationPointInvalid",
            0x8055_0000 => "Bad_SecurityPolicyRejected",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::GOOD
    }
}

// =============================================================================
// AuthToken
// =============================================================================

/// Authentication token identifying an activated session.
///
/// Issued by the server on CreateSession and presented on every subsequent
/// session-scoped request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(pub Uuid);

impl AuthToken {
    /// Generates a fresh token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ContinuationPoint
// =============================================================================

/// Opaque server-issued token for resuming a paged browse.
///
/// A continuation point is scoped to exactly one (session, starting-node)
/// pair. Presenting it on a different session fails with
/// [`StatusCode::BAD_CONTINUATION_POINT_INVALID`]; it never silently returns
/// another session's data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationPoint(pub Vec<u8>);

impl ContinuationPoint {
    /// Wraps raw server-issued bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ContinuationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE64.encode(&self.0))
    }
}

// =============================================================================
// BrowseDescription
// =============================================================================

/// One starting node of a Browse service call, with its traversal filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseDescription {
    /// The node to browse from.
    pub node_id: NodeId,

    /// Direction of traversal.
    #[serde(default)]
    pub direction: BrowseDirection,

    /// Reference type to follow (None = all references).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<NodeId>,

    /// Whether subtypes of the reference type are followed.
    #[serde(default)]
    pub include_subtypes: bool,

    /// Node class mask (0 = all classes).
    #[serde(default)]
    pub node_class_mask: u32,
}

impl BrowseDescription {
    /// Creates a description with default filters (forward, all references,
    /// all node classes).
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            direction: BrowseDirection::Forward,
            reference_type: None,
            include_subtypes: true,
            node_class_mask: 0,
        }
    }
}

// =============================================================================
// ReferenceDescription
// =============================================================================

/// One reference discovered by a Browse or BrowseNext call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDescription {
    /// The target node.
    pub node_id: NodeId,

    /// Namespace-qualified browse name of the target.
    pub browse_name: QualifiedName,

    /// Localized display name of the target.
    pub display_name: String,

    /// Node class of the target.
    pub node_class: NodeClass,

    /// Reference type connecting source and target (e.g. Organizes, i=35).
    pub reference_type: NodeId,

    /// Hint that the target itself has forward references.
    pub has_children: bool,
}

// =============================================================================
// BrowseResultItem
// =============================================================================

/// Per-starting-node result of a Browse or BrowseNext call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseResultItem {
    /// Status of this starting node's traversal.
    pub status: StatusCode,

    /// Continuation point, present when the server has more references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_point: Option<ContinuationPoint>,

    /// References in server-returned order.
    pub references: Vec<ReferenceDescription>,
}

impl BrowseResultItem {
    /// Creates a successful result.
    pub fn good(references: Vec<ReferenceDescription>) -> Self {
        Self {
            status: StatusCode::GOOD,
            continuation_point: None,
            references,
        }
    }

    /// Creates a failed result.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            status,
            continuation_point: None,
            references: Vec::new(),
        }
    }

    /// Attaches a continuation point.
    pub fn with_continuation(mut self, point: ContinuationPoint) -> Self {
        self.continuation_point = Some(point);
        self
    }
}

// =============================================================================
// ServiceRequest / ServiceResponse
// =============================================================================

/// A service request issued over the transport channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceRequest {
    /// Creates a logical session on the secure channel.
    CreateSession {
        /// Endpoint URL the client believes it is talking to.
        endpoint_url: String,
        /// Human-readable session name.
        session_name: String,
        /// Requested session timeout.
        #[serde(with = "humantime_serde")]
        requested_timeout: Duration,
    },

    /// Activates a created session with a user identity.
    ActivateSession {
        /// Token returned by CreateSession.
        auth_token: AuthToken,
        /// User identity to authenticate with.
        identity: UserIdentity,
    },

    /// Closes a session.
    CloseSession {
        /// Token of the session to close.
        auth_token: AuthToken,
    },

    /// Browses one or more starting nodes.
    Browse {
        /// Session token.
        auth_token: AuthToken,
        /// The starting nodes with their filters, in caller order.
        nodes: Vec<BrowseDescription>,
        /// Maximum references per node in one response (0 = server default).
        max_references_per_node: u32,
    },

    /// Continues or releases paged browses.
    BrowseNext {
        /// Session token.
        auth_token: AuthToken,
        /// Continuation points to present, in original node order.
        continuation_points: Vec<ContinuationPoint>,
        /// When `true`, frees the points without returning more data.
        release_continuation_points: bool,
    },
}

impl ServiceRequest {
    /// Returns the service name for logging.
    pub const fn service_name(&self) -> &'static str {
        match self {
            Self::CreateSession { .. } => "CreateSession",
            Self::ActivateSession { .. } => "ActivateSession",
            Self::CloseSession { .. } => "CloseSession",
            Self::Browse { .. } => "Browse",
            Self::BrowseNext { .. } => "BrowseNext",
        }
    }
}

/// A service response received over the transport channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceResponse {
    /// Response to CreateSession.
    CreateSession {
        /// Server-assigned session node ID.
        session_id: NodeId,
        /// Token to present on subsequent requests.
        auth_token: AuthToken,
        /// Server-revised session timeout.
        #[serde(with = "humantime_serde")]
        revised_timeout: Duration,
    },

    /// Response to ActivateSession.
    ActivateSession,

    /// Response to CloseSession.
    CloseSession,

    /// Response to Browse.
    Browse {
        /// One result per requested starting node, in request order.
        results: Vec<BrowseResultItem>,
    },

    /// Response to BrowseNext.
    BrowseNext {
        /// One result per presented continuation point, in request order.
        results: Vec<BrowseResultItem>,
    },

    /// The service call as a whole failed.
    Fault {
        /// The fault status.
        status: StatusCode,
    },
}

impl ServiceResponse {
    /// Returns the fault status if this is a fault response.
    pub fn fault_status(&self) -> Option<StatusCode> {
        match self {
            Self::Fault { status } => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// Transport framing
// =============================================================================

/// A correlated request as it travels over the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Correlation identifier, unique per channel.
    pub request_id: u32,

    /// The request body.
    pub body: ServiceRequest,
}

/// A correlated response as it travels over the transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Correlation identifier copied from the request.
    pub request_id: u32,

    /// The response body.
    pub body: ServiceResponse,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_classification() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::GOOD.is_bad());
        assert!(StatusCode::BAD_NODE_ID_UNKNOWN.is_bad());
        assert!(StatusCode::BAD_CONTINUATION_POINT_INVALID.is_bad());
        assert!(!StatusCode::BAD_SESSION_ID_INVALID.is_good());
    }

    #[test]
    fn test_status_code_names() {
        assert_eq!(StatusCode::GOOD.name(), "Good");
        assert_eq!(StatusCode::BAD_NODE_ID_UNKNOWN.name(), "Bad_NodeIdUnknown");
        assert_eq!(
            StatusCode::BAD_CONTINUATION_POINT_INVALID.name(),
            "Bad_ContinuationPointInvalid"
        );
        assert_eq!(StatusCode(0xDEAD_BEEF).name(), "Unknown");
    }

    #[test]
    fn test_continuation_point_display_is_base64() {
        let point = ContinuationPoint::new(vec![72, 101, 108, 108, 111]);
        assert_eq!(point.to_string(), "SGVsbG8=");
    }

    #[test]
    fn test_service_names() {
        let request = ServiceRequest::CloseSession {
            auth_token: AuthToken::generate(),
        };
        assert_eq!(request.service_name(), "CloseSession");
    }

    #[test]
    fn test_browse_result_item_builders() {
        let item = BrowseResultItem::good(Vec::new())
            .with_continuation(ContinuationPoint::new(vec![1, 2, 3]));
        assert!(item.status.is_good());
        assert!(item.continuation_point.is_some());

        let item = BrowseResultItem::bad(StatusCode::BAD_NODE_ID_UNKNOWN);
        assert!(item.status.is_bad());
        assert!(item.references.is_empty());
    }
}
