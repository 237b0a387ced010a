// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Address-space traversal.
//!
//! [`BrowseEngine::browse`] issues one batched Browse call for all starting
//! nodes, then drives a BrowseNext loop for every node the server paged,
//! appending references in arrival order. Per-node failures (unknown node id
//! and friends) are captured in that node's [`NodeBrowseResult`] without
//! failing its siblings; transport and session failures abort the whole call.
//!
//! A `max_references_per_node` cap truncates a node's result with an explicit
//! `truncated` flag and releases the outstanding continuation point, so the
//! server does not hold resources for pages the client will never fetch.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{BrowseError, ClientResult};
use crate::service::{
    BrowseDescription, BrowseResultItem, ContinuationPoint, ServiceRequest, ServiceResponse,
    StatusCode,
};
use crate::session::Session;
use crate::types::{BrowseDirection, NodeId};

pub use crate::service::ReferenceDescription as BrowseReference;

// =============================================================================
// BrowseRequest
// =============================================================================

/// A traversal request: starting nodes plus filters and caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseRequest {
    /// Starting nodes, browsed in order. Empty means the standard Objects
    /// folder (`ns=0;i=85`).
    pub starting_nodes: Vec<NodeId>,

    /// Direction of traversal.
    #[serde(default)]
    pub direction: BrowseDirection,

    /// Reference type to follow (None = all references).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<NodeId>,

    /// Whether subtypes of the reference type are followed.
    #[serde(default = "default_true")]
    pub include_subtypes: bool,

    /// Node class mask (0 = all classes).
    #[serde(default)]
    pub node_class_mask: u32,

    /// Client-side cap on references per starting node (0 = unlimited).
    /// Exceeding it truncates the node's result and releases its
    /// continuation point.
    #[serde(default)]
    pub max_references_per_node: u32,

    /// Per-response page size hint passed to the server (0 = server
    /// default).
    #[serde(default)]
    pub page_size: u32,
}

fn default_true() -> bool {
    true
}

impl BrowseRequest {
    /// Creates a request for the given starting nodes with default filters.
    pub fn new(starting_nodes: Vec<NodeId>) -> Self {
        Self {
            starting_nodes,
            direction: BrowseDirection::Forward,
            reference_type: None,
            include_subtypes: true,
            node_class_mask: 0,
            max_references_per_node: 0,
            page_size: 0,
        }
    }

    /// Creates a request rooted at the standard Objects folder.
    pub fn default_root() -> Self {
        Self::new(vec![NodeId::OBJECTS_FOLDER])
    }

    /// Returns the starting nodes, substituting the Objects folder when the
    /// caller supplied none.
    pub fn effective_starting_nodes(&self) -> Vec<NodeId> {
        if self.starting_nodes.is_empty() {
            vec![NodeId::OBJECTS_FOLDER]
        } else {
            self.starting_nodes.clone()
        }
    }

    /// Sets the per-node reference cap.
    pub fn with_max_references_per_node(mut self, cap: u32) -> Self {
        self.max_references_per_node = cap;
        self
    }

    /// Sets the traversal direction.
    pub fn with_direction(mut self, direction: BrowseDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the node class mask.
    pub fn with_node_class_mask(mut self, mask: u32) -> Self {
        self.node_class_mask = mask;
        self
    }
}

impl Default for BrowseRequest {
    fn default() -> Self {
        Self::default_root()
    }
}

// =============================================================================
// NodeBrowseResult / BrowseOutcome
// =============================================================================

/// Aggregated result for one starting node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeBrowseResult {
    /// The starting node this result belongs to.
    pub starting_node: NodeId,

    /// Discovered references: server order within each page, pages in
    /// arrival order.
    pub references: Vec<BrowseReference>,

    /// `true` when the per-node cap cut the result short.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,

    /// Per-node status. Bad statuses mark this node failed while its
    /// siblings still carry data.
    #[serde(default, skip_serializing_if = "StatusCode::is_good")]
    pub status: StatusCode,
}

impl NodeBrowseResult {
    /// Returns `true` if this node's traversal succeeded.
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }
}

/// The complete result of one browse run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseOutcome {
    /// The endpoint URL browsed.
    pub endpoint: String,

    /// One sub-result per starting node, in request order.
    pub results: Vec<NodeBrowseResult>,
}

impl BrowseOutcome {
    /// Total references across all starting nodes.
    pub fn total_references(&self) -> usize {
        self.results.iter().map(|r| r.references.len()).sum()
    }

    /// Number of starting nodes that failed.
    pub fn failed_nodes(&self) -> usize {
        self.results.iter().filter(|r| !r.is_good()).count()
    }
}

// =============================================================================
// BrowseEngine
// =============================================================================

/// Per-node accumulator while the pagination loop runs.
struct NodeCursor {
    starting_node: NodeId,
    references: Vec<BrowseReference>,
    truncated: bool,
    status: StatusCode,
    continuation: Option<ContinuationPoint>,
}

impl NodeCursor {
    fn new(starting_node: NodeId) -> Self {
        Self {
            starting_node,
            references: Vec::new(),
            truncated: false,
            status: StatusCode::GOOD,
            continuation: None,
        }
    }

    /// Appends a page, applying the per-node cap. Returns a continuation
    /// point to release when the cap abandoned one.
    fn absorb(&mut self, item: BrowseResultItem, cap: u32) -> Option<ContinuationPoint> {
        self.references.extend(item.references);
        self.continuation = item.continuation_point;

        if cap > 0 && self.references.len() as u32 >= cap {
            if self.references.len() as u32 > cap || self.continuation.is_some() {
                self.truncated = self.references.len() as u32 > cap;
                self.references.truncate(cap as usize);
            }
            if let Some(point) = self.continuation.take() {
                self.truncated = true;
                return Some(point);
            }
        }
        None
    }

    fn into_result(self) -> NodeBrowseResult {
        NodeBrowseResult {
            starting_node: self.starting_node,
            references: self.references,
            truncated: self.truncated,
            status: self.status,
        }
    }
}

/// Drives Browse/BrowseNext traversals over an active session.
#[derive(Debug, Default)]
pub struct BrowseEngine;

impl BrowseEngine {
    /// Creates an engine.
    pub fn new() -> Self {
        Self
    }

    /// Browses all starting nodes of the request and pages each to
    /// completion (or to the per-node cap).
    pub async fn browse(
        &self,
        session: &Session,
        request: &BrowseRequest,
    ) -> ClientResult<BrowseOutcome> {
        let starting_nodes = request.effective_starting_nodes();
        let cap = request.max_references_per_node;

        debug!(
            endpoint = %session.endpoint_url(),
            nodes = starting_nodes.len(),
            cap,
            "starting browse"
        );

        let descriptions: Vec<BrowseDescription> = starting_nodes
            .iter()
            .map(|node| BrowseDescription {
                node_id: node.clone(),
                direction: request.direction,
                reference_type: request.reference_type.clone(),
                include_subtypes: request.include_subtypes,
                node_class_mask: request.node_class_mask,
            })
            .collect();

        let first = ServiceRequest::Browse {
            auth_token: session.auth_token(),
            nodes: descriptions,
            max_references_per_node: request.page_size,
        };
        let items = match session.send(first).await? {
            ServiceResponse::Browse { results } => results,
            ServiceResponse::Fault { status } => return Err(Self::fault_to_error(status).into()),
            _ => {
                return Err(BrowseError::UnexpectedResponse {
                    operation: "Browse",
                }
                .into())
            }
        };
        if items.len() != starting_nodes.len() {
            return Err(BrowseError::ResultCountMismatch {
                expected: starting_nodes.len(),
                actual: items.len(),
            }
            .into());
        }

        let mut cursors: Vec<NodeCursor> =
            starting_nodes.into_iter().map(NodeCursor::new).collect();
        let mut abandoned: Vec<ContinuationPoint> = Vec::new();

        for (cursor, item) in cursors.iter_mut().zip(items) {
            if item.status.is_bad() {
                trace!(node = %cursor.starting_node, status = %item.status, "node failed");
                cursor.status = item.status;
                continue;
            }
            if let Some(point) = cursor.absorb(item, cap) {
                abandoned.push(point);
            }
        }

        // Page every node that still holds a continuation point.
        let mut page = 1u32;
        loop {
            let pending: Vec<usize> = cursors
                .iter()
                .enumerate()
                .filter(|(_, c)| c.continuation.is_some())
                .map(|(i, _)| i)
                .collect();
            if pending.is_empty() {
                break;
            }

            let points: Vec<ContinuationPoint> = pending
                .iter()
                .filter_map(|&i| cursors[i].continuation.take())
                .collect();

            debug!(page, nodes = pending.len(), "fetching continuation page");

            let next = ServiceRequest::BrowseNext {
                auth_token: session.auth_token(),
                continuation_points: points,
                release_continuation_points: false,
            };
            let items = match session.send(next).await? {
                ServiceResponse::BrowseNext { results } => results,
                ServiceResponse::Fault { status } => {
                    return Err(Self::fault_to_error(status).into())
                }
                _ => {
                    return Err(BrowseError::UnexpectedResponse {
                        operation: "BrowseNext",
                    }
                    .into())
                }
            };
            if items.len() != pending.len() {
                return Err(BrowseError::ResultCountMismatch {
                    expected: pending.len(),
                    actual: items.len(),
                }
                .into());
            }

            for (&index, item) in pending.iter().zip(items) {
                let cursor = &mut cursors[index];
                if item.status == StatusCode::BAD_CONTINUATION_POINT_INVALID {
                    // The point belongs to another session or expired. The
                    // partial pages no longer describe one traversal
                    // generation, so the whole run fails.
                    return Err(BrowseError::bad_continuation(format!(
                        "rejected for node {} on page {page}",
                        cursor.starting_node
                    ))
                    .into());
                }
                if item.status.is_bad() {
                    warn!(node = %cursor.starting_node, status = %item.status, "pagination failed");
                    cursor.status = item.status;
                    continue;
                }
                if let Some(point) = cursor.absorb(item, cap) {
                    abandoned.push(point);
                }
            }
            page += 1;
        }

        if !abandoned.is_empty() {
            self.release_points(session, abandoned).await?;
        }

        let outcome = BrowseOutcome {
            endpoint: session.endpoint_url().to_owned(),
            results: cursors.into_iter().map(NodeCursor::into_result).collect(),
        };
        debug!(
            references = outcome.total_references(),
            failed = outcome.failed_nodes(),
            pages = page,
            "browse complete"
        );
        Ok(outcome)
    }

    /// Frees continuation points the cap abandoned.
    async fn release_points(
        &self,
        session: &Session,
        points: Vec<ContinuationPoint>,
    ) -> ClientResult<()> {
        debug!(count = points.len(), "releasing abandoned continuation points");
        let request = ServiceRequest::BrowseNext {
            auth_token: session.auth_token(),
            continuation_points: points,
            release_continuation_points: true,
        };
        match session.send(request).await? {
            ServiceResponse::BrowseNext { .. } => Ok(()),
            ServiceResponse::Fault { status } => {
                // The data already collected is still valid.
                warn!(%status, "continuation release faulted");
                Ok(())
            }
            _ => Err(BrowseError::UnexpectedResponse {
                operation: "BrowseNext",
            }
            .into()),
        }
    }

    fn fault_to_error(status: StatusCode) -> BrowseError {
        if status == StatusCode::BAD_CONTINUATION_POINT_INVALID {
            BrowseError::bad_continuation(status.to_string())
        } else {
            BrowseError::service_fault(status)
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
    fn test_empty_request_defaults_to_objects_folder() {
        let request = BrowseRequest::new(Vec::new());
        assert_eq!(
            request.effective_starting_nodes(),
            vec![NodeId::OBJECTS_FOLDER]
        );
        assert_eq!(BrowseRequest::default().starting_nodes, vec![NodeId::OBJECTS_FOLDER]);
    }

    #[test]
    fn test_cursor_cap_truncates_and_surrenders_point() {
        let reference = BrowseReference {
            node_id: NodeId::numeric(1, 100),
            browse_name: crate::types::QualifiedName::new(1, "Child"),
            display_name: "Child".to_owned(),
            node_class: crate::types::NodeClass::Object,
            reference_type: NodeId::numeric(0, 35),
            has_children: false,
        };

        let mut cursor = NodeCursor::new(NodeId::OBJECTS_FOLDER);
        let item = BrowseResultItem::good(vec![reference.clone(), reference.clone()])
            .with_continuation(ContinuationPoint::new(vec![1]));
        let released = cursor.absorb(item, 1);

        assert!(released.is_some());
        assert_eq!(cursor.references.len(), 1);
        assert!(cursor.truncated);
        assert!(cursor.continuation.is_none());
    }

    #[test]
    fn test_cursor_exact_cap_without_continuation_is_not_truncated() {
        let reference = BrowseReference {
            node_id: NodeId::numeric(1, 100),
            browse_name: crate::types::QualifiedName::new(1, "Child"),
            display_name: "Child".to_owned(),
            node_class: crate::types::NodeClass::Variable,
            reference_type: NodeId::numeric(0, 35),
            has_children: false,
        };

        let mut cursor = NodeCursor::new(NodeId::OBJECTS_FOLDER);
        let released = cursor.absorb(BrowseResultItem::good(vec![reference]), 1);

        assert!(released.is_none());
        assert!(!cursor.truncated);
        assert_eq!(cursor.references.len(), 1);
    }

    #[test]
    fn test_result_serialization_omits_good_status() {
        let result = NodeBrowseResult {
            starting_node: NodeId::OBJECTS_FOLDER,
            references: Vec::new(),
            truncated: false,
            status: StatusCode::GOOD,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("status").is_none());
        assert!(json.get("truncated").is_none());

        let result = NodeBrowseResult {
            status: StatusCode::BAD_NODE_ID_UNKNOWN,
            ..result
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], StatusCode::BAD_NODE_ID_UNKNOWN.0);
    }
}
