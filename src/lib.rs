// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session and browse-traversal engine.
//!
//! Connects to an OPC UA endpoint, opens and activates a session, browses
//! one or more starting nodes, pages through continuation points, and
//! returns the discovered references. Binary wire encoding and security
//! negotiation live below the [`ServerConnector`] seam; this crate owns
//! everything above it:
//!
//! ```text
//! BrowseCoordinator        run state machine, status events, cancellation
//!   └── SessionManager     connect → create → activate, retry/backoff
//!         └── Session      one activated session on one channel
//!               └── TransportChannel   request correlation + timeouts
//!                     └── ServerConnector (trait)   the outside world
//! BrowseEngine             Browse/BrowseNext pagination over a Session
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use opcua_browse::browse::BrowseRequest;
//! use opcua_browse::types::{EndpointDescriptor, NodeId};
//!
//! let endpoint = EndpointDescriptor::builder()
//!     .url("opc.tcp://localhost:4840")
//!     .application_name("browser")
//!     .request_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! let root: NodeId = "ns=0;i=85".parse().unwrap();
//! let request = BrowseRequest::new(vec![root]).with_max_references_per_node(1000);
//! # let _ = (endpoint, request);
//! ```
//!
//! A run is then `coordinator.run(&endpoint, &request).await`, where the
//! coordinator is built over a [`ServerConnector`] implementation.
//!
//! # Guarantees
//!
//! - A continuation point is scoped to one session; replaying it elsewhere
//!   fails deterministically, it never returns another session's data.
//! - A [`BrowseOutcome`] reflects exactly one traversal generation: losing
//!   the session mid-pagination fails the run instead of mixing pages.
//! - Every run closes the session it opened, on success, failure, or
//!   cancellation.

pub mod browse;
pub mod channel;
pub mod coordinator;
pub mod error;
pub mod service;
pub mod session;
pub mod types;

pub use browse::{BrowseEngine, BrowseOutcome, BrowseReference, BrowseRequest, NodeBrowseResult};
pub use channel::{ChannelState, ServerConnector, ServerLink, TransportChannel};
pub use coordinator::{BrowseCoordinator, BusyPolicy, RunState, StatusEvent};
pub use error::{ClientError, ClientResult};
pub use service::{AuthToken, ContinuationPoint, StatusCode};
pub use session::{RetryPolicy, Session, SessionManager, SessionState};
pub use types::{
    BrowseDirection, EndpointDescriptor, NodeClass, NodeId, QualifiedName, SecurityMode,
    SecurityPolicy, UserIdentity,
};
