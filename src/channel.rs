// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport channel with request/response correlation.
//!
//! A [`TransportChannel`] owns one logical connection obtained from a
//! [`ServerConnector`] and multiplexes service calls over it. Each request is
//! tagged with a monotonically increasing correlation id; a background reader
//! task matches responses back to their waiting callers. Responses whose id
//! has no pending entry (already timed out, or never issued) are dropped with
//! a warning.
//!
//! When the underlying link is lost, every in-flight request and every
//! subsequent [`send`](TransportChannel::send) fails with
//! [`ChannelError::ConnectionLost`] until a new channel is opened. `close()`
//! is idempotent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{ChannelError, ClientResult, ConnectError, TimeoutError};
use crate::service::{ServiceRequest, ServiceResponse, TransportRequest, TransportResponse};
use crate::types::EndpointDescriptor;

// =============================================================================
// ServerConnector
// =============================================================================

/// Buffer depth of the request/response queues of a [`ServerLink`].
pub const LINK_QUEUE_DEPTH: usize = 64;

/// A bidirectional message link to a server.
///
/// Dropping either half models losing the connection: the channel observes
/// the closed queue and fails all pending requests.
pub struct ServerLink {
    /// Requests travel toward the server on this queue.
    pub requests: mpsc::Sender<TransportRequest>,

    /// Responses arrive from the server on this queue.
    pub responses: mpsc::Receiver<TransportResponse>,
}

/// Establishes transport connections to OPC UA endpoints.
///
/// This is the seam between the engine and the outside world: production
/// connectors dial a real socket, tests hand back an in-memory link to a
/// simulated server.
#[async_trait]
pub trait ServerConnector: Send + Sync {
    /// Connects to the endpoint and returns a live link.
    ///
    /// Implementations report refusal, unreachability, and security-policy
    /// rejection through [`ConnectError`]; the caller applies the endpoint's
    /// connect timeout around this call.
    async fn connect(&self, endpoint: &EndpointDescriptor) -> ClientResult<ServerLink>;
}

// =============================================================================
// ChannelState
// =============================================================================

/// Observable lifecycle state of a transport channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// The connector is being dialed.
    Connecting,

    /// The link is live and accepting requests.
    Open,

    /// The channel was closed locally.
    Closed,

    /// The underlying link was lost.
    Failed,
}

impl ChannelState {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

// =============================================================================
// ChannelStats
// =============================================================================

/// Channel counters for observability.
#[derive(Debug, Default)]
pub struct ChannelStats {
    requests_sent: AtomicU64,
    responses_matched: AtomicU64,
    responses_dropped: AtomicU64,
    timeouts: AtomicU64,
}

impl ChannelStats {
    /// Total requests submitted to the link.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Responses successfully matched to a pending request.
    pub fn responses_matched(&self) -> u64 {
        self.responses_matched.load(Ordering::Relaxed)
    }

    /// Responses dropped because no pending request matched their id.
    pub fn responses_dropped(&self) -> u64 {
        self.responses_dropped.load(Ordering::Relaxed)
    }

    /// Requests that expired before their response arrived.
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }
}

// =============================================================================
// TransportChannel
// =============================================================================

/// Pending-response slots keyed by correlation id.
type PendingMap = Arc<Mutex<HashMap<u32, oneshot::Sender<ServiceResponse>>>>;

/// One logical connection to a server with correlated request/response
/// exchange.
pub struct TransportChannel {
    endpoint_url: String,
    request_timeout: Duration,
    requests: mpsc::Sender<TransportRequest>,
    pending: PendingMap,
    state: Arc<Mutex<ChannelState>>,
    stats: Arc<ChannelStats>,
    next_request_id: AtomicU32,
    reader: JoinHandle<()>,
}

impl TransportChannel {
    /// Opens a channel to the endpoint through the connector.
    ///
    /// The endpoint's `connect_timeout` bounds the dial; elapsing it yields
    /// [`ConnectError::Timeout`].
    pub async fn open(
        connector: &dyn ServerConnector,
        endpoint: &EndpointDescriptor,
    ) -> ClientResult<TransportChannel> {
        debug!(endpoint = %endpoint.url, "opening transport channel");

        let link = match tokio::time::timeout(endpoint.connect_timeout, connector.connect(endpoint))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectError::timeout(&endpoint.url, endpoint.connect_timeout).into())
            }
        };

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let state = Arc::new(Mutex::new(ChannelState::Open));
        let stats = Arc::new(ChannelStats::default());

        let reader = tokio::spawn(Self::reader_loop(
            endpoint.url.clone(),
            link.responses,
            Arc::clone(&pending),
            Arc::clone(&state),
            Arc::clone(&stats),
        ));

        info!(endpoint = %endpoint.url, "transport channel open");

        Ok(TransportChannel {
            endpoint_url: endpoint.url.clone(),
            request_timeout: endpoint.request_timeout,
            requests: link.requests,
            pending,
            state,
            stats,
            next_request_id: AtomicU32::new(1),
            reader,
        })
    }

    /// Matches incoming responses to pending requests until the link drops.
    async fn reader_loop(
        endpoint_url: String,
        mut responses: mpsc::Receiver<TransportResponse>,
        pending: PendingMap,
        state: Arc<Mutex<ChannelState>>,
        stats: Arc<ChannelStats>,
    ) {
        while let Some(response) = responses.recv().await {
            let waiter = {
                let mut map = pending.lock().unwrap_or_else(|e| e.into_inner());
                map.remove(&response.request_id)
            };

            match waiter {
                Some(tx) => {
                    stats.responses_matched.fetch_add(1, Ordering::Relaxed);
                    trace!(request_id = response.request_id, "response matched");
                    // Receiver gone means the caller already timed out.
                    let _ = tx.send(response.body);
                }
                None => {
                    stats.responses_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        endpoint = %endpoint_url,
                        request_id = response.request_id,
                        "dropping response with no pending request"
                    );
                }
            }
        }

        // Link gone. Fail everything that is still waiting.
        {
            let mut current = state.lock().unwrap_or_else(|e| e.into_inner());
            if *current == ChannelState::Open {
                *current = ChannelState::Failed;
                warn!(endpoint = %endpoint_url, "transport link lost");
            }
        }
        let drained: Vec<_> = {
            let mut map = pending.lock().unwrap_or_else(|e| e.into_inner());
            map.drain().collect()
        };
        for (request_id, tx) in drained {
            trace!(request_id, "failing pending request after link loss");
            drop(tx);
        }
    }

    /// Sends a request and waits for its correlated response.
    ///
    /// Bounded by the endpoint's `request_timeout`; on expiry the pending
    /// slot is removed so a late response is dropped, not misdelivered.
    pub async fn send(&self, request: ServiceRequest) -> ClientResult<ServiceResponse> {
        match self.state() {
            ChannelState::Open => {}
            ChannelState::Failed => {
                return Err(ChannelError::connection_lost(&self.endpoint_url).into())
            }
            _ => return Err(ChannelError::NotConnected.into()),
        }

        let operation = request.service_name();
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        {
            let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            map.insert(request_id, tx);
        }

        trace!(request_id, operation, "sending request");

        let framed = TransportRequest {
            request_id,
            body: request,
        };
        if self.requests.send(framed).await.is_err() {
            self.remove_pending(request_id);
            self.mark_failed();
            return Err(ChannelError::connection_lost(&self.endpoint_url).into());
        }
        self.stats.requests_sent.fetch_add(1, Ordering::Relaxed);

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped: the reader drained pending after link loss.
            Ok(Err(_)) => Err(ChannelError::connection_lost(&self.endpoint_url).into()),
            Err(_) => {
                self.remove_pending(request_id);
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(request_id, operation, timeout = ?self.request_timeout, "request timed out");
                Err(TimeoutError::request(operation, self.request_timeout).into())
            }
        }
    }

    /// Closes the channel. Safe to call more than once.
    pub fn close(&self) {
        let was_open = {
            let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let was_open = *current == ChannelState::Open;
            if *current != ChannelState::Failed {
                *current = ChannelState::Closed;
            }
            was_open
        };
        self.reader.abort();
        let drained: Vec<_> = {
            let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            map.drain().collect()
        };
        drop(drained);
        if was_open {
            info!(endpoint = %self.endpoint_url, "transport channel closed");
        }
    }

    /// Returns the current channel state.
    pub fn state(&self) -> ChannelState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns `true` if the channel accepts requests.
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Returns the endpoint URL this channel is connected to.
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Returns the channel counters.
    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    fn remove_pending(&self, request_id: u32) {
        let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&request_id);
    }

    fn mark_failed(&self) {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *current == ChannelState::Open {
            *current = ChannelState::Failed;
        }
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel")
            .field("endpoint_url", &self.endpoint_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{AuthToken, StatusCode};

    /// Connector whose "server" echoes a fault for every request, optionally
    /// after a delay, and can misnumber responses.
    struct EchoConnector {
        delay: Duration,
        skew_ids: bool,
    }

    impl EchoConnector {
        fn new() -> Self {
            Self {
                delay: Duration::ZERO,
                skew_ids: false,
            }
        }
    }

    #[async_trait]
    impl ServerConnector for EchoConnector {
        async fn connect(&self, _endpoint: &EndpointDescriptor) -> ClientResult<ServerLink> {
            let (req_tx, mut req_rx) = mpsc::channel::<TransportRequest>(LINK_QUEUE_DEPTH);
            let (resp_tx, resp_rx) = mpsc::channel::<TransportResponse>(LINK_QUEUE_DEPTH);
            let delay = self.delay;
            let skew = self.skew_ids;
            tokio::spawn(async move {
                while let Some(request) = req_rx.recv().await {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let request_id = if skew {
                        request.request_id.wrapping_add(1000)
                    } else {
                        request.request_id
                    };
                    let response = TransportResponse {
                        request_id,
                        body: ServiceResponse::Fault {
                            status: StatusCode::GOOD,
                        },
                    };
                    if resp_tx.send(response).await.is_err() {
                        break;
                    }
                }
            });
            Ok(ServerLink {
                requests: req_tx,
                responses: resp_rx,
            })
        }
    }

    fn test_endpoint() -> EndpointDescriptor {
        let mut endpoint = EndpointDescriptor::new("opc.tcp://localhost:4840");
        endpoint.request_timeout = Duration::from_millis(200);
        endpoint.connect_timeout = Duration::from_millis(200);
        endpoint
    }

    fn close_request() -> ServiceRequest {
        ServiceRequest::CloseSession {
            auth_token: AuthToken::generate(),
        }
    }

    #[tokio::test]
    async fn test_send_correlates_response() {
        let connector = EchoConnector::new();
        let channel = TransportChannel::open(&connector, &test_endpoint())
            .await
            .unwrap();

        let response = channel.send(close_request()).await.unwrap();
        assert!(matches!(response, ServiceResponse::Fault { .. }));
        assert_eq!(channel.stats().responses_matched(), 1);
        assert_eq!(channel.stats().responses_dropped(), 0);
    }

    #[tokio::test]
    async fn test_unknown_correlation_id_is_dropped() {
        let connector = EchoConnector {
            delay: Duration::ZERO,
            skew_ids: true,
        };
        let channel = TransportChannel::open(&connector, &test_endpoint())
            .await
            .unwrap();

        let result = channel.send(close_request()).await;
        assert!(matches!(
            result,
            Err(crate::error::ClientError::Timeout(_))
        ));
        assert!(channel.stats().responses_dropped() >= 1);
    }

    #[tokio::test]
    async fn test_request_timeout_removes_pending_entry() {
        let connector = EchoConnector {
            delay: Duration::from_secs(5),
            skew_ids: false,
        };
        let channel = TransportChannel::open(&connector, &test_endpoint())
            .await
            .unwrap();

        let result = channel.send(close_request()).await;
        assert!(matches!(
            result,
            Err(crate::error::ClientError::Timeout(_))
        ));
        assert_eq!(channel.stats().timeouts(), 1);
        assert!(channel.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let connector = EchoConnector::new();
        let channel = TransportChannel::open(&connector, &test_endpoint())
            .await
            .unwrap();

        channel.close();
        channel.close();
        assert_eq!(channel.state(), ChannelState::Closed);

        let result = channel.send(close_request()).await;
        assert!(matches!(
            result,
            Err(crate::error::ClientError::Channel(ChannelError::NotConnected))
        ));
    }

    /// Connector that returns a link whose server half is dropped at once.
    struct DeadConnector;

    #[async_trait]
    impl ServerConnector for DeadConnector {
        async fn connect(&self, _endpoint: &EndpointDescriptor) -> ClientResult<ServerLink> {
            let (req_tx, _req_rx) = mpsc::channel(LINK_QUEUE_DEPTH);
            let (_resp_tx, resp_rx) = mpsc::channel(LINK_QUEUE_DEPTH);
            Ok(ServerLink {
                requests: req_tx,
                responses: resp_rx,
            })
        }
    }

    #[tokio::test]
    async fn test_link_loss_fails_sends_with_connection_lost() {
        let connector = DeadConnector;
        let channel = TransportChannel::open(&connector, &test_endpoint())
            .await
            .unwrap();

        // The reader observes the dropped server half and fails the channel.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(channel.state(), ChannelState::Failed);

        let result = channel.send(close_request()).await;
        assert!(matches!(
            result,
            Err(crate::error::ClientError::Channel(
                ChannelError::ConnectionLost { .. }
            ))
        ));
    }
}
