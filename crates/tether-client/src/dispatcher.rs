//! Request dispatcher: correlates outbound calls with inbound frames.
//!
//! The dispatcher is the single consumer of `Transport::receive()`. A
//! background reader task drains the transport and resolves waiting calls
//! through oneshot completion handles stored in a table keyed by request
//! id. Responses may arrive in any order; correlation is strictly by id,
//! never by send order.
//!
//! Every pending request resolves exactly once: with its response, with
//! `Timeout` at its own deadline, with `Cancelled`, or with `SessionClosed`
//! when the transport dies. The table is drained on failure; nothing is
//! left pending indefinitely.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{Notify, oneshot};
use tracing::{debug, trace, warn};

use tether_protocol::jsonrpc::{
    InboundFrame, JsonRpcNotification, JsonRpcRequest, RequestId, ResponsePayload,
};
use tether_protocol::methods;
use tether_transport::Transport;

use crate::error::DispatchError;
use crate::session::StateCell;

type PendingSlot = oneshot::Sender<Result<Value, DispatchError>>;

struct PendingTable {
    slots: HashMap<u64, PendingSlot>,
    /// Set once the session is done; new dispatches are rejected.
    closed: bool,
}

pub(crate) struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    state: Arc<StateCell>,
    pending: StdMutex<PendingTable>,
    /// Owned by the session, shared across its connect attempts, so an id
    /// is never reused within one session's lifetime.
    next_id: Arc<AtomicU64>,
    shutdown: Notify,
}

impl RequestDispatcher {
    /// Create a dispatcher over `transport` and start its reader task.
    pub(crate) fn spawn(
        transport: Arc<dyn Transport>,
        state: Arc<StateCell>,
        next_id: Arc<AtomicU64>,
    ) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            transport,
            state,
            pending: StdMutex::new(PendingTable {
                slots: HashMap::new(),
                closed: false,
            }),
            next_id,
            shutdown: Notify::new(),
        });
        Self::spawn_reader(Arc::clone(&dispatcher));
        dispatcher
    }

    /// Send `method` and await the correlated response within `timeout`.
    pub(crate) async fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, DispatchError> {
        let (id, receiver) = {
            let mut table = self.pending.lock().expect("pending mutex poisoned");
            if table.closed {
                return Err(DispatchError::SessionClosed);
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            table.slots.insert(id, tx);
            (id, rx)
        };
        // Cleans the table entry on every exit path that leaves the
        // request unresolved: per-request timeout and caller abandonment.
        let _guard = PendingGuard {
            dispatcher: self,
            id,
        };

        let request = JsonRpcRequest::new(RequestId(id), method, params);
        let payload = serde_json::to_vec(&request)
            .map_err(|e| DispatchError::Malformed(format!("serialize {method} request: {e}")))?;

        trace!(id, method, "dispatching request");
        if let Err(e) = self.transport.send(Bytes::from(payload)).await {
            warn!(id, method, error = %e, "send failed; failing session");
            self.state.fail(&e.to_string());
            self.fail_all();
            return Err(DispatchError::SessionClosed);
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without a resolution: the table was drained.
            Ok(Err(_)) => Err(DispatchError::SessionClosed),
            Err(_) => Err(DispatchError::Timeout(timeout)),
        }
    }

    /// Dispatch and deserialize the result into `R`.
    pub(crate) async fn dispatch_typed<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<R, DispatchError> {
        let value = self.dispatch(method, params, timeout).await?;
        serde_json::from_value(value)
            .map_err(|e| DispatchError::Malformed(format!("{method} result: {e}")))
    }

    /// Fire a notification; no response is expected or awaited.
    pub(crate) async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), tether_transport::TransportError> {
        let notification = JsonRpcNotification::new(method, params);
        let payload = serde_json::to_vec(&notification).map_err(|e| {
            tether_transport::TransportError::WriteFailed(format!(
                "serialize {method} notification: {e}"
            ))
        })?;
        self.transport.send(Bytes::from(payload)).await
    }

    /// Resolve one pending request with `Cancelled` and tell the server,
    /// best-effort, without waiting on any acknowledgment.
    pub(crate) fn cancel(&self, id: u64) -> bool {
        let slot = self
            .pending
            .lock()
            .expect("pending mutex poisoned")
            .slots
            .remove(&id);
        match slot {
            Some(tx) => {
                let _ = tx.send(Err(DispatchError::Cancelled));
                self.notify_cancelled(id, "cancelled by caller");
                true
            }
            None => false,
        }
    }

    /// Resolve every outstanding request with `SessionClosed` and refuse
    /// new dispatches.
    pub(crate) fn fail_all(&self) {
        let drained = {
            let mut table = self.pending.lock().expect("pending mutex poisoned");
            table.closed = true;
            table.slots.drain().collect::<Vec<_>>()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "failing outstanding requests");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(DispatchError::SessionClosed));
        }
    }

    /// Stop the reader task.
    pub(crate) fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    fn notify_cancelled(&self, id: u64, reason: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        let notification =
            JsonRpcNotification::new(methods::CANCELLED, Some(json!({ "requestId": id, "reason": reason })));
        handle.spawn(async move {
            if let Ok(payload) = serde_json::to_vec(&notification) {
                let _ = transport.send(Bytes::from(payload)).await;
            }
        });
    }

    fn spawn_reader(dispatcher: Arc<Self>) {
        tokio::spawn(async move {
            debug!(endpoint = %dispatcher.transport.endpoint(), "reader task started");
            loop {
                tokio::select! {
                    _ = dispatcher.shutdown.notified() => break,
                    frame = dispatcher.transport.receive() => match frame {
                        Some(Ok(bytes)) => dispatcher.route(&bytes),
                        Some(Err(e)) => {
                            warn!(error = %e, "transport failed; draining pending requests");
                            dispatcher.state.fail(&e.to_string());
                            dispatcher.fail_all();
                            break;
                        }
                        None => {
                            dispatcher.state.fail("transport closed by peer");
                            dispatcher.fail_all();
                            break;
                        }
                    },
                }
            }
            debug!("reader task finished");
        });
    }

    fn route(&self, bytes: &[u8]) {
        match serde_json::from_slice::<InboundFrame>(bytes) {
            Ok(InboundFrame::Response(response)) => {
                let Some(RequestId(id)) = response.id else {
                    warn!("response with null id dropped");
                    return;
                };
                let slot = self
                    .pending
                    .lock()
                    .expect("pending mutex poisoned")
                    .slots
                    .remove(&id);
                let Some(tx) = slot else {
                    warn!(id, "response for unknown or expired request");
                    return;
                };
                let outcome = match response.payload {
                    ResponsePayload::Success { result } => Ok(result),
                    ResponsePayload::Error { error } => Err(DispatchError::Remote {
                        code: error.code,
                        message: error.message,
                    }),
                };
                trace!(id, "response routed");
                // The receiver may be gone already (timed out); that is its
                // resolution, not ours to report.
                let _ = tx.send(outcome);
            }
            Ok(InboundFrame::Notification(notification)) => {
                debug!(method = %notification.method, "server notification ignored");
            }
            Err(e) => {
                warn!(error = %e, "undecodable frame dropped");
            }
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending mutex poisoned").slots.len()
    }
}

/// Removes a still-unresolved table entry when a `dispatch` future exits,
/// whether by per-request timeout or because the caller dropped it, and
/// fires a best-effort cancellation notice. A no-op when the request was
/// already resolved.
struct PendingGuard<'a> {
    dispatcher: &'a RequestDispatcher,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let removed = self
            .dispatcher
            .pending
            .lock()
            .expect("pending mutex poisoned")
            .slots
            .remove(&self.id)
            .is_some();
        if removed {
            self.dispatcher.notify_cancelled(self.id, "deadline exceeded or abandoned");
        }
    }
}
