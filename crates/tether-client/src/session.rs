//! Session lifecycle and the initialize handshake.
//!
//! A [`Session`] owns one transport connection for its whole life. Its
//! state is a tagged machine published through a watch channel:
//!
//! ```text
//! Disconnected --connect()--> Connecting --transport up--> Initializing
//!     Initializing --handshake ack--> Ready
//!     Ready --close()--> Closing --> Disconnected
//!     any --unrecoverable error--> Failed
//! ```
//!
//! Only the first of several concurrent `connect()` callers drives the
//! handshake; the rest attach to the in-flight attempt through the watch
//! channel and share its outcome. A fresh connection always means a fresh
//! transport adapter; requests pending on a dead connection are resolved
//! with `SessionClosed`, never migrated.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tether_protocol::types::{CapabilitySet, Implementation, InitializeResult};
use tether_protocol::{PROTOCOL_VERSION, methods};
use tether_transport::{Endpoint, Transport, TransportError};

use crate::config::ServerConfig;
use crate::dispatcher::RequestDispatcher;
use crate::error::{DispatchError, SessionError};

/// Lifecycle state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; `connect()` may be called.
    Disconnected,
    /// Transport connection in progress.
    Connecting,
    /// Transport up; initialize handshake in flight.
    Initializing,
    /// Handshake acknowledged; discovery and calls are allowed.
    Ready,
    /// `close()` in progress.
    Closing,
    /// Unrecoverable failure; terminal for this session instance.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Closing => write!(f, "closing"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Shared, watchable session state.
///
/// The dispatcher's reader task holds a reference so a transport death can
/// fail the session without going through any caller.
pub(crate) struct StateCell {
    tx: watch::Sender<SessionState>,
}

impl StateCell {
    pub(crate) fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(SessionState::Disconnected);
        Arc::new(Self { tx })
    }

    pub(crate) fn get(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub(crate) fn set(&self, state: SessionState) {
        self.tx.send_replace(state);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Move to `Failed` from any live state. A session already Closing,
    /// Disconnected, or Failed keeps its state; close owns its own exit.
    pub(crate) fn fail(&self, reason: &str) -> bool {
        self.tx.send_if_modified(|state| match state {
            SessionState::Connecting | SessionState::Initializing | SessionState::Ready => {
                *state = SessionState::Failed {
                    reason: reason.to_string(),
                };
                true
            }
            _ => false,
        })
    }

    /// Move to `Closing` if there is anything to close.
    fn begin_close(&self) -> bool {
        self.tx.send_if_modified(|state| match state {
            SessionState::Connecting | SessionState::Initializing | SessionState::Ready => {
                *state = SessionState::Closing;
                true
            }
            _ => false,
        })
    }
}

/// Where fresh transport adapters come from on each connect attempt.
enum TransportSource {
    /// Build from the configured endpoint.
    Endpoint(Endpoint),
    /// Hand out pre-built transports, one per attempt.
    Provided(StdMutex<VecDeque<Arc<dyn Transport>>>),
}

impl TransportSource {
    fn acquire(&self) -> Result<Arc<dyn Transport>, SessionError> {
        match self {
            Self::Endpoint(endpoint) => Ok(endpoint.transport()),
            Self::Provided(queue) => queue
                .lock()
                .expect("transport queue mutex poisoned")
                .pop_front()
                .ok_or_else(|| {
                    SessionError::Transport(TransportError::ConnectFailed(
                        "no transport available for this attempt".into(),
                    ))
                }),
        }
    }
}

/// The live connection: dispatcher plus the transport it reads.
struct SessionLink {
    dispatcher: Arc<RequestDispatcher>,
    transport: Arc<dyn Transport>,
}

/// What the handshake produced.
struct HandshakeInfo {
    server_info: Implementation,
    negotiated: CapabilitySet,
}

/// One protocol-level connection lifecycle, handshake to close.
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    config: ServerConfig,
    source: TransportSource,
    state: Arc<StateCell>,
    /// Serializes connect attempts; losers of the race wait on the watch
    /// channel instead.
    connect_gate: tokio::sync::Mutex<()>,
    link: StdMutex<Option<SessionLink>>,
    handshake: StdMutex<Option<HandshakeInfo>>,
    last_error: StdMutex<Option<SessionError>>,
    /// Request id counter shared across connect attempts: an id is never
    /// reused within this session's lifetime.
    next_id: Arc<AtomicU64>,
}

impl Session {
    /// Create a session that connects through the configured endpoint.
    pub fn new(config: ServerConfig) -> Self {
        let source = TransportSource::Endpoint(config.endpoint.clone());
        Self::with_source(config, source)
    }

    /// Create a session over a pre-built transport. Useful for in-process
    /// servers and tests; handshake retries need one transport per attempt,
    /// see [`Session::with_transports`].
    pub fn with_transport(transport: Arc<dyn Transport>, config: ServerConfig) -> Self {
        Self::with_transports(vec![transport], config)
    }

    /// Create a session over a queue of pre-built transports, consumed one
    /// per connect attempt.
    pub fn with_transports(transports: Vec<Arc<dyn Transport>>, config: ServerConfig) -> Self {
        let source = TransportSource::Provided(StdMutex::new(transports.into()));
        Self::with_source(config, source)
    }

    fn with_source(config: ServerConfig, source: TransportSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            config,
            source,
            state: StateCell::new(),
            connect_gate: tokio::sync::Mutex::new(()),
            link: StdMutex::new(None),
            handshake: StdMutex::new(None),
            last_error: StdMutex::new(None),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Unique id of this session instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When this session instance was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Identity the server reported in the handshake, once Ready.
    pub fn server_info(&self) -> Option<Implementation> {
        self.handshake
            .lock()
            .expect("handshake mutex poisoned")
            .as_ref()
            .map(|h| h.server_info.clone())
    }

    /// Capability families both sides agreed on, once Ready.
    pub fn capabilities(&self) -> Option<CapabilitySet> {
        self.handshake
            .lock()
            .expect("handshake mutex poisoned")
            .as_ref()
            .map(|h| h.negotiated)
    }

    /// The configured per-request deadline.
    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    /// Establish the connection and run the initialize handshake.
    ///
    /// Idempotent on a Ready session. When several callers race, exactly
    /// one handshake is issued; the others attach to it and receive its
    /// eventual result. A Failed session stays failed: reconnecting means
    /// constructing a new `Session`.
    pub async fn connect(&self) -> Result<(), SessionError> {
        loop {
            let mut rx = self.state.subscribe();
            let current = rx.borrow_and_update().clone();
            match current {
                SessionState::Ready => return Ok(()),
                SessionState::Failed { reason } => match self.connect_gate.try_lock() {
                    // No driver holds the gate: the failure is settled.
                    Ok(_gate) => return Err(self.stored_error(&reason)),
                    // A driver is mid-retry; this Failed is transient, so
                    // wait for the attempt's eventual outcome.
                    Err(_) => {
                        if rx.changed().await.is_err() {
                            return Err(SessionError::Closed);
                        }
                    }
                },
                SessionState::Connecting | SessionState::Initializing | SessionState::Closing => {
                    if rx.changed().await.is_err() {
                        return Err(SessionError::Closed);
                    }
                }
                SessionState::Disconnected => match self.connect_gate.try_lock() {
                    Ok(_gate) => {
                        if self.state.get() != SessionState::Disconnected {
                            continue;
                        }
                        return self.drive_connect().await;
                    }
                    // Another caller is driving; wait for its outcome.
                    Err(_) => {
                        let _ = rx.changed().await;
                    }
                },
            }
        }
    }

    /// Close the session. Idempotent: closing an already closed, failed,
    /// or disconnected session is a no-op success.
    pub async fn close(&self) -> Result<(), SessionError> {
        if !self.state.begin_close() {
            return Ok(());
        }
        info!(session = %self.id, "closing session");
        self.teardown_link().await;
        self.state.set(SessionState::Disconnected);
        Ok(())
    }

    /// The live dispatcher, available only while Ready.
    pub(crate) fn dispatcher(&self) -> Result<Arc<RequestDispatcher>, SessionError> {
        let state = self.state.get();
        if state != SessionState::Ready {
            return Err(SessionError::NotReady { state });
        }
        self.link
            .lock()
            .expect("link mutex poisoned")
            .as_ref()
            .map(|link| Arc::clone(&link.dispatcher))
            .ok_or(SessionError::Closed)
    }

    fn stored_error(&self, reason: &str) -> SessionError {
        self.last_error
            .lock()
            .expect("last_error mutex poisoned")
            .clone()
            .unwrap_or_else(|| SessionError::HandshakeRejected(reason.to_string()))
    }

    /// Run the bounded-retry connect loop. Caller holds the connect gate.
    ///
    /// The guard keeps abandonment safe: if the driving caller's future is
    /// dropped mid-handshake, the session settles in `Failed` and attached
    /// waiters wake, instead of idling in `Connecting` forever.
    async fn drive_connect(&self) -> Result<(), SessionError> {
        let mut guard = ConnectGuard {
            session: self,
            armed: true,
        };
        let outcome = guard.session.drive_connect_inner().await;
        guard.armed = false;
        outcome
    }

    async fn drive_connect_inner(&self) -> Result<(), SessionError> {
        let mut attempt: u32 = 0;
        loop {
            self.state.set(SessionState::Connecting);
            let outcome =
                tokio::time::timeout(self.config.connect_timeout, self.attempt_handshake()).await;
            let err = match outcome {
                Ok(Ok(())) => {
                    self.state.set(SessionState::Ready);
                    info!(
                        session = %self.id,
                        server = ?self.server_info().map(|s| s.name),
                        "session ready"
                    );
                    return Ok(());
                }
                Ok(Err(e)) => e,
                Err(_) => SessionError::InitTimeout(self.config.connect_timeout),
            };
            self.teardown_link().await;

            if attempt >= self.config.handshake_retries {
                warn!(session = %self.id, error = %err, "connect failed");
                *self.last_error.lock().expect("last_error mutex poisoned") = Some(err.clone());
                // Published unconditionally so every attached waiter wakes,
                // even when the reader already failed the state.
                self.state.set(SessionState::Failed {
                    reason: err.to_string(),
                });
                return Err(err);
            }
            attempt += 1;
            let delay = self.config.retry_delay(attempt);
            debug!(session = %self.id, attempt, ?delay, error = %err, "retrying handshake");
            tokio::time::sleep(delay).await;

            // A concurrent close() aborts the retry loop.
            match self.state.get() {
                SessionState::Closing | SessionState::Disconnected => {
                    return Err(SessionError::Closed);
                }
                _ => {}
            }
        }
    }

    /// One connect-plus-handshake attempt over a fresh transport.
    async fn attempt_handshake(&self) -> Result<(), SessionError> {
        let transport = self.source.acquire()?;
        transport.connect().await?;

        let dispatcher = RequestDispatcher::spawn(
            Arc::clone(&transport),
            Arc::clone(&self.state),
            Arc::clone(&self.next_id),
        );
        *self.link.lock().expect("link mutex poisoned") = Some(SessionLink {
            dispatcher: Arc::clone(&dispatcher),
            transport,
        });
        self.state.set(SessionState::Initializing);

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": self.config.identity,
            "capabilities": self.config.capabilities,
        });
        let result: InitializeResult = dispatcher
            .dispatch_typed(methods::INITIALIZE, Some(params), self.config.connect_timeout)
            .await
            .map_err(|e| match e {
                DispatchError::Remote { message, .. } => SessionError::HandshakeRejected(message),
                DispatchError::Malformed(m) => {
                    SessionError::HandshakeRejected(format!("bad initialize result: {m}"))
                }
                DispatchError::Timeout(t) => SessionError::InitTimeout(t),
                DispatchError::Cancelled | DispatchError::SessionClosed => {
                    SessionError::Transport(TransportError::Closed)
                }
            })?;

        if result.protocol_version != PROTOCOL_VERSION {
            debug!(
                ours = PROTOCOL_VERSION,
                theirs = %result.protocol_version,
                "protocol revision differs; continuing"
            );
        }

        let negotiated = CapabilitySet::negotiate(&self.config.capabilities, &result.capabilities);
        dispatcher.notify(methods::INITIALIZED, None).await?;

        *self.handshake.lock().expect("handshake mutex poisoned") = Some(HandshakeInfo {
            server_info: result.server_info,
            negotiated,
        });
        Ok(())
    }

    /// Stop the reader, drain pending requests, drop the transport.
    async fn teardown_link(&self) {
        let link = self.link.lock().expect("link mutex poisoned").take();
        if let Some(link) = link {
            link.dispatcher.shutdown();
            link.dispatcher.fail_all();
            let _ = link.transport.disconnect().await;
        }
    }
}

/// Settles the state machine when a `connect` driver is dropped mid-flight.
struct ConnectGuard<'a> {
    session: &'a Session,
    armed: bool,
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(link) = self
            .session
            .link
            .lock()
            .expect("link mutex poisoned")
            .take()
        {
            link.dispatcher.shutdown();
            link.dispatcher.fail_all();
        }
        *self
            .session
            .last_error
            .lock()
            .expect("last_error mutex poisoned") = Some(SessionError::Closed);
        self.session.state.set(SessionState::Failed {
            reason: "connect abandoned by caller".into(),
        });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Stop the reader task; without this it would idle on the transport
        // until the peer hangs up.
        if let Some(link) = self.link.lock().expect("link mutex poisoned").take() {
            link.dispatcher.shutdown();
            link.dispatcher.fail_all();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("endpoint", &self.config.endpoint.to_string())
            .finish_non_exhaustive()
    }
}
