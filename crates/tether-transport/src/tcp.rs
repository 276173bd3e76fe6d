//! TCP transport: newline-delimited JSON frames over one TCP stream.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::traits::Transport;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 64;

/// Client-side TCP transport.
///
/// `connect` opens the stream and hands it to a background I/O task that
/// owns both halves of the framed connection. Outbound frames are queued to
/// that task; inbound lines are forwarded to the receive channel. When the
/// peer closes or a read/write fails, the task exits and the receive
/// sequence ends.
#[derive(Debug)]
pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
    outbound: StdMutex<Option<mpsc::Sender<String>>>,
    inbound: tokio::sync::Mutex<Option<mpsc::Receiver<TransportResult<Bytes>>>>,
}

impl TcpTransport {
    /// Create an unconnected transport targeting `host:port`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            outbound: StdMutex::new(None),
            inbound: tokio::sync::Mutex::new(None),
        }
    }

    /// Override the socket connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    async fn connect(&self) -> TransportResult<()> {
        if self.outbound.lock().expect("outbound mutex poisoned").is_some() {
            return Err(TransportError::ConnectFailed(
                "transport already connected".into(),
            ));
        }

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| {
                TransportError::ConnectFailed(format!("connect to {} failed: {e}", self.addr))
            })?;

        debug!(addr = %self.addr, "tcp transport connected");

        let framed = Framed::new(
            stream,
            LinesCodec::new_with_max_length(tether_protocol::MAX_FRAME_SIZE),
        );
        let (mut sink, mut source) = framed.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<TransportResult<Bytes>>(CHANNEL_CAPACITY);

        let addr = self.addr.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => match frame {
                        Some(line) => {
                            if let Err(e) = sink.send(line).await {
                                warn!(addr = %addr, error = %e, "tcp write failed");
                                let _ = inbound_tx
                                    .send(Err(TransportError::WriteFailed(e.to_string())))
                                    .await;
                                break;
                            }
                        }
                        // disconnect() dropped the sender
                        None => break,
                    },
                    frame = source.next() => match frame {
                        Some(Ok(line)) => {
                            if inbound_tx.send(Ok(Bytes::from(line))).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(addr = %addr, error = %e, "tcp read failed");
                            let _ = inbound_tx
                                .send(Err(TransportError::ReadFailed(e.to_string())))
                                .await;
                            break;
                        }
                        None => break,
                    },
                }
            }
            debug!(addr = %addr, "tcp i/o task finished");
        });

        *self.outbound.lock().expect("outbound mutex poisoned") = Some(outbound_tx);
        *self.inbound.lock().await = Some(inbound_rx);
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        // Dropping the outbound sender stops the I/O task, which in turn
        // ends the receive sequence.
        self.outbound.lock().expect("outbound mutex poisoned").take();
        Ok(())
    }

    async fn send(&self, frame: Bytes) -> TransportResult<()> {
        let sender = self
            .outbound
            .lock()
            .expect("outbound mutex poisoned")
            .clone()
            .ok_or(TransportError::Closed)?;
        let line = String::from_utf8(frame.to_vec())
            .map_err(|e| TransportError::WriteFailed(format!("non-utf8 frame: {e}")))?;
        sender.send(line).await.map_err(|_| TransportError::Closed)
    }

    async fn receive(&self) -> Option<TransportResult<Bytes>> {
        let mut guard = self.inbound.lock().await;
        match guard.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}
