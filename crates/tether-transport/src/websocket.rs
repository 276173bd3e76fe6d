//! WebSocket transport: one text frame per message, TLS via rustls.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::{debug, warn};
use url::Url;

use crate::error::{TransportError, TransportResult};
use crate::traits::Transport;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 64;

/// Client-side WebSocket transport.
///
/// `wss://` endpoints negotiate TLS through rustls with native roots; a
/// failed negotiation surfaces as [`TransportError::Tls`]. Pings from the
/// server are answered inline by the I/O task; close frames end the
/// receive sequence.
#[derive(Debug)]
pub struct WebSocketTransport {
    url: Url,
    connect_timeout: Duration,
    outbound: StdMutex<Option<mpsc::Sender<String>>>,
    inbound: tokio::sync::Mutex<Option<mpsc::Receiver<TransportResult<Bytes>>>>,
}

impl WebSocketTransport {
    /// Create an unconnected transport targeting a `ws://` or `wss://` URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            outbound: StdMutex::new(None),
            inbound: tokio::sync::Mutex::new(None),
        }
    }

    /// Override the handshake timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

fn connect_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Tls(e) => TransportError::Tls(e.to_string()),
        tungstenite::Error::Url(e) => TransportError::InvalidEndpoint(e.to_string()),
        other => TransportError::ConnectFailed(other.to_string()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn endpoint(&self) -> String {
        self.url.to_string()
    }

    async fn connect(&self) -> TransportResult<()> {
        if self.outbound.lock().expect("outbound mutex poisoned").is_some() {
            return Err(TransportError::ConnectFailed(
                "transport already connected".into(),
            ));
        }

        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| TransportError::Timeout(self.connect_timeout))?
                .map_err(connect_error)?;

        debug!(url = %self.url, "websocket transport connected");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<TransportResult<Bytes>>(CHANNEL_CAPACITY);

        let url = self.url.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => match frame {
                        Some(line) => {
                            if let Err(e) = sink.send(tungstenite::Message::Text(line.into())).await {
                                warn!(url = %url, error = %e, "websocket write failed");
                                let _ = inbound_tx
                                    .send(Err(TransportError::WriteFailed(e.to_string())))
                                    .await;
                                break;
                            }
                        }
                        None => break,
                    },
                    frame = source.next() => match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            let payload = Bytes::from(text.as_str().to_owned());
                            if payload.len() > tether_protocol::MAX_FRAME_SIZE {
                                warn!(url = %url, size = payload.len(), "oversized frame dropped");
                                continue;
                            }
                            if inbound_tx.send(Ok(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(tungstenite::Message::Binary(payload))) => {
                            if inbound_tx.send(Ok(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(tungstenite::Message::Ping(payload))) => {
                            if sink.send(tungstenite::Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(tungstenite::Message::Pong(_))) => {}
                        Some(Ok(tungstenite::Message::Close(_))) | None => break,
                        Some(Ok(tungstenite::Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            warn!(url = %url, error = %e, "websocket read failed");
                            let _ = inbound_tx
                                .send(Err(TransportError::ReadFailed(e.to_string())))
                                .await;
                            break;
                        }
                    },
                }
            }
            debug!(url = %url, "websocket i/o task finished");
        });

        *self.outbound.lock().expect("outbound mutex poisoned") = Some(outbound_tx);
        *self.inbound.lock().await = Some(inbound_rx);
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
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
