//! In-memory duplex transport pair.
//!
//! Backs the integration tests and any in-process embedding of a server.
//! Each side is a full [`Transport`]; frames written to one side arrive on
//! the other in order, with no framing or I/O involved.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex as StdMutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{TransportError, TransportResult};
use crate::traits::Transport;

const CHANNEL_CAPACITY: usize = 64;

/// One side of an in-memory transport pair.
#[derive(Debug)]
pub struct DuplexTransport {
    label: &'static str,
    outbound: StdMutex<Option<mpsc::Sender<Bytes>>>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    /// Ends this side's receive sequence even while a reader is blocked on
    /// the inbound channel.
    closed: CancellationToken,
}

impl DuplexTransport {
    /// Create a connected pair. By convention the first element plays the
    /// client role and the second the server role, but the sides are
    /// symmetric.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self::from_halves("client", a_tx, a_rx),
            Self::from_halves("server", b_tx, b_rx),
        )
    }

    fn from_halves(
        label: &'static str,
        tx: mpsc::Sender<Bytes>,
        rx: mpsc::Receiver<Bytes>,
    ) -> Self {
        Self {
            label,
            outbound: StdMutex::new(Some(tx)),
            inbound: tokio::sync::Mutex::new(rx),
            closed: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Transport for DuplexTransport {
    fn endpoint(&self) -> String {
        format!("duplex://{}", self.label)
    }

    async fn connect(&self) -> TransportResult<()> {
        // The pair is wired at construction; nothing to establish.
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectFailed(
                "duplex transport already closed".into(),
            ));
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        // Dropping our sender ends the peer's receive sequence; the token
        // ends ours, including a reader currently blocked.
        self.outbound.lock().expect("outbound mutex poisoned").take();
        self.closed.cancel();
        Ok(())
    }

    async fn send(&self, frame: Bytes) -> TransportResult<()> {
        let sender = self
            .outbound
            .lock()
            .expect("outbound mutex poisoned")
            .clone()
            .ok_or(TransportError::Closed)?;
        sender.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn receive(&self) -> Option<TransportResult<Bytes>> {
        let mut rx = self.inbound.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => None,
            frame = rx.recv() => frame.map(Ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_cross_the_pair_in_order() {
        let (client, server) = DuplexTransport::pair();
        client.send(Bytes::from_static(b"one")).await.unwrap();
        client.send(Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(server.receive().await.unwrap().unwrap(), "one");
        assert_eq!(server.receive().await.unwrap().unwrap(), "two");
    }

    #[tokio::test]
    async fn disconnect_ends_both_directions() {
        let (client, server) = DuplexTransport::pair();
        client.disconnect().await.unwrap();

        assert!(server.receive().await.is_none());
        assert!(matches!(
            client.send(Bytes::from_static(b"x")).await,
            Err(TransportError::Closed)
        ));
        assert!(client.receive().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_wakes_a_blocked_reader() {
        let (client, _server) = DuplexTransport::pair();
        let client = std::sync::Arc::new(client);

        let reader = tokio::spawn({
            let client = std::sync::Arc::clone(&client);
            async move { client.receive().await }
        });
        tokio::task::yield_now().await;

        client.disconnect().await.unwrap();
        assert!(reader.await.unwrap().is_none());
    }
}
