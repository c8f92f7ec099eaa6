//! In-memory transport pair for tests and the simulation harness.
//!
//! `LoopbackTransport` is the client half handed to the router;
//! `LoopbackPeer` plays the device: it decides when (and whether) the link
//! opens, pushes frames to the client and reads what the client sent.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::transport::EventTransport;
use crate::types::Envelope;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Lifecycle of a loopback link as seen by both halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Waiting for the peer to accept or reject
    Pending,
    /// Frames flow both ways
    Open,
    /// The peer refused the link
    Rejected(String),
    /// The link was torn down
    Closed,
}

/// Client half of a loopback link.
pub struct LoopbackTransport {
    /// Link state published by the peer
    state: watch::Receiver<LinkState>,

    /// Frames from client to peer
    outbound: mpsc::Sender<String>,

    /// Frames from peer to client (behind tokio mutex for async)
    inbound: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
}

/// Device half of a loopback link.
pub struct LoopbackPeer {
    state: watch::Sender<LinkState>,

    /// Dropped on close so the client's `recv` ends
    to_client: Option<mpsc::Sender<String>>,

    from_client: mpsc::Receiver<String>,
}

/// Creates a connected client/peer pair with the given frame capacity per direction.
pub fn loopback(capacity: usize) -> (LoopbackTransport, LoopbackPeer) {
    let (state_tx, state_rx) = watch::channel(LinkState::Pending);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let (in_tx, in_rx) = mpsc::channel(capacity);

    let transport = LoopbackTransport {
        state: state_rx,
        outbound: out_tx,
        inbound: Arc::new(tokio::sync::Mutex::new(in_rx)),
    };
    let peer = LoopbackPeer {
        state: state_tx,
        to_client: Some(in_tx),
        from_client: out_rx,
    };
    (transport, peer)
}

impl LoopbackTransport {
    /// Returns the link state last published by the peer.
    pub fn link_state(&self) -> LinkState {
        self.state.borrow().clone()
    }
}

#[async_trait]
impl EventTransport for LoopbackTransport {
    async fn connected(&self) -> Result<(), EnvError> {
        let mut state = self.state.clone();
        loop {
            let current = state.borrow_and_update().clone();
            match current {
                LinkState::Open => return Ok(()),
                LinkState::Rejected(reason) => return Err(EnvError::rejected(reason)),
                LinkState::Closed => return Err(EnvError::ConnectionClosed),
                LinkState::Pending => {}
            }

            // Peer dropped while we were still pending
            if state.changed().await.is_err() {
                return Err(EnvError::ConnectionClosed);
            }
        }
    }

    async fn send(&self, envelope: Envelope) -> Result<(), EnvError> {
        if self.link_state() != LinkState::Open {
            return Err(EnvError::transport("link is not open"));
        }

        let frame = envelope.encode()?;
        self.outbound
            .send(frame)
            .await
            .map_err(|_| EnvError::ConnectionClosed)
    }

    async fn recv(&self) -> Option<String> {
        let mut rx = self.inbound.lock().await;
        rx.recv().await
    }
}

impl LoopbackPeer {
    /// Opens the link.
    pub fn accept(&self) {
        self.state.send_replace(LinkState::Open);
    }

    /// Refuses the link; a pending `connected()` fails.
    pub fn reject(&mut self, reason: impl Into<String>) {
        self.state.send_replace(LinkState::Rejected(reason.into()));
        self.to_client = None;
    }

    /// Tears the link down; the client's `recv` returns `None` once drained.
    pub fn close(&mut self) {
        self.state.send_replace(LinkState::Closed);
        self.to_client = None;
    }

    /// Returns whether the link is open.
    pub fn is_open(&self) -> bool {
        *self.state.borrow() == LinkState::Open
    }

    /// Pushes one event to the client.
    pub async fn push(&self, envelope: &Envelope) -> Result<(), EnvError> {
        let frame = envelope.encode()?;
        self.push_raw(frame).await
    }

    /// Pushes an arbitrary text frame, well-formed or not.
    pub async fn push_raw(&self, frame: impl Into<String>) -> Result<(), EnvError> {
        if !self.is_open() {
            return Err(EnvError::transport("link is not open"));
        }
        let tx = self.to_client.as_ref().ok_or(EnvError::ConnectionClosed)?;
        tx.send(frame.into())
            .await
            .map_err(|_| EnvError::ConnectionClosed)
    }

    /// Waits for the next frame from the client.
    pub async fn next_request(&mut self) -> Option<Result<Envelope, EnvError>> {
        self.from_client.recv().await.map(|frame| Envelope::decode(&frame))
    }

    /// Drains every frame the client has sent so far, without waiting.
    pub fn drain_requests(&mut self) -> Vec<Envelope> {
        let mut requests = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            if let Ok(envelope) = Envelope::decode(&frame) {
                requests.push(envelope);
            }
        }
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connected_waits_for_accept() {
        let (transport, peer) = loopback(16);
        let transport = Arc::new(transport);

        let waiter = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.connected().await })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!waiter.is_finished());

        peer.accept();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_rejected_link_fails_connected() {
        let (transport, mut peer) = loopback(16);
        peer.reject("device busy");

        let err = transport.connected().await.unwrap_err();
        assert!(matches!(err, EnvError::ConnectionRejected(ref r) if r == "device busy"));
    }

    #[tokio::test]
    async fn test_dropped_peer_fails_connected() {
        let (transport, peer) = loopback(16);
        drop(peer);

        assert!(matches!(
            transport.connected().await,
            Err(EnvError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_send_before_open_is_refused() {
        let (transport, mut peer) = loopback(16);

        assert!(transport.send(Envelope::subscribe("time")).await.is_err());
        assert!(peer.drain_requests().is_empty());
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut peer) = loopback(16);
        peer.accept();
        transport.connected().await.unwrap();

        transport.send(Envelope::subscribe("time")).await.unwrap();
        let request = peer.next_request().await.unwrap().unwrap();
        assert_eq!(request.event, "subscribe");
        assert_eq!(request.channel_arg(), Some("time"));

        peer.push(&Envelope::new("time", json!(12.5))).await.unwrap();
        let frame = transport.recv().await.unwrap();
        assert_eq!(Envelope::decode(&frame).unwrap().payload, json!(12.5));
    }

    #[tokio::test]
    async fn test_close_ends_recv() {
        let (transport, mut peer) = loopback(16);
        peer.accept();
        peer.push_raw("[\"time\", 1.0]").await.unwrap();
        peer.close();

        assert!(transport.recv().await.is_some());
        assert!(transport.recv().await.is_none());
        assert_eq!(transport.link_state(), LinkState::Closed);
    }
}
