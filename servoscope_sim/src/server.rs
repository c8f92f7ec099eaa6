//! Simulated device server.
//!
//! Plays the device end of a loopback link: it honours `subscribe` and
//! `unsubscribe` requests, forwards an event only when the client is
//! subscribed to it, and queues every other inbound event (such as
//! `move-servo`) for the simulated hardware.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use servoscope_core::command::{MoveCommand, MOVE_EVENT};
use servoscope_env::{Envelope, LoopbackPeer, SUBSCRIBE_EVENT, UNSUBSCRIBE_EVENT};
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, warn};

/// Counters kept by the device server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    /// Events pushed to the client
    pub forwarded: u64,

    /// Events not sent because nobody subscribed
    pub suppressed: u64,

    /// Deliberately corrupt frames pushed to the client
    pub corrupted: u64,

    /// Inbound requests that could not be decoded
    pub bad_requests: u64,
}

/// Device end of a link.
pub struct DeviceServer {
    peer: LoopbackPeer,
    subscriptions: BTreeSet<String>,

    /// Inbound events other than subscription control, oldest first
    inbox: VecDeque<Envelope>,

    stats: ServerStats,
}

impl DeviceServer {
    pub fn new(peer: LoopbackPeer) -> Self {
        Self {
            peer,
            subscriptions: BTreeSet::new(),
            inbox: VecDeque::new(),
            stats: ServerStats::default(),
        }
    }

    /// Opens the link.
    pub fn accept(&self) {
        self.peer.accept();
    }

    /// Refuses the link.
    pub fn reject(&mut self, reason: &str) {
        self.peer.reject(reason);
    }

    /// Tears the link down; subscriptions are forgotten.
    pub fn close(&mut self) {
        self.peer.close();
        self.subscriptions.clear();
    }

    pub fn is_open(&self) -> bool {
        self.peer.is_open()
    }

    /// Processes every request the client has sent so far.
    ///
    /// Returns the number of requests handled.
    pub fn poll_requests(&mut self) -> usize {
        let requests = self.peer.drain_requests();
        let count = requests.len();
        for request in requests {
            self.on_request(request);
        }
        count
    }

    /// Waits until the client has subscribed to at least `count` channels.
    ///
    /// Returns false if the client went away first.
    pub async fn await_subscriptions(&mut self, count: usize) -> bool {
        while self.subscriptions.len() < count {
            match self.peer.next_request().await {
                Some(Ok(request)) => self.on_request(request),
                Some(Err(e)) => {
                    warn!("Undecodable request: {}", e);
                    self.stats.bad_requests += 1;
                }
                None => return false,
            }
        }
        true
    }

    fn on_request(&mut self, request: Envelope) {
        match request.event.as_str() {
            SUBSCRIBE_EVENT | UNSUBSCRIBE_EVENT => {
                let Some(channel) = request.channel_arg().map(str::to_string) else {
                    warn!("{} request without a channel", request.event);
                    self.stats.bad_requests += 1;
                    return;
                };
                if request.event == SUBSCRIBE_EVENT {
                    debug!("Client subscribed to {}", channel);
                    self.subscriptions.insert(channel);
                } else {
                    debug!("Client unsubscribed from {}", channel);
                    self.subscriptions.remove(&channel);
                }
            }
            _ => self.inbox.push_back(request),
        }
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions.contains(channel)
    }

    pub fn subscriptions(&self) -> &BTreeSet<String> {
        &self.subscriptions
    }

    /// Sends `payload` as `event` if the client subscribed to it.
    ///
    /// Returns whether the event was forwarded.
    pub async fn trigger<P: Serialize>(&mut self, event: &str, payload: &P) -> Result<bool, SimError> {
        if !self.subscriptions.contains(event) {
            self.stats.suppressed += 1;
            return Ok(false);
        }

        let envelope = Envelope::from_payload(event, payload)?;
        self.peer.push(&envelope).await?;
        self.stats.forwarded += 1;
        Ok(true)
    }

    /// Sends a raw frame on a subscribed channel, well-formed or not.
    pub async fn trigger_corrupt(&mut self, event: &str, frame: String) -> Result<bool, SimError> {
        if !self.subscriptions.contains(event) {
            self.stats.suppressed += 1;
            return Ok(false);
        }

        self.peer.push_raw(frame).await?;
        self.stats.corrupted += 1;
        Ok(true)
    }

    /// Removes and decodes every queued move command.
    ///
    /// Other queued events stay in the inbox.
    pub fn take_commands(&mut self) -> Vec<MoveCommand> {
        let mut commands = Vec::new();
        let mut rest = VecDeque::with_capacity(self.inbox.len());

        for envelope in self.inbox.drain(..) {
            if envelope.event != MOVE_EVENT {
                rest.push_back(envelope);
                continue;
            }
            match MoveCommand::deserialize(&envelope.payload) {
                Ok(command) => commands.push(command),
                Err(e) => {
                    warn!("Bad move command: {}", e);
                    self.stats.bad_requests += 1;
                }
            }
        }

        self.inbox = rest;
        commands
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use servoscope_env::{loopback, EventTransport};

    #[tokio::test]
    async fn test_forwards_only_subscribed_events() {
        let (client, peer) = loopback(16);
        let mut server = DeviceServer::new(peer);
        server.accept();

        client.send(Envelope::subscribe("time")).await.unwrap();
        assert!(server.await_subscriptions(1).await);

        assert!(server.trigger("time", &1.5).await.unwrap());
        assert!(!server.trigger("gyro-0-measure", &json!({})).await.unwrap());

        let frame = client.recv().await.unwrap();
        assert_eq!(Envelope::decode(&frame).unwrap(), Envelope::new("time", json!(1.5)));
        assert_eq!(server.stats().forwarded, 1);
        assert_eq!(server.stats().suppressed, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_forwarding() {
        let (client, peer) = loopback(16);
        let mut server = DeviceServer::new(peer);
        server.accept();

        client.send(Envelope::subscribe("time")).await.unwrap();
        client
            .send(Envelope::new(UNSUBSCRIBE_EVENT, json!("time")))
            .await
            .unwrap();
        assert_eq!(server.poll_requests(), 2);

        assert!(!server.is_subscribed("time"));
        assert!(!server.trigger("time", &2.0).await.unwrap());
    }

    #[tokio::test]
    async fn test_move_commands_are_queued() {
        let (client, peer) = loopback(16);
        let mut server = DeviceServer::new(peer);
        server.accept();

        client.send(MoveCommand::new(2, 0.3).envelope().unwrap()).await.unwrap();
        client.send(Envelope::new("reboot", json!(null))).await.unwrap();
        client.send(Envelope::new(MOVE_EVENT, json!({"n": "two"}))).await.unwrap();
        server.poll_requests();

        assert_eq!(server.take_commands(), vec![MoveCommand::new(2, 0.3)]);
        assert_eq!(server.inbox_len(), 1);
        assert_eq!(server.stats().bad_requests, 1);
    }

    #[tokio::test]
    async fn test_await_subscriptions_ends_with_client() {
        let (client, peer) = loopback(4);
        let mut server = DeviceServer::new(peer);
        drop(client);

        assert!(!server.await_subscriptions(1).await);
    }
}
