//! Channel router.
//!
//! Owns the transport, the reconciliation engine, the rendering backend and
//! every channel handler. Frames are dispatched one at a time on the task
//! that received them, so each handler sees its channel's events in arrival
//! order and never shares its buffers.
//!
//! ```text
//!   Disconnected --connect()--> Connecting --ok--> Connected
//!        ^                          |                  |
//!        +------ failure -----------+---- closed ------+   (terminal)
//! ```

use crate::error::{HandlerError, ReconcileError, RouterError};
use crate::reconcile::Reconciler;
use crate::render::{RenderBackend, Surface};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use servoscope_env::{Envelope, EnvError, EventTransport};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Transport state as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Consumer of one or more channels.
pub trait ChannelHandler: Send {
    /// Channels this handler subscribes to.
    fn channels(&self) -> Vec<String>;

    /// One-time setup when the handler is registered.
    fn attach(&mut self, _surface: &mut Surface<'_>) -> Result<(), ReconcileError> {
        Ok(())
    }

    /// Applies one event and redraws.
    fn handle(&mut self, event: &str, payload: &Value, surface: &mut Surface<'_>) -> Result<(), HandlerError>;
}

/// Outcome of dispatching one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// Malformed frame or sample, with the reason
    Dropped(String),
    /// No handler for this channel
    Unrouted(String),
}

/// Router counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    pub handled: u64,
    pub dropped: u64,
    pub unrouted: u64,
    pub subscriptions_sent: u64,
}

/// Dispatches inbound frames to channel handlers.
pub struct ChannelRouter<Net: EventTransport, B: RenderBackend> {
    transport: Arc<Net>,
    backend: B,
    reconciler: Reconciler,
    handlers: Vec<Box<dyn ChannelHandler>>,

    /// Channel name -> index into `handlers`
    routes: HashMap<String, usize>,

    /// Subscriptions registered before the link opened, in order
    pending: Vec<String>,

    state: ConnectionState,
    ended: bool,
    connect_timeout: Duration,
    stats: RouterStats,
}

impl<Net: EventTransport, B: RenderBackend> ChannelRouter<Net, B> {
    pub fn new(transport: Arc<Net>, backend: B, connect_timeout: Duration) -> Self {
        Self {
            transport,
            backend,
            reconciler: Reconciler::new(),
            handlers: Vec::new(),
            routes: HashMap::new(),
            pending: Vec::new(),
            state: ConnectionState::Disconnected,
            ended: false,
            connect_timeout,
            stats: RouterStats::default(),
        }
    }

    /// Registers a handler and subscribes to its channels.
    ///
    /// Before the link is open the subscriptions are queued; afterwards they
    /// are sent at once.
    pub async fn register(&mut self, mut handler: Box<dyn ChannelHandler>) -> Result<(), RouterError> {
        if self.ended {
            return Err(RouterError::SessionEnded);
        }

        let channels = handler.channels();
        for (i, channel) in channels.iter().enumerate() {
            if self.routes.contains_key(channel) || channels[..i].contains(channel) {
                return Err(RouterError::DuplicateRoute(channel.clone()));
            }
        }

        handler.attach(&mut Surface {
            reconciler: &mut self.reconciler,
            backend: &mut self.backend,
        })?;

        let index = self.handlers.len();
        self.handlers.push(handler);

        for channel in channels {
            self.routes.insert(channel.clone(), index);
            if self.state == ConnectionState::Connected {
                self.subscribe(&channel).await?;
            } else {
                debug!("Queued subscription to {}", channel);
                self.pending.push(channel);
            }
        }
        Ok(())
    }

    /// Waits for the link to open, then flushes queued subscriptions.
    ///
    /// Rejection, a dropped link or a timeout ends the session for good.
    pub async fn connect(&mut self) -> Result<(), RouterError> {
        if self.ended {
            return Err(RouterError::SessionEnded);
        }
        if self.state != ConnectionState::Disconnected {
            return Err(RouterError::AlreadyStarted(self.state));
        }

        self.set_state(ConnectionState::Connecting);

        let opened = match tokio::time::timeout(self.connect_timeout, self.transport.connected()).await {
            Ok(result) => result,
            Err(_) => Err(EnvError::Timeout(self.connect_timeout.as_millis() as u64)),
        };
        if let Err(e) = opened {
            warn!("Connect failed: {}", e);
            self.end_session();
            return Err(e.into());
        }

        self.set_state(ConnectionState::Connected);
        info!("Connected; flushing {} queued subscriptions", self.pending.len());

        for channel in std::mem::take(&mut self.pending) {
            self.subscribe(&channel).await?;
        }
        Ok(())
    }

    async fn subscribe(&mut self, channel: &str) -> Result<(), RouterError> {
        if let Err(e) = self.transport.send(Envelope::subscribe(channel)).await {
            warn!("Subscribe to {} failed: {}", channel, e);
            self.end_session();
            return Err(e.into());
        }
        self.stats.subscriptions_sent += 1;
        Ok(())
    }

    /// Decodes a raw `[event, payload]` frame and dispatches it.
    pub fn dispatch_text(&mut self, frame: &str) -> Result<Dispatch, RouterError> {
        match Envelope::decode(frame) {
            Ok(envelope) => self.dispatch(&envelope.event, &envelope.payload),
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                self.stats.dropped += 1;
                Ok(Dispatch::Dropped(e.to_string()))
            }
        }
    }

    /// Hands one event to its channel's handler.
    ///
    /// Malformed data is dropped and logged; reconciliation errors propagate.
    pub fn dispatch(&mut self, event: &str, payload: &Value) -> Result<Dispatch, RouterError> {
        let Some(&index) = self.routes.get(event) else {
            debug!("No handler for channel {}", event);
            self.stats.unrouted += 1;
            return Ok(Dispatch::Unrouted(event.to_string()));
        };

        let mut surface = Surface {
            reconciler: &mut self.reconciler,
            backend: &mut self.backend,
        };
        match self.handlers[index].handle(event, payload, &mut surface) {
            Ok(()) => {
                self.stats.handled += 1;
                Ok(Dispatch::Handled)
            }
            Err(HandlerError::Reconcile(e)) => Err(e.into()),
            Err(e) => {
                warn!("Dropping {} event: {}", event, e);
                self.stats.dropped += 1;
                Ok(Dispatch::Dropped(e.to_string()))
            }
        }
    }

    /// Connects if needed, then dispatches frames until the link closes.
    pub async fn run(&mut self) -> Result<RouterStats, RouterError> {
        if self.state == ConnectionState::Disconnected {
            self.connect().await?;
        }

        while let Some(frame) = self.transport.recv().await {
            self.dispatch_text(&frame)?;
        }

        info!("Link closed after {} handled events", self.stats.handled);
        self.end_session();
        Ok(self.stats.clone())
    }

    /// Sends an outbound event over the live link.
    pub async fn send(&self, envelope: Envelope) -> Result<(), RouterError> {
        if self.state != ConnectionState::Connected {
            return Err(RouterError::NotLive(self.state));
        }
        self.transport.send(envelope).await?;
        Ok(())
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.backend.connection_changed(state);
    }

    fn end_session(&mut self) {
        self.ended = true;
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn transport(&self) -> Arc<Net> {
        Arc::clone(&self.transport)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Consumes the router, returning its backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Subscriptions still waiting for the link to open.
    pub fn pending_subscriptions(&self) -> &[String] {
        &self.pending
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SampleError;
    use crate::render::RecordingBackend;
    use serde_json::json;
    use servoscope_env::{loopback, LoopbackPeer, LoopbackTransport, SUBSCRIBE_EVENT};

    /// Records every value it is handed under `path.line`.
    struct EchoHandler {
        channels: Vec<String>,
        seen: Vec<f64>,
        selector: &'static str,
    }

    impl EchoHandler {
        fn boxed(channels: &[&str]) -> Box<Self> {
            Box::new(Self {
                channels: channels.iter().map(|c| c.to_string()).collect(),
                seen: Vec::new(),
                selector: "path.line",
            })
        }
    }

    impl ChannelHandler for EchoHandler {
        fn channels(&self) -> Vec<String> {
            self.channels.clone()
        }

        fn handle(&mut self, event: &str, payload: &Value, surface: &mut Surface<'_>) -> Result<(), HandlerError> {
            let value = payload
                .as_f64()
                .ok_or(SampleError::NonFiniteValue)?;
            self.seen.push(value);
            let scope = crate::reconcile::ScopeId::new(event);
            surface.reconciler.reconcile(&scope, self.selector, &self.seen)?;
            Ok(())
        }
    }

    type TestRouter = ChannelRouter<LoopbackTransport, RecordingBackend>;

    fn router() -> (TestRouter, LoopbackPeer) {
        let (transport, peer) = loopback(32);
        let router = ChannelRouter::new(Arc::new(transport), RecordingBackend::new(), Duration::from_millis(500));
        (router, peer)
    }

    fn subscribed(peer: &mut LoopbackPeer) -> Vec<String> {
        peer.drain_requests()
            .into_iter()
            .filter(|e| e.event == SUBSCRIBE_EVENT)
            .filter_map(|e| e.channel_arg().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_subscriptions_queue_until_connected() {
        let (mut router, mut peer) = router();
        router.register(EchoHandler::boxed(&["gyro-0-measure"])).await.unwrap();
        router.register(EchoHandler::boxed(&["servo-position", "time"])).await.unwrap();

        assert_eq!(router.pending_subscriptions().len(), 3);
        assert!(subscribed(&mut peer).is_empty());

        peer.accept();
        router.connect().await.unwrap();

        assert!(router.is_live());
        assert!(router.backend().is_live());
        assert_eq!(subscribed(&mut peer), vec!["gyro-0-measure", "servo-position", "time"]);
        assert!(router.pending_subscriptions().is_empty());

        // Registered after connect: sent immediately, nothing re-sent
        router.register(EchoHandler::boxed(&["gyro-1-measure"])).await.unwrap();
        assert_eq!(subscribed(&mut peer), vec!["gyro-1-measure"]);
        assert_eq!(router.stats().subscriptions_sent, 4);
    }

    #[tokio::test]
    async fn test_duplicate_route_is_rejected() {
        let (mut router, _peer) = router();
        router.register(EchoHandler::boxed(&["time"])).await.unwrap();

        assert!(matches!(
            router.register(EchoHandler::boxed(&["time"])).await,
            Err(RouterError::DuplicateRoute(c)) if c == "time"
        ));
        assert!(matches!(
            router.register(EchoHandler::boxed(&["a", "a"])).await,
            Err(RouterError::DuplicateRoute(_))
        ));
        assert_eq!(router.pending_subscriptions(), ["time".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_connect_is_terminal() {
        let (mut router, mut peer) = router();
        router.register(EchoHandler::boxed(&["time"])).await.unwrap();
        peer.reject("refused");

        assert!(matches!(router.connect().await, Err(RouterError::Transport(_))));
        assert_eq!(router.state(), ConnectionState::Disconnected);
        assert_eq!(router.backend().connection(), Some(ConnectionState::Disconnected));
        assert!(router.has_ended());

        assert!(matches!(router.connect().await, Err(RouterError::SessionEnded)));
        assert!(matches!(
            router.register(EchoHandler::boxed(&["x"])).await,
            Err(RouterError::SessionEnded)
        ));
    }

    #[tokio::test]
    async fn test_connect_times_out_instead_of_hanging() {
        let (transport, _peer) = loopback(4);
        let mut router: TestRouter =
            ChannelRouter::new(Arc::new(transport), RecordingBackend::new(), Duration::from_millis(20));

        assert!(matches!(
            router.connect().await,
            Err(RouterError::Transport(EnvError::Timeout(20)))
        ));
        assert!(router.has_ended());
    }

    #[tokio::test]
    async fn test_dispatch_outcomes() {
        let (mut router, peer) = router();
        router.register(EchoHandler::boxed(&["time"])).await.unwrap();
        peer.accept();
        router.connect().await.unwrap();

        assert_eq!(router.dispatch("time", &json!(1.5)).unwrap(), Dispatch::Handled);
        assert_eq!(
            router.dispatch("gyro-9-measure", &json!(1.0)).unwrap(),
            Dispatch::Unrouted("gyro-9-measure".into())
        );
        assert!(matches!(router.dispatch("time", &json!("soon")).unwrap(), Dispatch::Dropped(_)));
        assert!(matches!(router.dispatch_text("not json").unwrap(), Dispatch::Dropped(_)));
        assert_eq!(router.dispatch_text(r#"["time", 2.5]"#).unwrap(), Dispatch::Handled);

        let stats = router.stats();
        assert_eq!((stats.handled, stats.dropped, stats.unrouted), (2, 2, 1));
        assert_eq!(router.reconciler().len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_errors_propagate() {
        let (mut router, _peer) = router();
        let mut handler = EchoHandler::boxed(&["time"]);
        handler.selector = "path.line.extra";
        router.register(handler).await.unwrap();

        assert!(matches!(
            router.dispatch("time", &json!(1.0)),
            Err(RouterError::Reconcile(ReconcileError::SelectorMismatch(_)))
        ));
    }

    #[tokio::test]
    async fn test_run_until_closed() {
        let (mut router, mut peer) = router();
        router.register(EchoHandler::boxed(&["time"])).await.unwrap();
        peer.accept();
        router.connect().await.unwrap();

        let feeder = tokio::spawn(async move {
            for t in [1.0, 2.0, 3.0] {
                peer.push(&Envelope::new("time", json!(t))).await.unwrap();
            }
            peer.push_raw("[\"time\"]").await.unwrap();
            peer.close();
            peer
        });

        let stats = router.run().await.unwrap();
        let mut peer = feeder.await.unwrap();

        assert_eq!(stats.handled, 3);
        assert_eq!(stats.dropped, 1);
        assert_eq!(router.state(), ConnectionState::Disconnected);
        assert!(!router.backend().is_live());
        assert_eq!(subscribed(&mut peer), vec!["time"]);

        assert!(matches!(
            router.send(Envelope::new("move-servo", json!({}))).await,
            Err(RouterError::NotLive(ConnectionState::Disconnected))
        ));
    }
}
