//! Event transport abstraction for Servoscope clients.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::Envelope;

/// Abstraction for the bidirectional publish/subscribe link to a device.
///
/// # Implementations
///
/// - **Production**: wraps a websocket or similar framed text stream
/// - **Simulation**: `LoopbackTransport`, channel based, with a controllable peer
///
/// # Frame Flow
///
/// ```text
/// Client                     Transport                   Device
///   |                           |                           |
///   |-- connected().await ----->|<-------- accept ----------|
///   |-- send(["subscribe",c]) ->|-------------------------->|
///   |                           |<------- [c, payload] -----|
///   |<-- recv() -> frame -------|                           |
/// ```
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Waits until the link is open.
    ///
    /// # Returns
    /// * `Ok(())` - The link is open; sends are now allowed
    /// * `Err(EnvError::ConnectionRejected)` - The remote refused the link
    /// * `Err(EnvError::ConnectionClosed)` - The link dropped before opening
    ///
    /// Implementations must resolve with an error rather than wait forever
    /// once the link can no longer open.
    async fn connected(&self) -> Result<(), EnvError>;

    /// Sends one event to the remote side.
    ///
    /// # Note
    /// Success only means the frame was handed to the link.
    async fn send(&self, envelope: Envelope) -> Result<(), EnvError>;

    /// Receives the next raw text frame.
    ///
    /// # Returns
    /// * `Some(frame)` - One undecoded `[event, payload]` frame
    /// * `None` - The link was closed
    async fn recv(&self) -> Option<String>;
}
