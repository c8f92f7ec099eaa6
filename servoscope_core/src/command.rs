//! Actuator commands.
//!
//! Commands leave the client two ways: throttled slider input from the
//! panel, and a fixed-interval loop driven by some command source.

use crate::error::SampleError;
use serde::{Deserialize, Serialize};
use servoscope_env::{Envelope, EnvError, EventTransport, ScopeContext};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Event name of an actuator move request.
pub const MOVE_EVENT: &str = "move-servo";

/// Seconds the device holds a commanded position before relaxing.
pub const DEFAULT_STICKY: u32 = 5;

/// Request to move actuator `n` to `position`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveCommand {
    pub n: u32,
    pub position: f64,
    pub sticky: u32,
}

impl MoveCommand {
    /// Builds a command, clamping `position` into `[0, 1]`.
    ///
    /// A NaN position becomes 0.
    pub fn new(n: u32, position: f64) -> Self {
        let position = if position.is_nan() { 0.0 } else { position.clamp(0.0, 1.0) };
        Self {
            n,
            position,
            sticky: DEFAULT_STICKY,
        }
    }

    pub fn envelope(&self) -> Result<Envelope, EnvError> {
        Envelope::from_payload(MOVE_EVENT, self)
    }
}

/// Leading-edge throttle with a trailing flush.
///
/// The first value offered after a quiet period goes out at once. Values
/// offered while the interval is still running replace one another, and the
/// last of them goes out on the first `flush` after the interval elapses.
#[derive(Debug, Clone)]
pub struct CommandThrottle<T> {
    interval: Duration,
    last_emit: Option<Duration>,
    pending: Option<T>,
}

impl<T> CommandThrottle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: None,
        }
    }

    fn ready(&self, now: Duration) -> bool {
        self.last_emit
            .map_or(true, |last| now.saturating_sub(last) >= self.interval)
    }

    /// Offers a value; returns it when it may be sent immediately.
    pub fn offer(&mut self, now: Duration, value: T) -> Option<T> {
        if self.ready(now) {
            self.last_emit = Some(now);
            self.pending = None;
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// Releases the held value once the interval has elapsed.
    pub fn flush(&mut self, now: Duration) -> Option<T> {
        if self.pending.is_some() && self.ready(now) {
            self.last_emit = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// One throttle per actuator slider.
#[derive(Debug, Clone)]
pub struct SliderCommands {
    throttles: Vec<CommandThrottle<MoveCommand>>,
}

impl SliderCommands {
    pub fn new(channel_count: u32, interval: Duration) -> Self {
        Self {
            throttles: (0..channel_count).map(|_| CommandThrottle::new(interval)).collect(),
        }
    }

    /// Slider `n` (1-based) moved to `value`.
    pub fn input(&mut self, n: u32, value: f64, now: Duration) -> Result<Option<MoveCommand>, SampleError> {
        let count = self.throttles.len() as u32;
        let throttle = n
            .checked_sub(1)
            .and_then(|i| self.throttles.get_mut(i as usize))
            .ok_or(SampleError::ChannelOutOfRange { channel: n, count })?;

        Ok(throttle.offer(now, MoveCommand::new(n, value)))
    }

    /// Trailing commands whose interval has elapsed, in channel order.
    pub fn flush(&mut self, now: Duration) -> Vec<MoveCommand> {
        self.throttles.iter_mut().filter_map(|t| t.flush(now)).collect()
    }
}

/// Sends one envelope per `interval` until `stop` flips or `next` runs dry.
///
/// `next` receives the number of envelopes emitted so far. Dropping the
/// stop sender also stops the loop. Returns the number of envelopes sent.
pub async fn run_command_loop<C, Net, F>(
    ctx: &C,
    transport: &Net,
    interval: Duration,
    mut next: F,
    mut stop: watch::Receiver<bool>,
) -> Result<u64, EnvError>
where
    C: ScopeContext,
    Net: EventTransport + ?Sized,
    F: FnMut(u64) -> Option<Envelope>,
{
    let mut emitted = 0u64;

    loop {
        if *stop.borrow_and_update() {
            debug!("Command loop stopped by signal");
            break;
        }

        let Some(envelope) = next(emitted) else {
            debug!("Command source exhausted");
            break;
        };
        transport.send(envelope).await?;
        emitted += 1;

        tokio::select! {
            _ = ctx.sleep(interval) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Command loop emitted {} commands", emitted);
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use servoscope_env::{loopback, TokioContext};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_move_command_clamps_and_serializes() {
        assert_eq!(MoveCommand::new(1, 1.7).position, 1.0);
        assert_eq!(MoveCommand::new(1, -0.2).position, 0.0);
        assert_eq!(MoveCommand::new(1, f64::NAN).position, 0.0);

        let envelope = MoveCommand::new(3, 0.25).envelope().unwrap();
        assert_eq!(
            envelope.encode().unwrap(),
            r#"["move-servo",{"n":3,"position":0.25,"sticky":5}]"#
        );
    }

    #[test]
    fn test_throttle_leading_then_trailing() {
        let mut throttle = CommandThrottle::new(ms(100));

        assert_eq!(throttle.offer(ms(0), 1), Some(1));
        assert_eq!(throttle.offer(ms(30), 2), None);
        assert_eq!(throttle.offer(ms(60), 3), None);
        assert!(throttle.has_pending());

        assert_eq!(throttle.flush(ms(90)), None);
        assert_eq!(throttle.flush(ms(100)), Some(3));
        assert!(!throttle.has_pending());

        // Interval restarts from the trailing emission
        assert_eq!(throttle.offer(ms(150), 4), None);
        assert_eq!(throttle.offer(ms(200), 5), Some(5));
        assert!(!throttle.has_pending());
    }

    #[test]
    fn test_slider_commands_are_per_channel() {
        let mut sliders = SliderCommands::new(2, ms(100));

        assert!(sliders.input(1, 0.3, ms(0)).unwrap().is_some());
        assert!(sliders.input(2, 0.6, ms(10)).unwrap().is_some());
        assert!(sliders.input(1, 0.4, ms(20)).unwrap().is_none());

        assert!(matches!(
            sliders.input(3, 0.5, ms(30)),
            Err(SampleError::ChannelOutOfRange { channel: 3, count: 2 })
        ));
        assert!(sliders.input(0, 0.5, ms(30)).is_err());

        assert_eq!(sliders.flush(ms(120)), vec![MoveCommand::new(1, 0.4)]);
    }

    #[tokio::test]
    async fn test_command_loop_runs_until_source_ends() {
        let ctx = TokioContext::new();
        let (transport, mut peer) = loopback(16);
        peer.accept();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let sent = run_command_loop(
            &ctx,
            &transport,
            ms(1),
            |i| (i < 3).then(|| MoveCommand::new(1, i as f64 / 4.0).envelope().ok()).flatten(),
            stop_rx,
        )
        .await
        .unwrap();

        assert_eq!(sent, 3);
        let requests = peer.drain_requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|e| e.event == MOVE_EVENT));
    }

    #[tokio::test]
    async fn test_command_loop_stops_on_signal() {
        let ctx = TokioContext::new();
        let (transport, mut peer) = loopback(64);
        peer.accept();
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            run_command_loop(
                &TokioContext::new(),
                &transport,
                ms(5),
                |_| MoveCommand::new(2, 0.5).envelope().ok(),
                stop_rx,
            )
            .await
        });

        ctx.sleep(ms(30)).await;
        stop_tx.send(true).unwrap();
        let sent = handle.await.unwrap().unwrap();

        // No emissions after the loop returned
        let drained = peer.drain_requests();
        assert_eq!(drained.len() as u64, sent);
        assert!(sent >= 1);
    }

    #[tokio::test]
    async fn test_command_loop_surfaces_transport_failure() {
        let ctx = TokioContext::new();
        let (transport, _peer) = loopback(4);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let result = run_command_loop(
            &ctx,
            &transport,
            ms(1),
            |_| MoveCommand::new(1, 0.5).envelope().ok(),
            stop_rx,
        )
        .await;
        assert!(result.is_err());
    }
}
