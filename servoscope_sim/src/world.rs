//! SimWorld - the simulated device: oracle, device server and virtual clock.

use crate::context::SimContext;
use crate::error::SimError;
use crate::oracle::SignalOracle;
use crate::server::DeviceServer;

use serde::{Deserialize, Serialize};
use serde_json::json;
use servoscope_core::actuator::{POSITION_EVENT, TIME_EVENT};
use servoscope_core::{Sample, SampleMessage, StreamConfig};
use servoscope_env::{Envelope, LoopbackPeer};
use std::time::Duration;
use tracing::debug;

/// Channel the simulated gyro publishes on.
pub const GYRO_CHANNEL: &str = "gyro-0-measure";

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Device loop rate in Hz
    pub tick_rate_hz: u32,

    /// Simulation duration in seconds
    pub duration_secs: f64,

    /// Gyro sample rate in Hz
    pub gyro_rate_hz: u32,

    /// Gyro samples held back and sent together (1 = no bursts)
    pub gyro_burst: u32,

    /// Seconds between servo position reports
    pub servo_report_secs: f64,

    /// Probability that a gyro frame is replaced by a corrupt one
    pub corrupt_rate: f64,

    /// Client-side pipeline configuration
    pub stream: StreamConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tick_rate_hz: 50,
            duration_secs: 20.0,
            gyro_rate_hz: 100,
            gyro_burst: 1,
            servo_report_secs: 1.0,
            corrupt_rate: 0.0,
            stream: StreamConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn tick_dt(&self) -> f64 {
        1.0 / f64::from(self.tick_rate_hz.max(1))
    }

    pub fn total_ticks(&self) -> u64 {
        (self.duration_secs * f64::from(self.tick_rate_hz)).round() as u64
    }
}

/// What the device has emitted so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldStats {
    pub ticks: u64,
    pub gyro_samples: u64,
    pub corrupt_frames: u64,
    pub position_reports: u64,
    pub time_events: u64,
    pub commands_applied: u64,
}

/// The SimWorld - container for the device side of a simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: SimContext,

    /// Ground truth oracle
    pub oracle: SignalOracle,

    /// Device end of the link
    pub server: DeviceServer,

    /// Gyro samples waiting for their burst to fill
    held: Vec<Sample>,

    next_report_time: f64,
    stats: WorldStats,
}

impl SimWorld {
    /// Creates a world driving the device end of `peer`.
    pub fn new(config: SimConfig, peer: LoopbackPeer) -> Self {
        // Derive separate seeds for different subsystems
        let physics_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        Self {
            context: SimContext::new(config.seed),
            oracle: SignalOracle::new(physics_seed, config.stream.channel_count),
            server: DeviceServer::new(peer),
            held: Vec::new(),
            next_report_time: 0.0,
            stats: WorldStats::default(),
            config,
        }
    }

    /// Advances the device by one tick and publishes what it produced.
    pub async fn tick(&mut self) -> Result<(), SimError> {
        let dt = self.config.tick_dt();

        self.apply_commands();

        let per_tick = (self.config.gyro_rate_hz / self.config.tick_rate_hz.max(1)).max(1);
        let sub_dt = dt / f64::from(per_tick);
        for _ in 0..per_tick {
            self.oracle.step(sub_dt);
            let sample = self.oracle.measure(sub_dt);
            self.held.push(sample);
            if self.held.len() as u32 >= self.config.gyro_burst.max(1) {
                self.publish_gyro().await?;
            }
        }
        self.context.advance_time(Duration::from_secs_f64(dt));

        let now = self.oracle.time();
        if now >= self.next_report_time {
            for report in self.oracle.servo_reports() {
                if self.server.trigger(POSITION_EVENT, &report).await? {
                    self.stats.position_reports += 1;
                }
            }
            self.next_report_time += self.config.servo_report_secs;
        }

        if self.server.trigger(TIME_EVENT, &now).await? {
            self.stats.time_events += 1;
        }

        self.stats.ticks += 1;
        Ok(())
    }

    /// Applies every move command the client has sent so far.
    pub fn apply_commands(&mut self) -> u64 {
        self.server.poll_requests();
        let mut applied = 0;
        for command in self.server.take_commands() {
            if self.oracle.apply_move(&command) {
                applied += 1;
            }
        }
        self.stats.commands_applied += applied;
        applied
    }

    async fn publish_gyro(&mut self) -> Result<(), SimError> {
        for sample in std::mem::take(&mut self.held) {
            if self.oracle.chance(self.config.corrupt_rate) {
                let frame = self.corrupt_frame(&sample);
                if self.server.trigger_corrupt(GYRO_CHANNEL, frame).await? {
                    self.stats.corrupt_frames += 1;
                }
                continue;
            }

            if self.server.trigger(GYRO_CHANNEL, &SampleMessage::from(&sample)).await? {
                self.stats.gyro_samples += 1;
            }
        }
        Ok(())
    }

    /// Cycles through an undecodable frame, an invalid sample and a payload
    /// missing its channels.
    fn corrupt_frame(&self, sample: &Sample) -> String {
        debug!("Injecting corrupt gyro frame at {:.3}", sample.time);
        let broken = match self.stats.corrupt_frames % 3 {
            0 => return format!("[\"{}\", {{\"time\": ", GYRO_CHANNEL),
            1 => {
                let mut message = SampleMessage::from(sample);
                message.duration = 0.0;
                serde_json::to_value(message).unwrap_or_default()
            }
            _ => json!({ "time": sample.time }),
        };
        Envelope::new(GYRO_CHANNEL, broken).encode().unwrap_or_default()
    }

    pub fn stats(&self) -> &WorldStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servoscope_env::{loopback, EventTransport, ScopeContext};

    async fn subscribed_world(config: SimConfig, channels: &[&str]) -> (SimWorld, servoscope_env::LoopbackTransport) {
        let (client, peer) = loopback(4096);
        let mut world = SimWorld::new(config, peer);
        world.server.accept();
        for channel in channels {
            client.send(Envelope::subscribe(channel)).await.unwrap();
        }
        assert!(world.server.await_subscriptions(channels.len()).await);
        (world, client)
    }

    async fn drain(client: &servoscope_env::LoopbackTransport, frames: usize) -> Vec<Envelope> {
        let mut out = Vec::new();
        for _ in 0..frames {
            if let Some(frame) = client.recv().await {
                out.push(Envelope::decode(&frame).unwrap());
            }
        }
        out
    }

    #[tokio::test]
    async fn test_tick_emits_subscribed_channels() {
        let (mut world, client) = subscribed_world(SimConfig::default(), &[GYRO_CHANNEL, TIME_EVENT]).await;

        world.tick().await.unwrap();

        // 100 Hz gyro at 50 Hz ticks: two samples, then one clock event
        let frames = drain(&client, 3).await;
        assert_eq!(frames[0].event, GYRO_CHANNEL);
        assert_eq!(frames[1].event, GYRO_CHANNEL);
        assert_eq!(frames[2], Envelope::new(TIME_EVENT, json!(world.oracle.time())));

        assert_eq!(world.stats().gyro_samples, 2);
        assert_eq!(world.stats().position_reports, 0);
        assert!((world.context.now_secs() - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_bursts_hold_samples_back() {
        let config = SimConfig {
            gyro_burst: 5,
            ..SimConfig::default()
        };
        let (mut world, _client) = subscribed_world(config, &[GYRO_CHANNEL]).await;

        world.tick().await.unwrap();
        world.tick().await.unwrap();
        assert_eq!(world.stats().gyro_samples, 0);

        world.tick().await.unwrap();
        assert_eq!(world.stats().gyro_samples, 5);
    }

    #[tokio::test]
    async fn test_commands_reach_the_oracle() {
        let (mut world, client) = subscribed_world(SimConfig::default(), &[]).await;

        client
            .send(servoscope_core::MoveCommand::new(1, 1.0).envelope().unwrap())
            .await
            .unwrap();
        world.tick().await.unwrap();

        assert_eq!(world.stats().commands_applied, 1);
        assert_eq!(world.oracle.servo(1).unwrap().target, 1.0);
    }

    #[tokio::test]
    async fn test_corrupt_frames_replace_samples() {
        let config = SimConfig {
            corrupt_rate: 1.0,
            ..SimConfig::default()
        };
        let (mut world, client) = subscribed_world(config, &[GYRO_CHANNEL]).await;

        world.tick().await.unwrap();
        world.tick().await.unwrap();

        assert_eq!(world.stats().corrupt_frames, 4);
        assert_eq!(world.stats().gyro_samples, 0);

        let first = client.recv().await.unwrap();
        assert!(Envelope::decode(&first).is_err());
    }
}
