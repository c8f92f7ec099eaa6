//! Live plot of a two-group telemetry channel (e.g. a gyro).

use crate::coalesce::CoalescingBuffer;
use crate::config::StreamConfig;
use crate::error::{HandlerError, ReconcileError};
use crate::plot::{LinePlot, PlotConfig};
use crate::reconcile::ScopeId;
use crate::render::Surface;
use crate::router::ChannelHandler;
use crate::sample::{ChannelGroup, Point, Sample, SampleMessage};
use serde::Deserialize;
use serde_json::Value;
use std::f64::consts::PI;
use tracing::trace;

/// Acceleration and rotation plots over one coalesced sample stream.
pub struct TelemetryPlot {
    channel: String,
    buffer: CoalescingBuffer<Sample>,
    acceleration: LinePlot,
    rotation: LinePlot,
}

impl TelemetryPlot {
    pub fn new(channel: impl Into<String>, scope: &ScopeId, config: &StreamConfig) -> Self {
        let window = config.retention_secs;

        Self {
            channel: channel.into(),
            buffer: CoalescingBuffer::from_config(config),
            acceleration: LinePlot::new(
                scope.child("acceleration"),
                PlotConfig::time_window(window, "Acceleration (N/s²)", [-16.0, 16.0]).with_size(600, 300),
            ),
            rotation: LinePlot::new(
                scope.child("rotation"),
                // -1 to +1 turns per second
                PlotConfig::time_window(window, "Rotation (rad/s)", [-2.0 * PI, 2.0 * PI]).with_size(600, 300),
            ),
        }
    }

    /// Adds a sample and redraws both plots relative to its timestamp.
    pub fn add_sample(&mut self, sample: Sample, surface: &mut Surface<'_>) -> Result<(), HandlerError> {
        let outcome = self.buffer.ingest(sample)?;
        trace!("{} sample at {:.3}: {:?}", self.channel, sample.time, outcome);
        self.redraw(sample.time, surface)?;
        Ok(())
    }

    fn redraw(&self, now: f64, surface: &mut Surface<'_>) -> Result<(), ReconcileError> {
        self.acceleration.draw_lines(&self.series(ChannelGroup::A, now), surface)?;
        self.rotation.draw_lines(&self.series(ChannelGroup::B, now), surface)?;
        Ok(())
    }

    /// One line per axis of `group`, with x relative to `now`.
    pub fn series(&self, group: ChannelGroup, now: f64) -> Vec<Vec<Point>> {
        (0..3)
            .map(|axis| {
                self.buffer
                    .as_sequence()
                    .iter()
                    .map(|s| Point::new(s.time - now, s.axis(group, axis)))
                    .collect()
            })
            .collect()
    }

    pub fn buffer(&self) -> &CoalescingBuffer<Sample> {
        &self.buffer
    }

    pub fn acceleration_plot(&self) -> &LinePlot {
        &self.acceleration
    }

    pub fn rotation_plot(&self) -> &LinePlot {
        &self.rotation
    }
}

impl ChannelHandler for TelemetryPlot {
    fn channels(&self) -> Vec<String> {
        vec![self.channel.clone()]
    }

    fn attach(&mut self, surface: &mut Surface<'_>) -> Result<(), ReconcileError> {
        self.acceleration.declare(surface.backend);
        self.rotation.declare(surface.backend);
        Ok(())
    }

    fn handle(&mut self, _event: &str, payload: &Value, surface: &mut Surface<'_>) -> Result<(), HandlerError> {
        let message = SampleMessage::deserialize(payload)?;
        let sample = Sample::try_from(message)?;
        self.add_sample(sample, surface)
    }
}
