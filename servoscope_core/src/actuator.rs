//! Multi-channel actuator panel: one slider and one position plot per channel.

use crate::config::StreamConfig;
use crate::error::{HandlerError, ReconcileError, SampleError};
use crate::plot::{LinePlot, PlotConfig};
use crate::reconcile::ScopeId;
use crate::render::{ControlPass, ControlSpec, Surface};
use crate::router::ChannelHandler;
use crate::sample::PositionSample;
use crate::sliding::SlidingBuffer;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Position reports from the device.
pub const POSITION_EVENT: &str = "servo-position";

/// Device clock ticks; payload is the device time in seconds.
pub const TIME_EVENT: &str = "time";

/// Selector of the slider collection inside the panel's scope.
pub const SLIDER_SELECTOR: &str = "input.slider";

const INITIAL_SLIDER_VALUE: f64 = 0.5;

struct ActuatorChannel {
    buffer: SlidingBuffer,
    plot: LinePlot,
    slider_value: f64,
}

/// Handler for actuator position reports and device clock ticks.
///
/// Redraws happen on clock ticks; a position report is applied and then
/// treated as a tick at its own timestamp.
pub struct ActuatorPanel {
    scope: ScopeId,
    label: String,
    history_secs: f64,
    channels: Vec<ActuatorChannel>,
}

impl ActuatorPanel {
    pub fn new(scope: ScopeId, label: impl Into<String>, config: &StreamConfig) -> Self {
        let history = config.history_secs;
        let channels = (1..=config.channel_count)
            .map(|n| ActuatorChannel {
                buffer: SlidingBuffer::new(history),
                plot: LinePlot::new(
                    scope.child(n),
                    PlotConfig::time_window(history, "Position", [0.0, 1.0]),
                ),
                slider_value: INITIAL_SLIDER_VALUE,
            })
            .collect();

        Self {
            scope,
            label: label.into(),
            history_secs: history,
            channels,
        }
    }

    pub fn channel_count(&self) -> u32 {
        self.channels.len() as u32
    }

    /// Records a validated position report and redraws at its timestamp.
    pub fn add_position(&mut self, sample: &PositionSample, surface: &mut Surface<'_>) -> Result<(), HandlerError> {
        sample.validate(self.channel_count())?;

        let channel = &mut self.channels[(sample.channel_id - 1) as usize];
        channel.buffer.add(sample);
        channel.slider_value = sample.position;

        self.update_time(sample.time, surface)?;
        Ok(())
    }

    /// Retires old reports on every channel and redraws each non-empty line.
    pub fn update_time(&mut self, now: f64, surface: &mut Surface<'_>) -> Result<(), ReconcileError> {
        for channel in &mut self.channels {
            let retired = channel.buffer.retain(now);
            if retired > 0 {
                debug!("{}: retired {} reports", channel.plot.scope(), retired);
            }

            let points = channel.buffer.render_points(now, self.history_secs);
            if !points.is_empty() {
                channel.plot.draw_lines(&[points], surface)?;
            }
        }
        self.sync_sliders(surface)
    }

    fn sync_sliders(&self, surface: &mut Surface<'_>) -> Result<(), ReconcileError> {
        let values: Vec<(u32, f64)> = self
            .channels
            .iter()
            .zip(1u32..)
            .map(|(channel, n)| (n, channel.slider_value))
            .collect();

        let join = surface
            .reconciler
            .reconcile_keyed(&self.scope, SLIDER_SELECTOR, &values, |(n, _)| n.to_string())?;

        surface.backend.update_controls(&ControlPass {
            scope: &self.scope,
            created: join
                .created
                .iter()
                .map(|b| {
                    let spec = ControlSpec {
                        label: format!("{} {}", self.label, b.datum.0),
                        min: 0.0,
                        max: 1.0,
                        step: 0.1,
                    };
                    (b.handle, spec)
                })
                .collect(),
            all: join.all.iter().map(|b| (b.handle, b.datum.1)).collect(),
            removed: join.removed,
        });
        Ok(())
    }

    /// Current slider value of channel `n` (1-based).
    pub fn slider_value(&self, n: u32) -> Option<f64> {
        let index = n.checked_sub(1)? as usize;
        self.channels.get(index).map(|c| c.slider_value)
    }

    /// Position buffer of channel `n` (1-based).
    pub fn buffer(&self, n: u32) -> Option<&SlidingBuffer> {
        let index = n.checked_sub(1)? as usize;
        self.channels.get(index).map(|c| &c.buffer)
    }

    pub fn plot(&self, n: u32) -> Option<&LinePlot> {
        let index = n.checked_sub(1)? as usize;
        self.channels.get(index).map(|c| &c.plot)
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }
}

impl ChannelHandler for ActuatorPanel {
    fn channels(&self) -> Vec<String> {
        vec![POSITION_EVENT.to_string(), TIME_EVENT.to_string()]
    }

    fn attach(&mut self, surface: &mut Surface<'_>) -> Result<(), ReconcileError> {
        for channel in &self.channels {
            channel.plot.declare(surface.backend);
        }
        self.sync_sliders(surface)
    }

    fn handle(&mut self, event: &str, payload: &Value, surface: &mut Surface<'_>) -> Result<(), HandlerError> {
        match event {
            POSITION_EVENT => {
                let sample = PositionSample::deserialize(payload)?;
                self.add_position(&sample, surface)
            }
            TIME_EVENT => {
                let now = f64::deserialize(payload)?;
                if !now.is_finite() {
                    return Err(SampleError::NonFiniteTime(now).into());
                }
                self.update_time(now, surface)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
