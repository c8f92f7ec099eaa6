//! Sample records and their wire forms.
//!
//! Samples are plain data; the only behavior they carry is validation and
//! the duration-weighted merge used by the coalescing buffer.

use crate::error::SampleError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A record the coalescing buffer can merge.
///
/// `time` is the trailing edge of the interval the record covers and
/// `duration` its length, so the leading edge is `time - duration`.
pub trait Coalesce {
    fn time(&self) -> f64;

    fn duration(&self) -> f64;

    /// Rejects records that would corrupt a buffer.
    fn validate(&self) -> Result<(), SampleError>;

    /// Folds `later` into `self`, weighting each side by its duration.
    ///
    /// Callers guarantee `self.duration() + later.duration() > 0`.
    fn absorb(&mut self, later: &Self);
}

/// One telemetry sample: two fixed-arity numeric channels over an interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Monotonic seconds at the end of the covered interval
    pub time: f64,

    /// Length of the covered interval (> 0)
    pub duration: f64,

    /// First channel group (e.g. acceleration)
    pub vector_a: Vector3<f64>,

    /// Second channel group (e.g. rotation)
    pub vector_b: Vector3<f64>,
}

impl Sample {
    pub fn new(time: f64, duration: f64, vector_a: Vector3<f64>, vector_b: Vector3<f64>) -> Self {
        Self {
            time,
            duration,
            vector_a,
            vector_b,
        }
    }

    /// Value of channel group `a` or `b` at `axis`, for plotting.
    pub fn axis(&self, group: ChannelGroup, axis: usize) -> f64 {
        match group {
            ChannelGroup::A => self.vector_a[axis],
            ChannelGroup::B => self.vector_b[axis],
        }
    }
}

/// Selects one of a sample's channel groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelGroup {
    A,
    B,
}

impl Coalesce for Sample {
    fn time(&self) -> f64 {
        self.time
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn validate(&self) -> Result<(), SampleError> {
        if !self.time.is_finite() {
            return Err(SampleError::NonFiniteTime(self.time));
        }
        // NaN fails this comparison too
        if !(self.duration > 0.0) || !self.duration.is_finite() {
            return Err(SampleError::NonPositiveDuration(self.duration));
        }
        if !self.vector_a.iter().chain(self.vector_b.iter()).all(|v| v.is_finite()) {
            return Err(SampleError::NonFiniteValue);
        }
        Ok(())
    }

    fn absorb(&mut self, later: &Self) {
        let total = self.duration + later.duration;

        self.vector_a = (self.vector_a * self.duration + later.vector_a * later.duration) / total;
        self.vector_b = (self.vector_b * self.duration + later.vector_b * later.duration) / total;

        self.duration = total;
        self.time = later.time;
    }
}

/// Wire form of a telemetry sample.
///
/// Accepts the device's physical field names (`acceleration`, `rotation`)
/// as aliases; unknown fields such as `source` are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMessage {
    pub time: f64,
    pub duration: f64,
    #[serde(alias = "acceleration")]
    pub vector_a: [f64; 3],
    #[serde(alias = "rotation")]
    pub vector_b: [f64; 3],
}

impl TryFrom<SampleMessage> for Sample {
    type Error = SampleError;

    fn try_from(msg: SampleMessage) -> Result<Self, Self::Error> {
        let sample = Sample::new(
            msg.time,
            msg.duration,
            Vector3::from(msg.vector_a),
            Vector3::from(msg.vector_b),
        );
        sample.validate()?;
        Ok(sample)
    }
}

impl From<&Sample> for SampleMessage {
    fn from(sample: &Sample) -> Self {
        Self {
            time: sample.time,
            duration: sample.duration,
            vector_a: sample.vector_a.into(),
            vector_b: sample.vector_b.into(),
        }
    }
}

/// One actuator position report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// 1-based actuator channel
    #[serde(rename = "n", alias = "channel_id")]
    pub channel_id: u32,

    /// Normalized position in [0, 1]
    pub position: f64,

    pub time: f64,
}

impl PositionSample {
    pub fn new(channel_id: u32, position: f64, time: f64) -> Self {
        Self {
            channel_id,
            position,
            time,
        }
    }

    /// Checks the sample against a panel with `channel_count` channels.
    pub fn validate(&self, channel_count: u32) -> Result<(), SampleError> {
        if !self.time.is_finite() {
            return Err(SampleError::NonFiniteTime(self.time));
        }
        if !(0.0..=1.0).contains(&self.position) {
            return Err(SampleError::PositionOutOfRange(self.position));
        }
        if self.channel_id == 0 || self.channel_id > channel_count {
            return Err(SampleError::ChannelOutOfRange {
                channel: self.channel_id,
                count: channel_count,
            });
        }
        Ok(())
    }
}

/// A point in plot data coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn sample(time: f64, duration: f64, a: f64, b: f64) -> Sample {
        Sample::new(time, duration, Vector3::repeat(a), Vector3::repeat(b))
    }

    #[test]
    fn test_validate_rejects_bad_samples() {
        assert!(matches!(
            sample(f64::NAN, 0.1, 0.0, 0.0).validate(),
            Err(SampleError::NonFiniteTime(_))
        ));
        assert!(matches!(
            sample(f64::INFINITY, 0.1, 0.0, 0.0).validate(),
            Err(SampleError::NonFiniteTime(_))
        ));
        assert_eq!(
            sample(1.0, 0.0, 0.0, 0.0).validate(),
            Err(SampleError::NonPositiveDuration(0.0))
        );
        assert!(matches!(
            sample(1.0, f64::NAN, 0.0, 0.0).validate(),
            Err(SampleError::NonPositiveDuration(_))
        ));
        assert_eq!(
            sample(1.0, 0.1, f64::NAN, 0.0).validate(),
            Err(SampleError::NonFiniteValue)
        );
        assert!(sample(1.0, 0.1, 2.0, -3.0).validate().is_ok());
    }

    #[test]
    fn test_absorb_equal_durations_is_mean() {
        let mut last = sample(1.0, 0.05, 2.0, -4.0);
        last.absorb(&sample(1.03, 0.05, 4.0, 8.0));

        assert_relative_eq!(last.vector_a, Vector3::repeat(3.0), epsilon = 1e-12);
        assert_relative_eq!(last.vector_b, Vector3::repeat(2.0), epsilon = 1e-12);
        assert_relative_eq!(last.duration, 0.10, epsilon = 1e-12);
        assert_eq!(last.time, 1.03);
    }

    #[test]
    fn test_absorb_dominant_duration() {
        let mut last = sample(10.0, 10.0, 1.0, 1.0);
        last.absorb(&sample(10.001, 0.001, 1000.0, 1000.0));

        // (1*10 + 1000*0.001) / 10.001
        assert_relative_eq!(last.vector_a.x, 11.0 / 10.001, epsilon = 1e-12);
        assert!((last.vector_a.x - 1.0).abs() < 0.2);
    }

    #[test]
    fn test_sample_message_aliases() {
        let msg: SampleMessage = serde_json::from_value(json!({
            "event": "measure",
            "source": "gyro_0",
            "time": 4.0,
            "duration": 0.01,
            "acceleration": [0.0, 9.8, 0.1],
            "rotation": [0.5, 0.0, -0.5],
        }))
        .unwrap();

        let sample = Sample::try_from(msg).unwrap();
        assert_eq!(sample.vector_a, Vector3::new(0.0, 9.8, 0.1));
        assert_eq!(sample.axis(ChannelGroup::B, 2), -0.5);
    }

    #[test]
    fn test_sample_message_rejects_zero_duration() {
        let msg = SampleMessage {
            time: 1.0,
            duration: 0.0,
            vector_a: [0.0; 3],
            vector_b: [0.0; 3],
        };
        assert_eq!(Sample::try_from(msg), Err(SampleError::NonPositiveDuration(0.0)));
    }

    #[test]
    fn test_position_sample_wire_and_validation() {
        let pos: PositionSample = serde_json::from_value(json!({"n": 2, "position": 0.4, "time": 7.5})).unwrap();
        assert_eq!(pos, PositionSample::new(2, 0.4, 7.5));
        assert!(pos.validate(4).is_ok());

        assert_eq!(
            PositionSample::new(5, 0.4, 1.0).validate(4),
            Err(SampleError::ChannelOutOfRange { channel: 5, count: 4 })
        );
        assert!(matches!(
            PositionSample::new(0, 0.4, 1.0).validate(4),
            Err(SampleError::ChannelOutOfRange { .. })
        ));
        assert_eq!(
            PositionSample::new(1, 1.5, 1.0).validate(4),
            Err(SampleError::PositionOutOfRange(1.5))
        );
        assert!(matches!(
            PositionSample::new(1, 0.5, f64::NAN).validate(4),
            Err(SampleError::NonFiniteTime(_))
        ));
    }
}
