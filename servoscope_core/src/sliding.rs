//! Boundary-aware sliding buffer for sparse signals.
//!
//! An actuator may report its position once every few seconds. Plain
//! eviction would make its line start wherever the oldest retained report
//! happens to be; this buffer remembers the newest evicted value and draws it
//! from the left edge of the window, plus the current position at the right
//! edge, so the line always spans the window once anything has been retired.

use crate::sample::{Point, PositionSample};

/// One retained position report.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Retained {
    position: f64,
    time: f64,
}

/// Sliding window of position reports with a synthesized left boundary.
#[derive(Debug, Clone)]
pub struct SlidingBuffer {
    /// Reports newer than the window's left edge, oldest first
    positions: Vec<Retained>,

    /// Value of the most recently evicted report
    last_retired_position: Option<f64>,

    /// Value of the most recent report
    current_position: Option<f64>,

    history_secs: f64,
}

impl SlidingBuffer {
    /// Creates an empty buffer retaining `history_secs` of reports.
    pub fn new(history_secs: f64) -> Self {
        Self {
            positions: Vec::new(),
            last_retired_position: None,
            current_position: None,
            history_secs,
        }
    }

    /// Records a report and re-runs retention relative to its timestamp.
    ///
    /// The report's channel is not checked; one buffer serves one channel.
    pub fn add(&mut self, sample: &PositionSample) {
        self.positions.push(Retained {
            position: sample.position,
            time: sample.time,
        });
        self.current_position = Some(sample.position);
        self.retain(sample.time);
    }

    /// Evicts every report older than `now - history`.
    ///
    /// Reports are scanned oldest first, so the boundary ends up holding the
    /// newest evicted value. Returns the number of evicted reports.
    pub fn retain(&mut self, now: f64) -> usize {
        let horizon = now - self.history_secs;
        let before = self.positions.len();
        let mut retired = self.last_retired_position;

        self.positions.retain(|report| {
            let keep = report.time >= horizon;
            if !keep {
                retired = Some(report.position);
            }
            keep
        });

        self.last_retired_position = retired;
        before - self.positions.len()
    }

    /// Synthesizes the line to draw for a window ending at `now`.
    ///
    /// The result holds, in order: the retired boundary at `x = -history`,
    /// one point per retained report at `x = time - now`, and the current
    /// position at `x = 0`. When two of these land on the same offset the
    /// later-arriving one is kept: a report at exactly `now` is carried by
    /// the current-position point, and a report at exactly `now - history`
    /// replaces the retired boundary.
    pub fn render_points(&self, now: f64, history_secs: f64) -> Vec<Point> {
        let mut points = Vec::with_capacity(self.positions.len() + 2);

        let boundary_shadowed = self
            .positions
            .first()
            .is_some_and(|first| first.time - now == -history_secs);
        if let Some(retired) = self.last_retired_position {
            if !boundary_shadowed {
                points.push(Point::new(-history_secs, retired));
            }
        }

        for report in &self.positions {
            let x = report.time - now;
            if x == 0.0 && self.current_position.is_some() {
                continue;
            }
            points.push(Point::new(x, report.position));
        }

        if let Some(current) = self.current_position {
            points.push(Point::new(0.0, current));
        }

        points
    }

    pub fn last_retired_position(&self) -> Option<f64> {
        self.last_retired_position
    }

    pub fn current_position(&self) -> Option<f64> {
        self.current_position
    }

    pub fn history_secs(&self) -> f64 {
        self.history_secs
    }

    /// Number of retained reports.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn report(position: f64, time: f64) -> PositionSample {
        PositionSample::new(1, position, time)
    }

    #[test]
    fn test_empty_buffer_renders_nothing() {
        let buf = SlidingBuffer::new(10.0);
        assert!(buf.render_points(5.0, 10.0).is_empty());
    }

    #[test]
    fn test_sparse_update_spans_window() {
        let mut buf = SlidingBuffer::new(10.0);
        buf.add(&report(0.2, 1.0));
        buf.add(&report(0.8, 12.0));

        assert_eq!(buf.last_retired_position(), Some(0.2));
        assert_eq!(buf.len(), 1);
        assert_eq!(
            buf.render_points(12.0, 10.0),
            vec![Point::new(-10.0, 0.2), Point::new(0.0, 0.8)]
        );
    }

    #[test]
    fn test_newest_evicted_value_wins() {
        let mut buf = SlidingBuffer::new(10.0);
        buf.add(&report(0.1, 1.0));
        buf.add(&report(0.3, 2.0));
        buf.add(&report(0.5, 3.0));

        assert_eq!(buf.retain(20.0), 3);
        assert_eq!(buf.last_retired_position(), Some(0.5));
    }

    #[test]
    fn test_retained_points_between_edges() {
        let mut buf = SlidingBuffer::new(10.0);
        buf.add(&report(0.4, 5.0));
        buf.add(&report(0.6, 8.0));

        // Nothing retired yet: no left boundary
        assert_eq!(
            buf.render_points(9.0, 10.0),
            vec![Point::new(-4.0, 0.4), Point::new(-1.0, 0.6), Point::new(0.0, 0.6)]
        );
    }

    #[test]
    fn test_report_on_left_edge_replaces_boundary() {
        let mut buf = SlidingBuffer::new(10.0);
        buf.add(&report(0.9, 0.0));
        buf.add(&report(0.3, 2.0));
        buf.retain(12.0);

        assert_eq!(buf.last_retired_position(), Some(0.9));
        assert_eq!(
            buf.render_points(12.0, 10.0),
            vec![Point::new(-10.0, 0.3), Point::new(0.0, 0.3)]
        );
    }

    #[test]
    fn test_clock_tick_keeps_boundary_after_window_empties() {
        let mut buf = SlidingBuffer::new(10.0);
        buf.add(&report(0.7, 1.0));
        buf.retain(30.0);

        assert!(buf.is_empty());
        assert_eq!(
            buf.render_points(30.0, 10.0),
            vec![Point::new(-10.0, 0.7), Point::new(0.0, 0.7)]
        );

        // Further ticks with nothing to retire never clear the boundary
        assert_eq!(buf.retain(60.0), 0);
        assert_eq!(buf.last_retired_position(), Some(0.7));
    }

    proptest! {
        #[test]
        fn prop_boundary_present_once_retired(
            reports in prop::collection::vec((0.0f64..1.0, 0.0f64..4.0), 1..40),
            history in 1.0f64..10.0,
        ) {
            let mut buf = SlidingBuffer::new(history);
            let mut now = 0.0;

            for (position, dt) in reports {
                now += dt;
                buf.add(&report(position, now));

                let points = buf.render_points(now, history);
                if buf.last_retired_position().is_some() {
                    prop_assert_eq!(points.first().map(|p| p.x), Some(-history));
                }
                prop_assert_eq!(points.last().map(|p| (p.x, p.y)), Some((0.0, position)));
                prop_assert!(points.windows(2).all(|w| w[0].x <= w[1].x));
                prop_assert_eq!(points.iter().filter(|p| p.x == 0.0).count(), 1);
            }
        }
    }
}
