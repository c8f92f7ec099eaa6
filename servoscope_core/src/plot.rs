//! Line plots drawn through the reconciliation engine.

use crate::error::ReconcileError;
use crate::reconcile::ScopeId;
use crate::render::{DrawPass, LineStyle, RenderBackend, Surface};
use crate::sample::Point;
use serde::{Deserialize, Serialize};

/// Axes and extent of one plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    pub width: u32,
    pub height: u32,
    pub xlabel: String,
    pub xlim: [f64; 2],
    pub ylabel: String,
    pub ylim: [f64; 2],
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 400,
            height: 200,
            xlabel: "x".to_string(),
            xlim: [0.0, 1.0],
            ylabel: "y".to_string(),
            ylim: [0.0, 1.0],
        }
    }
}

impl PlotConfig {
    /// A trailing time window `[-window_secs, 0]` on the x axis.
    pub fn time_window(window_secs: f64, ylabel: impl Into<String>, ylim: [f64; 2]) -> Self {
        Self {
            xlabel: "Time (s)".to_string(),
            xlim: [-window_secs, 0.0],
            ylabel: ylabel.into(),
            ylim,
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// A plot whose lines are handles in its own scope.
#[derive(Debug, Clone)]
pub struct LinePlot {
    scope: ScopeId,
    config: PlotConfig,
}

impl LinePlot {
    /// Selector of the line collection inside a plot's scope.
    pub const LINE_SELECTOR: &'static str = "path.line";

    pub fn new(scope: ScopeId, config: PlotConfig) -> Self {
        Self { scope, config }
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    pub fn config(&self) -> &PlotConfig {
        &self.config
    }

    pub fn declare(&self, backend: &mut dyn RenderBackend) {
        backend.declare_plot(&self.scope, &self.config);
    }

    /// Draws one line per entry of `lines`.
    ///
    /// New lines get their colour from their index once, at creation; every
    /// line gets its points replaced. Returns how many lines were created.
    pub fn draw_lines(&self, lines: &[Vec<Point>], surface: &mut Surface<'_>) -> Result<usize, ReconcileError> {
        let join = surface.reconciler.reconcile(&self.scope, Self::LINE_SELECTOR, lines)?;

        let pass = DrawPass {
            scope: &self.scope,
            created: join
                .created
                .iter()
                .map(|b| (b.handle, LineStyle::for_index(b.index)))
                .collect(),
            all: join.all.iter().map(|b| (b.handle, b.datum.as_slice())).collect(),
            removed: join.removed,
        };
        surface.backend.draw(&pass);

        Ok(pass.created.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Reconciler;
    use crate::render::RecordingBackend;

    #[test]
    fn test_time_window_config() {
        let config = PlotConfig::time_window(60.0, "Rotation (rad/s)", [-1.0, 1.0]).with_size(600, 300);
        assert_eq!(config.xlim, [-60.0, 0.0]);
        assert_eq!(config.xlabel, "Time (s)");
        assert_eq!((config.width, config.height), (600, 300));
    }

    #[test]
    fn test_draw_lines_keeps_colours_across_frames() {
        let mut reconciler = Reconciler::new();
        let mut backend = RecordingBackend::new();
        let plot = LinePlot::new(ScopeId::new("accel"), PlotConfig::default());
        plot.declare(&mut backend);

        let frame = |y: f64| vec![vec![Point::new(-1.0, y)]; 3];

        let mut surface = Surface { reconciler: &mut reconciler, backend: &mut backend };
        assert_eq!(plot.draw_lines(&frame(0.1), &mut surface).unwrap(), 3);
        assert_eq!(plot.draw_lines(&frame(0.2), &mut surface).unwrap(), 0);

        let handles = reconciler.handles(plot.scope(), LinePlot::LINE_SELECTOR).unwrap();
        for (i, handle) in handles.iter().enumerate() {
            let line = backend.line(handle).unwrap();
            assert_eq!(line.style, LineStyle::for_index(i));
            assert_eq!(line.points, vec![Point::new(-1.0, 0.2)]);
            assert_eq!(line.updates, 2);
        }
        assert!(backend.plots().contains_key(plot.scope()));
    }
}
