//! Rendering backend boundary.
//!
//! The pipeline never draws anything itself. Each redraw it hands the
//! backend a pass describing which handles were created (with their
//! one-time style), every live handle with the data it should show, and
//! which handles were destroyed. The backend only places things on screen;
//! it never decides when handles come or go.

use crate::plot::PlotConfig;
use crate::reconcile::{Reconciler, ScopeId, VisualHandle};
use crate::router::ConnectionState;
use crate::sample::Point;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// An sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// The ten-colour categorical palette lines cycle through.
pub const CATEGORY10: [Rgb; 10] = [
    Rgb(0x1f, 0x77, 0xb4),
    Rgb(0xff, 0x7f, 0x0e),
    Rgb(0x2c, 0xa0, 0x2c),
    Rgb(0xd6, 0x27, 0x28),
    Rgb(0x94, 0x67, 0xbd),
    Rgb(0x8c, 0x56, 0x4b),
    Rgb(0xe3, 0x77, 0xc2),
    Rgb(0x7f, 0x7f, 0x7f),
    Rgb(0xbc, 0xbd, 0x22),
    Rgb(0x17, 0xbe, 0xcf),
];

/// How a line's points are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    Linear,
    CatmullRom,
}

/// One-time style applied when a line handle is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    pub color: Rgb,
    pub stroke_width: f32,
    pub curve: Curve,
}

impl LineStyle {
    /// Style for the line created at position `index`; colours cycle every ten lines.
    pub fn for_index(index: usize) -> Self {
        Self {
            color: CATEGORY10[index % CATEGORY10.len()],
            stroke_width: 1.5,
            curve: Curve::CatmullRom,
        }
    }
}

/// Line changes for one plot in one redraw.
#[derive(Debug)]
pub struct DrawPass<'a> {
    pub scope: &'a ScopeId,
    pub created: Vec<(VisualHandle, LineStyle)>,
    pub all: Vec<(VisualHandle, &'a [Point])>,
    pub removed: Vec<VisualHandle>,
}

/// One-time description of an input control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSpec {
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Control changes for one panel in one redraw.
#[derive(Debug)]
pub struct ControlPass<'a> {
    pub scope: &'a ScopeId,
    pub created: Vec<(VisualHandle, ControlSpec)>,
    pub all: Vec<(VisualHandle, f64)>,
    pub removed: Vec<VisualHandle>,
}

/// The external drawing surface.
pub trait RenderBackend: Send {
    /// Announces a plot's axes and extent before its first draw.
    fn declare_plot(&mut self, _scope: &ScopeId, _config: &PlotConfig) {}

    /// Applies one redraw of a plot's lines.
    fn draw(&mut self, pass: &DrawPass<'_>);

    /// Applies one update of a panel's controls.
    fn update_controls(&mut self, _pass: &ControlPass<'_>) {}

    /// Reports the transport state so a dead link is visibly not live.
    fn connection_changed(&mut self, _state: ConnectionState) {}
}

/// What the router lends a handler for one redraw.
pub struct Surface<'a> {
    pub reconciler: &'a mut Reconciler,
    pub backend: &'a mut dyn RenderBackend,
}

/// Last known state of one line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedLine {
    pub scope: ScopeId,
    pub style: LineStyle,
    pub points: Vec<Point>,
    pub updates: u64,
}

/// Last known state of one control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedControl {
    pub scope: ScopeId,
    pub spec: ControlSpec,
    pub value: f64,
}

/// Counters kept by [`RecordingBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStats {
    pub passes: u64,
    pub created: u64,
    pub removed: u64,
    /// Updates addressed to a handle the backend never saw created
    pub orphan_updates: u64,
}

/// Backend that keeps the latest scene in memory instead of drawing it.
///
/// Used by tests and by the simulator's exporter.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    plots: BTreeMap<ScopeId, PlotConfig>,
    lines: HashMap<VisualHandle, RecordedLine>,
    controls: HashMap<VisualHandle, RecordedControl>,
    connection: Option<ConnectionState>,
    stats: RenderStats,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self, handle: &VisualHandle) -> Option<&RecordedLine> {
        self.lines.get(handle)
    }

    /// Lines of one plot, in no particular order.
    pub fn lines_in(&self, scope: &ScopeId) -> Vec<(&VisualHandle, &RecordedLine)> {
        self.lines.iter().filter(|(_, line)| &line.scope == scope).collect()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn control(&self, handle: &VisualHandle) -> Option<&RecordedControl> {
        self.controls.get(handle)
    }

    pub fn controls_in(&self, scope: &ScopeId) -> Vec<(&VisualHandle, &RecordedControl)> {
        self.controls.iter().filter(|(_, c)| &c.scope == scope).collect()
    }

    /// Every control, in no particular order.
    pub fn controls(&self) -> impl Iterator<Item = (&VisualHandle, &RecordedControl)> {
        self.controls.iter()
    }

    pub fn plots(&self) -> &BTreeMap<ScopeId, PlotConfig> {
        &self.plots
    }

    /// Last connection state reported, if any.
    pub fn connection(&self) -> Option<ConnectionState> {
        self.connection
    }

    pub fn is_live(&self) -> bool {
        self.connection == Some(ConnectionState::Connected)
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }
}

impl RenderBackend for RecordingBackend {
    fn declare_plot(&mut self, scope: &ScopeId, config: &PlotConfig) {
        self.plots.insert(scope.clone(), config.clone());
    }

    fn draw(&mut self, pass: &DrawPass<'_>) {
        self.stats.passes += 1;

        for handle in &pass.removed {
            if self.lines.remove(handle).is_some() {
                self.stats.removed += 1;
            }
        }

        for (handle, style) in &pass.created {
            self.stats.created += 1;
            self.lines.insert(
                *handle,
                RecordedLine {
                    scope: pass.scope.clone(),
                    style: *style,
                    points: Vec::new(),
                    updates: 0,
                },
            );
        }

        for (handle, points) in &pass.all {
            match self.lines.get_mut(handle) {
                Some(line) => {
                    line.points = points.to_vec();
                    line.updates += 1;
                }
                None => self.stats.orphan_updates += 1,
            }
        }
    }

    fn update_controls(&mut self, pass: &ControlPass<'_>) {
        for handle in &pass.removed {
            self.controls.remove(handle);
        }
        for (handle, spec) in &pass.created {
            self.controls.insert(
                *handle,
                RecordedControl {
                    scope: pass.scope.clone(),
                    spec: spec.clone(),
                    value: spec.min,
                },
            );
        }
        for (handle, value) in &pass.all {
            if let Some(control) = self.controls.get_mut(handle) {
                control.value = *value;
            }
        }
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        self.connection = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_cycles() {
        assert_eq!(LineStyle::for_index(0).color, LineStyle::for_index(10).color);
        assert_ne!(LineStyle::for_index(0).color, LineStyle::for_index(1).color);
        assert_eq!(CATEGORY10[0].to_string(), "#1f77b4");
    }

    #[test]
    fn test_recording_backend_tracks_lifecycle() {
        let mut rec = Reconciler::new();
        let mut backend = RecordingBackend::new();
        let scope = ScopeId::new("plot");
        let lines = vec![vec![Point::new(-1.0, 0.5)], vec![Point::new(-1.0, 0.7)]];

        let join = rec.reconcile(&scope, "path.line", &lines).unwrap();
        backend.draw(&DrawPass {
            scope: &scope,
            created: join.created.iter().map(|b| (b.handle, LineStyle::for_index(b.index))).collect(),
            all: join.all.iter().map(|b| (b.handle, b.datum.as_slice())).collect(),
            removed: join.removed.clone(),
        });

        assert_eq!(backend.line_count(), 2);
        let first = backend.line(&join.all[0].handle).unwrap();
        assert_eq!(first.points, vec![Point::new(-1.0, 0.5)]);
        assert_eq!(first.style.color, CATEGORY10[0]);

        let fewer = &lines[..1];
        let join = rec.reconcile(&scope, "path.line", fewer).unwrap();
        backend.draw(&DrawPass {
            scope: &scope,
            created: Vec::new(),
            all: join.all.iter().map(|b| (b.handle, b.datum.as_slice())).collect(),
            removed: join.removed.clone(),
        });

        assert_eq!(backend.line_count(), 1);
        assert_eq!(backend.stats().removed, 1);
        assert_eq!(backend.stats().orphan_updates, 0);
        assert_eq!(backend.line(&join.all[0].handle).unwrap().updates, 2);
    }

    #[test]
    fn test_connection_state_is_recorded() {
        let mut backend = RecordingBackend::new();
        assert!(!backend.is_live());

        backend.connection_changed(ConnectionState::Connected);
        assert!(backend.is_live());

        backend.connection_changed(ConnectionState::Disconnected);
        assert_eq!(backend.connection(), Some(ConnectionState::Disconnected));
        assert!(!backend.is_live());
    }
}
