//! Rendering backends for simulation runs.
//!
//! Every run records its scene in memory for assertions and export. With the
//! `visualization` feature the same draw passes are also streamed to a Rerun
//! viewer, one entity per visual handle:
//!
//! - Plot lines as 2D line strips under `plots/<scope>/<handle>`
//! - Slider values as scalars under `controls/<scope>/<handle>`
//! - Connection changes as text logs under `link`

use crate::context::SimContext;
use servoscope_core::plot::PlotConfig;
use servoscope_core::render::{ControlPass, DrawPass, RecordingBackend, RenderBackend};
use servoscope_core::{ConnectionState, ScopeId};
#[cfg(feature = "visualization")]
use servoscope_env::ScopeContext;

#[cfg(feature = "visualization")]
use rerun::{Color, LineStrips2D, RecordingStream};

/// Rerun logger for simulation visualization.
pub struct RerunBackend {
    #[cfg(feature = "visualization")]
    rec: Option<RecordingStream>,

    /// Clock used to stamp every log call
    context: SimContext,

    /// Whether visualization is enabled
    enabled: bool,
}

impl RerunBackend {
    /// Creates a new backend with visualization disabled.
    pub fn disabled(context: SimContext) -> Self {
        Self {
            #[cfg(feature = "visualization")]
            rec: None,
            context,
            enabled: false,
        }
    }

    /// Creates a new backend with visualization enabled.
    #[cfg(feature = "visualization")]
    pub fn new(name: &str, context: SimContext) -> Self {
        match rerun::RecordingStreamBuilder::new(name).spawn() {
            Ok(rec) => {
                tracing::info!("Rerun visualization enabled - open Rerun Viewer to see the plots");
                Self {
                    rec: Some(rec),
                    context,
                    enabled: true,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to initialize Rerun: {:?}", e);
                Self::disabled(context)
            }
        }
    }

    /// Creates a backend - returns disabled if visualization feature not enabled.
    #[cfg(not(feature = "visualization"))]
    pub fn new(_name: &str, context: SimContext) -> Self {
        tracing::info!("Rerun visualization not available (compile with --features visualization)");
        Self::disabled(context)
    }

    /// Returns whether visualization is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn context(&self) -> &SimContext {
        &self.context
    }

    #[cfg(feature = "visualization")]
    fn stream(&self) -> Option<&RecordingStream> {
        let rec = self.rec.as_ref()?;
        rec.set_time_seconds("sim_time", self.context.now_secs());
        Some(rec)
    }
}

#[cfg(feature = "visualization")]
impl RenderBackend for RerunBackend {
    fn declare_plot(&mut self, scope: &ScopeId, config: &PlotConfig) {
        if let Some(rec) = self.stream() {
            let summary = format!(
                "{}: {} vs {} in [{}, {}]",
                scope, config.ylabel, config.xlabel, config.ylim[0], config.ylim[1]
            );
            let _ = rec.log(format!("plots/{}/axes", scope), &rerun::TextLog::new(summary));
        }
    }

    fn draw(&mut self, pass: &DrawPass<'_>) {
        let Some(rec) = self.stream() else {
            return;
        };

        for handle in &pass.removed {
            let _ = rec.log(format!("plots/{}/{}", pass.scope, handle), &rerun::Clear::flat());
        }

        let styles: std::collections::HashMap<_, _> = pass.created.iter().copied().collect();
        for (handle, points) in &pass.all {
            let strip: Vec<[f32; 2]> = points.iter().map(|p| [p.x as f32, p.y as f32]).collect();
            let mut lines = LineStrips2D::new([strip]);
            if let Some(style) = styles.get(handle) {
                let rgb = style.color;
                lines = lines
                    .with_colors([Color::from_rgb(rgb.0, rgb.1, rgb.2)])
                    .with_radii([style.stroke_width * 0.01]);
            }
            let _ = rec.log(format!("plots/{}/{}", pass.scope, handle), &lines);
        }
    }

    fn update_controls(&mut self, pass: &ControlPass<'_>) {
        if let Some(rec) = self.stream() {
            for (handle, value) in &pass.all {
                let _ = rec.log(format!("controls/{}/{}", pass.scope, handle), &rerun::Scalar::new(*value));
            }
        }
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        if let Some(rec) = self.stream() {
            let _ = rec.log("link", &rerun::TextLog::new(format!("Link {}", state)));
        }
    }
}

#[cfg(not(feature = "visualization"))]
impl RenderBackend for RerunBackend {
    fn draw(&mut self, _pass: &DrawPass<'_>) {}
}

/// Backend used by the runner: always records, optionally streams.
pub struct SimBackend {
    recording: RecordingBackend,
    viewer: Option<RerunBackend>,
}

impl SimBackend {
    pub fn recording_only() -> Self {
        Self {
            recording: RecordingBackend::new(),
            viewer: None,
        }
    }

    pub fn with_viewer(viewer: RerunBackend) -> Self {
        Self {
            recording: RecordingBackend::new(),
            viewer: viewer.is_enabled().then_some(viewer),
        }
    }

    pub fn recording(&self) -> &RecordingBackend {
        &self.recording
    }

    pub fn into_recording(self) -> RecordingBackend {
        self.recording
    }
}

impl RenderBackend for SimBackend {
    fn declare_plot(&mut self, scope: &ScopeId, config: &PlotConfig) {
        self.recording.declare_plot(scope, config);
        if let Some(viewer) = &mut self.viewer {
            viewer.declare_plot(scope, config);
        }
    }

    fn draw(&mut self, pass: &DrawPass<'_>) {
        self.recording.draw(pass);
        if let Some(viewer) = &mut self.viewer {
            viewer.draw(pass);
        }
    }

    fn update_controls(&mut self, pass: &ControlPass<'_>) {
        self.recording.update_controls(pass);
        if let Some(viewer) = &mut self.viewer {
            viewer.update_controls(pass);
        }
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        self.recording.connection_changed(state);
        if let Some(viewer) = &mut self.viewer {
            viewer.connection_changed(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_viewer_is_not_attached() {
        let viewer = RerunBackend::disabled(SimContext::new(1));
        assert!(!viewer.is_enabled());

        let mut backend = SimBackend::with_viewer(viewer);
        backend.connection_changed(ConnectionState::Connected);
        backend.declare_plot(&ScopeId::new("gyro-0"), &PlotConfig::default());

        assert!(backend.recording().is_live());
        assert_eq!(backend.into_recording().plots().len(), 1);
    }
}
