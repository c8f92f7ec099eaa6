//! JSON exporter for finished sessions.
//!
//! Writes the scene a run left on screen (every line with its style and
//! points, every slider with its value) together with the verdict, so a run
//! can be plotted or diffed outside the simulator.

use crate::runner::SessionOutcome;
use serde::{Deserialize, Serialize};
use servoscope_core::render::RecordingBackend;
use servoscope_core::sample::Point;
use servoscope_core::{ConnectionState, RouterStats};
use std::fs::File;
use std::io::Write;

/// A line as last drawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineExport {
    /// Plot the line belongs to
    pub scope: String,

    /// Stroke colour as `#rrggbb`
    pub color: String,

    pub points: Vec<Point>,

    /// Redraws the line received
    pub updates: u64,
}

/// A slider as last drawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlExport {
    pub scope: String,
    pub label: String,
    pub value: f64,
}

/// Complete session export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Link state when the session ended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionState>,

    pub router: RouterStats,
    pub lines: Vec<LineExport>,
    pub controls: Vec<ControlExport>,
}

impl SceneExport {
    /// Builds an export from a finished session.
    pub fn from_outcome(outcome: &SessionOutcome) -> Self {
        let result = &outcome.result;
        let mut export = Self::from_scene(&outcome.scene);
        export.scenario = result.scenario.name().to_string();
        export.seed = result.seed;
        export.duration_sec = result.final_time_secs;
        export.passed = result.passed;
        export.failure_reason = result.failure_reason.clone();
        export.router = result.metrics.router.clone();
        export
    }

    /// Collects lines and controls from a recorded scene, ordered by scope.
    pub fn from_scene(scene: &RecordingBackend) -> Self {
        let mut lines = Vec::new();
        for scope in scene.plots().keys() {
            let mut in_scope: Vec<_> = scene.lines_in(scope).into_iter().map(|(_, line)| line).collect();
            in_scope.sort_by_key(|line| line.style.color.to_string());
            lines.extend(in_scope.into_iter().map(|line| LineExport {
                scope: scope.to_string(),
                color: line.style.color.to_string(),
                points: line.points.clone(),
                updates: line.updates,
            }));
        }

        let mut controls: Vec<ControlExport> = scene
            .controls()
            .map(|(_, control)| ControlExport {
                scope: control.scope.to_string(),
                label: control.spec.label.clone(),
                value: control.value,
            })
            .collect();
        controls.sort_by(|a, b| (&a.scope, &a.label).cmp(&(&b.scope, &b.label)));

        Self {
            scenario: String::new(),
            seed: 0,
            duration_sec: 0.0,
            passed: false,
            failure_reason: None,
            connection: scene.connection(),
            router: RouterStats::default(),
            lines,
            controls,
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
