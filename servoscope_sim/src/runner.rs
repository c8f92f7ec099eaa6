//! Scenario runner - drives a client session against the simulated device.
//!
//! Each run wires a [`ChannelRouter`] to a [`SimWorld`] through a loopback
//! link. The router runs on its own task; the world ticks on the calling
//! task and advances the virtual clock that the command loop sleeps on.
//! Everything runs on a single-threaded runtime so a seed always replays
//! the same session.

use crate::error::SimError;
use crate::scenarios::ScenarioId;
use crate::visualizer::{RerunBackend, SimBackend};
use crate::world::{SimConfig, SimWorld, WorldStats, GYRO_CHANNEL};
use crate::server::ServerStats;

use serde::{Deserialize, Serialize};
use servoscope_core::render::RecordingBackend;
use servoscope_core::{
    run_command_loop, ActuatorPanel, ChannelRouter, ConnectionState, MoveCommand, RouterError, RouterStats,
    ScopeId, SliderCommands, StreamConfig, TelemetryPlot,
};
use servoscope_env::{loopback, EventTransport, LoopbackTransport, ScopeContext};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Frames buffered in each direction of the loopback link.
const LINK_CAPACITY: usize = 4096;

/// Connect timeout used when the device is expected never to answer.
const STALLED_TIMEOUT_MS: u64 = 250;

/// Scope of the gyro telemetry plots.
pub const GYRO_SCOPE: &str = "gyro-0";

/// Scope of the servo panel.
pub const SERVO_SCOPE: &str = "servos";

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Router counters at the end of the session
    pub router: RouterStats,

    /// What the device emitted
    pub world: WorldStats,

    /// Device server counters
    pub server: ServerStats,

    /// Move commands the client sent
    pub commands_sent: u64,

    /// Lines on screen at the end of the session
    pub lines: usize,

    /// Most points held by any gyro line
    pub max_gyro_points: usize,
}

/// A finished run: its verdict plus the scene it left behind.
#[derive(Debug)]
pub struct SessionOutcome {
    pub result: ScenarioResult,
    pub scene: RecordingBackend,
}

/// Runs device-link scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Simulated duration in seconds
    duration_secs: f64,

    /// Client pipeline configuration
    stream: StreamConfig,

    /// Stream draw passes to a Rerun viewer
    viewer: bool,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            duration_secs: SimConfig::default().duration_secs,
            stream: StreamConfig::default(),
            viewer: false,
        }
    }

    /// Sets the simulated duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Sets the client pipeline configuration.
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Streams every run to a Rerun viewer when available.
    pub fn with_viewer(mut self, enabled: bool) -> Self {
        self.viewer = enabled;
        self
    }

    /// Device configuration for `scenario`.
    pub fn config_for(&self, scenario: ScenarioId) -> SimConfig {
        let mut config = SimConfig {
            seed: self.seed,
            duration_secs: self.duration_secs,
            stream: self.stream.clone(),
            ..SimConfig::default()
        };

        match scenario {
            ScenarioId::Burst => {
                config.gyro_rate_hz = 1000;
                config.gyro_burst = 25;
            }
            ScenarioId::Sparse => {
                config.servo_report_secs = 7.0;
            }
            ScenarioId::Malformed => {
                config.corrupt_rate = 0.1;
            }
            ScenarioId::Stalled => {
                config.stream.connect_timeout_ms = config.stream.connect_timeout_ms.min(STALLED_TIMEOUT_MS);
            }
            _ => {}
        }
        config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_session(scenario).result
    }

    /// Runs a scenario and keeps the final scene.
    pub fn run_session(&self, scenario: ScenarioId) -> SessionOutcome {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let outcome = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SimError::from)
            .and_then(|runtime| runtime.block_on(self.drive(scenario)));

        match outcome {
            Ok(outcome) => {
                if outcome.result.passed {
                    info!("Scenario {} passed", scenario);
                } else {
                    warn!(
                        "Scenario {} failed: {}",
                        scenario,
                        outcome.result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
                outcome
            }
            Err(e) => {
                warn!("Scenario {} aborted: {}", scenario, e);
                SessionOutcome {
                    result: ScenarioResult {
                        scenario,
                        seed: self.seed,
                        passed: false,
                        total_ticks: 0,
                        final_time_secs: 0.0,
                        failure_reason: Some(e.to_string()),
                        metrics: ScenarioMetrics::default(),
                    },
                    scene: RecordingBackend::new(),
                }
            }
        }
    }

    async fn drive(&self, scenario: ScenarioId) -> Result<SessionOutcome, SimError> {
        let config = self.config_for(scenario);
        let (transport, peer) = loopback(LINK_CAPACITY);
        let transport = Arc::new(transport);
        let mut world = SimWorld::new(config.clone(), peer);

        let backend = if self.viewer {
            SimBackend::with_viewer(RerunBackend::new(scenario.name(), world.context.clone()))
        } else {
            SimBackend::recording_only()
        };

        let mut router = ChannelRouter::new(Arc::clone(&transport), backend, config.stream.connect_timeout());
        router
            .register(Box::new(TelemetryPlot::new(
                GYRO_CHANNEL,
                &ScopeId::new(GYRO_SCOPE),
                &config.stream,
            )))
            .await?;
        router
            .register(Box::new(ActuatorPanel::new(ScopeId::new(SERVO_SCOPE), "Servo", &config.stream)))
            .await?;
        let expected_subscriptions = router.pending_subscriptions().len();

        match scenario {
            ScenarioId::Rejected => world.server.reject("device busy"),
            // Never answers
            ScenarioId::Stalled => {}
            _ => world.server.accept(),
        }

        let session = tokio::spawn(async move {
            let outcome = router.run().await;
            (router, outcome)
        });

        if scenario.is_link_failure() {
            let (router, outcome) = session.await.map_err(|e| SimError::Task(e.to_string()))?;
            let ended = router.has_ended();
            let scene = router.into_backend().into_recording();
            let failures = check_link_failure(&outcome, ended, &scene, &world);
            let metrics = ScenarioMetrics {
                router: outcome.unwrap_or_default(),
                world: world.stats().clone(),
                server: world.server.stats().clone(),
                ..ScenarioMetrics::default()
            };
            return Ok(self.finish(scenario, &world, failures, metrics, scene));
        }

        if !world.server.await_subscriptions(expected_subscriptions).await {
            return Err(SimError::Task("client left before subscribing".to_string()));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweep = (scenario == ScenarioId::Sweep).then(|| {
            let ctx = world.context.clone();
            let link = Arc::clone(&transport);
            let interval = config.stream.loop_command_interval();
            let channels = u64::from(config.stream.channel_count.max(1));
            tokio::spawn(async move {
                run_command_loop(
                    &ctx,
                    &*link,
                    interval,
                    move |i| {
                        let n = (i % channels) as u32 + 1;
                        MoveCommand::new(n, (i % 11) as f64 / 10.0).envelope().ok()
                    },
                    stop_rx,
                )
                .await
            })
        });

        let mut sliders = SliderCommands::new(config.stream.channel_count, config.stream.ui_command_interval());
        let total_ticks = config.total_ticks();
        let half = total_ticks / 2;
        let mut commands_sent = 0u64;

        for tick in 0..total_ticks {
            if scenario == ScenarioId::Dropout && tick == half {
                info!("Device dropping the link at t={:.2}s", world.oracle.time());
                world.server.close();
                break;
            }

            world.tick().await?;

            if scenario == ScenarioId::Steady {
                commands_sent += drag_sliders(&mut sliders, tick, &config, &world, &transport).await?;
            }
            if scenario == ScenarioId::Sweep && tick == half {
                debug!("Stopping command loop at t={:.2}s", world.oracle.time());
                stop_tx.send_replace(true);
            }

            // Let the router and the command loop catch up with this tick
            tokio::task::yield_now().await;
        }

        if let Some(handle) = sweep {
            stop_tx.send_replace(true);
            commands_sent += handle.await.map_err(|e| SimError::Task(e.to_string()))??;
        }
        if world.server.is_open() {
            world.apply_commands();
            world.server.close();
        }

        let (router, outcome) = session.await.map_err(|e| SimError::Task(e.to_string()))?;
        let ended = router.has_ended();
        let late_send = router.send(MoveCommand::new(1, 0.5).envelope()?).await;
        let scene = router.into_backend().into_recording();
        let stats = outcome?;

        let mut failures = check_session(scenario, &config, &stats, &world, &scene, commands_sent);
        if !ended {
            failures.push("router did not end the session after the link closed".to_string());
        }
        if !matches!(late_send, Err(RouterError::NotLive(_))) {
            failures.push(format!("send after close returned {:?}", late_send));
        }

        let metrics = ScenarioMetrics {
            router: stats,
            world: world.stats().clone(),
            server: world.server.stats().clone(),
            commands_sent,
            lines: scene.line_count(),
            max_gyro_points: max_gyro_points(&scene),
        };
        Ok(self.finish(scenario, &world, failures, metrics, scene))
    }

    fn finish(
        &self,
        scenario: ScenarioId,
        world: &SimWorld,
        failures: Vec<String>,
        metrics: ScenarioMetrics,
        scene: RecordingBackend,
    ) -> SessionOutcome {
        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failures.is_empty(),
            total_ticks: world.stats().ticks,
            final_time_secs: world.context.now_secs(),
            failure_reason: (!failures.is_empty()).then(|| failures.join("; ")),
            metrics,
        };
        SessionOutcome { result, scene }
    }
}

/// Sweeps one slider at a time through a sine, three seconds on and three off.
async fn drag_sliders(
    sliders: &mut SliderCommands,
    tick: u64,
    config: &SimConfig,
    world: &SimWorld,
    transport: &LoopbackTransport,
) -> Result<u64, SimError> {
    let now = world.context.now();
    let t = tick as f64 * config.tick_dt();
    let window = (t / 3.0) as u64;

    let mut commands = Vec::new();
    if window % 2 == 0 {
        let n = (window / 2 % u64::from(config.stream.channel_count.max(1))) as u32 + 1;
        let value = 0.5 + 0.4 * (t * 1.7).sin();
        if let Ok(Some(command)) = sliders.input(n, value, now) {
            commands.push(command);
        }
    }
    commands.extend(sliders.flush(now));

    let mut sent = 0;
    for command in commands {
        transport.send(command.envelope()?).await?;
        sent += 1;
    }
    Ok(sent)
}

fn max_gyro_points(scene: &RecordingBackend) -> usize {
    let gyro = ScopeId::new(GYRO_SCOPE);
    [gyro.child("acceleration"), gyro.child("rotation")]
        .iter()
        .flat_map(|scope| scene.lines_in(scope))
        .map(|(_, line)| line.points.len())
        .max()
        .unwrap_or(0)
}

fn check_link_failure(
    outcome: &Result<RouterStats, RouterError>,
    ended: bool,
    scene: &RecordingBackend,
    world: &SimWorld,
) -> Vec<String> {
    let mut failures = Vec::new();

    if !matches!(outcome, Err(RouterError::Transport(_))) {
        failures.push(format!("expected a transport error, got {:?}", outcome));
    }
    if !ended {
        failures.push("session did not end".to_string());
    }
    if scene.connection() != Some(ConnectionState::Disconnected) {
        failures.push(format!("final connection state {:?}", scene.connection()));
    }
    if scene.line_count() > 0 {
        failures.push(format!("{} lines drawn without a link", scene.line_count()));
    }
    if world.stats().ticks > 0 {
        failures.push("device ticked without a link".to_string());
    }
    failures
}

fn check_session(
    scenario: ScenarioId,
    config: &SimConfig,
    stats: &RouterStats,
    world: &SimWorld,
    scene: &RecordingBackend,
    commands_sent: u64,
) -> Vec<String> {
    let mut failures = Vec::new();
    let emitted = world.stats();

    if stats.subscriptions_sent != 3 {
        failures.push(format!("{} subscriptions sent, expected 3", stats.subscriptions_sent));
    }
    if stats.unrouted > 0 {
        failures.push(format!("{} frames had no handler", stats.unrouted));
    }
    if stats.dropped != emitted.corrupt_frames {
        failures.push(format!(
            "{} frames dropped but {} were corrupt",
            stats.dropped, emitted.corrupt_frames
        ));
    }
    let valid = emitted.gyro_samples + emitted.position_reports + emitted.time_events;
    if stats.handled != valid {
        failures.push(format!("{} frames handled out of {} valid", stats.handled, valid));
    }
    if scene.stats().orphan_updates > 0 {
        failures.push(format!("{} updates to unknown handles", scene.stats().orphan_updates));
    }

    // Gyro plots: one line per axis, bounded by the coalescing window
    let gyro = ScopeId::new(GYRO_SCOPE);
    for group in ["acceleration", "rotation"] {
        let lines = scene.lines_in(&gyro.child(group)).len();
        if emitted.gyro_samples > 0 && lines != 3 {
            failures.push(format!("{} {} lines, expected 3", lines, group));
        }
    }
    let bound = (config.stream.retention_secs / config.stream.coalesce_threshold_secs).ceil() as usize + 1;
    let max_points = max_gyro_points(scene);
    if max_points > bound {
        failures.push(format!("gyro line holds {} points, bound is {}", max_points, bound));
    }

    // Servo plots: one line per channel, spanning the whole history once a
    // report has aged out of it
    let history = config.stream.history_secs;
    let spans_history = config.duration_secs > history + config.servo_report_secs + config.tick_dt();
    let servos = ScopeId::new(SERVO_SCOPE);
    if scenario != ScenarioId::Dropout {
        for n in 1..=config.stream.channel_count {
            let lines = scene.lines_in(&servos.child(n));
            let Some((_, line)) = lines.first() else {
                failures.push(format!("servo {} has no line", n));
                continue;
            };
            if lines.len() != 1 {
                failures.push(format!("servo {} has {} lines", n, lines.len()));
            }
            if spans_history && line.points.first().map(|p| p.x) != Some(-history) {
                failures.push(format!("servo {} line does not start at -{}s", n, history));
            }
            if line.points.last().map(|p| p.x) != Some(0.0) {
                failures.push(format!("servo {} line does not end at now", n));
            }
        }
        let sliders = scene.controls_in(&servos).len();
        if sliders != config.stream.channel_count as usize {
            failures.push(format!("{} sliders, expected {}", sliders, config.stream.channel_count));
        }
    }

    match scenario {
        ScenarioId::Steady => {
            if commands_sent == 0 {
                failures.push("no slider commands were sent".to_string());
            }
        }
        ScenarioId::Burst => {
            // The last partial burst is still held by the device
            let expected = config.total_ticks() * 20;
            if emitted.gyro_samples + u64::from(config.gyro_burst) <= expected {
                failures.push(format!("only {} burst samples emitted", emitted.gyro_samples));
            }
        }
        ScenarioId::Malformed => {
            if emitted.corrupt_frames == 0 {
                failures.push("no corrupt frames were injected".to_string());
            }
        }
        ScenarioId::Sweep => {
            let interval = config.stream.loop_command_interval().as_secs_f64();
            let stopped_at = (config.total_ticks() / 2 + 1) as f64 * config.tick_dt();
            let limit = (stopped_at / interval).floor() as u64 + 1;
            if commands_sent == 0 || commands_sent > limit {
                failures.push(format!("command loop sent {} commands, limit {}", commands_sent, limit));
            }
        }
        ScenarioId::Dropout => {
            if emitted.ticks != config.total_ticks() / 2 {
                failures.push(format!("device ran {} ticks before dropping", emitted.ticks));
            }
        }
        _ => {}
    }

    if emitted.commands_applied != commands_sent {
        failures.push(format!(
            "device applied {} of {} commands",
            emitted.commands_applied, commands_sent
        ));
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(42).with_duration(12.0)
    }

    #[test]
    fn test_steady_passes() {
        let result = runner().run(ScenarioId::Steady);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.commands_sent > 0);
        assert_eq!(result.metrics.router.dropped, 0);
        assert_eq!(result.total_ticks, 600);
    }

    #[test]
    fn test_malformed_frames_are_counted() {
        let result = runner().run(ScenarioId::Malformed);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.world.corrupt_frames > 0);
        assert_eq!(result.metrics.router.dropped, result.metrics.world.corrupt_frames);
    }

    #[test]
    fn test_burst_stays_bounded() {
        let result = runner().run(ScenarioId::Burst);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.max_gyro_points <= 301);
    }

    #[test]
    fn test_sweep_stops_on_signal() {
        let result = runner().run(ScenarioId::Sweep);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.world.commands_applied, result.metrics.commands_sent);
    }

    #[test]
    fn test_dropout_ends_session() {
        let outcome = runner().run_session(ScenarioId::Dropout);
        assert!(outcome.result.passed, "{:?}", outcome.result.failure_reason);
        assert!(!outcome.scene.is_live());
    }

    #[test]
    fn test_link_failures_end_without_hanging() {
        for scenario in [ScenarioId::Rejected, ScenarioId::Stalled] {
            let result = runner().run(scenario);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
            assert_eq!(result.total_ticks, 0);
        }
    }

    #[test]
    fn test_same_seed_replays_same_session() {
        let a = runner().run(ScenarioId::Malformed);
        let b = runner().run(ScenarioId::Malformed);
        assert_eq!(a.metrics.world, b.metrics.world);
        assert_eq!(a.metrics.router, b.metrics.router);
    }
}
