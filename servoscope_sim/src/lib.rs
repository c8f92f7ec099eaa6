//! Servoscope deterministic simulation harness
//!
//! Runs the client pipeline (router, buffers, plots, command loop) against a
//! simulated gyro-and-servo device over a loopback link, with every source
//! of non-determinism under control:
//! - **Time**: a virtual clock that advances only when the device ticks
//! - **Signals**: sensor noise and servo motion drawn from a seeded RNG
//! - **Link faults**: corrupt frames, dropouts and refused connects are
//!   scripted per scenario
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          SimWorld                             │
//! │  ┌──────────────┐   events    ┌──────────────┐                │
//! │  │ DeviceServer │────────────►│ChannelRouter │──► SimBackend  │
//! │  │              │◄────────────│  + handlers  │   (recording,  │
//! │  └──────▲───────┘  move-servo └──────────────┘    rerun)      │
//! │         │                                                     │
//! │  ┌──────┴───────┐          ┌──────────────┐                   │
//! │  │ SignalOracle │          │  SimContext  │ virtual clock     │
//! │  └──────────────┘          └──────────────┘                   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use servoscope_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_duration(20.0).run(ScenarioId::Steady);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod oracle;
mod runner;
mod server;
mod visualizer;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{ControlExport, LineExport, SceneExport};
pub use oracle::{ServoTruth, SignalOracle};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, SessionOutcome, GYRO_SCOPE, SERVO_SCOPE};
pub use server::{DeviceServer, ServerStats};
pub use visualizer::{RerunBackend, SimBackend};
pub use world::{SimConfig, SimWorld, WorldStats, GYRO_CHANNEL};
