//! Servoscope Core - live telemetry and actuator plotting pipeline
//!
//! This library turns a bursty stream of device events into a bounded set of
//! persistent plot objects:
//! 1. **Coalescing**: samples arriving faster than the display can redraw are
//!    merged by duration-weighted average inside a retention window
//! 2. **Sparse signals**: actuator positions are drawn edge to edge using the
//!    newest evicted value as the window's left boundary
//! 3. **Reconciliation**: each redraw maps data onto stable visual handles,
//!    reporting creations and removals to the rendering backend
//!
//! The [`ChannelRouter`] ties these together over an
//! [`EventTransport`](servoscope_env::EventTransport).

pub mod actuator;
pub mod coalesce;
pub mod command;
pub mod config;
pub mod error;
pub mod plot;
pub mod reconcile;
pub mod render;
pub mod router;
pub mod sample;
pub mod sliding;
pub mod telemetry;

// Re-export key types for convenience
pub use actuator::ActuatorPanel;
pub use coalesce::{Appended, CoalescingBuffer};
pub use command::{run_command_loop, CommandThrottle, MoveCommand, SliderCommands};
pub use config::StreamConfig;
pub use error::{ConfigError, HandlerError, ReconcileError, RouterError, SampleError};
pub use plot::{LinePlot, PlotConfig};
pub use reconcile::{Join, Reconciler, ScopeId, Selector, VisualHandle};
pub use render::{RecordingBackend, RenderBackend, Surface};
pub use router::{ChannelHandler, ChannelRouter, ConnectionState, Dispatch, RouterStats};
pub use sample::{Coalesce, PositionSample, Sample, SampleMessage};
pub use sliding::SlidingBuffer;
pub use telemetry::TelemetryPlot;
