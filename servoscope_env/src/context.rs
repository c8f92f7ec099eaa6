//! Core environment context trait for Servoscope components.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for time and task scheduling.
///
/// This trait abstracts the "real world" clock so that the command loop and
/// the router can run both against tokio and against a virtual clock in the
/// simulation harness.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - manually advanced virtual clock
#[async_trait]
pub trait ScopeContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Sample timestamps and retention horizons are measured against this
    /// clock. In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Current time as fractional seconds, the unit samples are stamped in.
    fn now_secs(&self) -> f64 {
        self.now().as_secs_f64()
    }
}
