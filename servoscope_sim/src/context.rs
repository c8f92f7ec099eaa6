//! Simulation context implementing ScopeContext for deterministic testing.

use async_trait::async_trait;
use servoscope_env::ScopeContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Simulation context backed by a virtual clock.
///
/// Time only moves when the harness calls [`advance_time`](Self::advance_time).
/// `sleep` parks the caller until the clock reaches its deadline, so a
/// command loop sleeping on this context runs in lockstep with the
/// simulated device.
#[derive(Clone)]
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    clock: Arc<watch::Sender<u64>>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        let (clock, _) = watch::channel(0);
        Self {
            seed,
            clock: Arc::new(clock),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time, waking every sleeper whose deadline has passed.
    pub fn advance_time(&self, duration: Duration) {
        let step = duration.as_nanos() as u64;
        self.clock.send_modify(|t| *t = t.saturating_add(step));
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        self.clock.send_replace(time_ns);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.clock.borrow()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[async_trait]
impl ScopeContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        let deadline = self.time_ns().saturating_add(duration.as_nanos() as u64);
        let mut clock = self.clock.subscribe();

        while *clock.borrow_and_update() < deadline {
            // The sender lives as long as self
            if clock.changed().await.is_err() {
                return;
            }
        }
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::debug!("Spawning sim task {}", name);
        tokio::spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
        assert_eq!(ctx.now_secs(), 1.5);
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        // Both should see the same time
        assert_eq!(ctx1.now(), ctx2.now());
        assert_eq!(ctx2.seed(), 42);
    }

    #[tokio::test]
    async fn test_sleep_waits_for_virtual_clock() {
        let ctx = SimContext::new(7);
        let sleeper = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.sleep(Duration::from_millis(100)).await;
                ctx.now()
            })
        };

        tokio::task::yield_now().await;
        ctx.advance_time(Duration::from_millis(60));
        tokio::task::yield_now().await;
        assert!(!sleeper.is_finished());

        ctx.advance_time(Duration::from_millis(60));
        let woke_at = sleeper.await.unwrap();
        assert_eq!(woke_at, Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_zero_sleep_returns_immediately() {
        let ctx = SimContext::new(1);
        ctx.sleep(Duration::ZERO).await;
        assert_eq!(ctx.now(), Duration::ZERO);
    }
}
