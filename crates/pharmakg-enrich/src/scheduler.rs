//! Call scheduling policy for the external AI service.
//!
//! The service enforces a global per-minute call budget. Every AI call made
//! by the pipeline first awaits `CallScheduler::before_call`; swapping the
//! policy (e.g. for a token bucket) does not touch the callers.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[async_trait]
pub trait CallScheduler: Send + Sync {
    /// Wait until the next AI call is allowed to start.
    async fn before_call(&self);
}

/// Fixed inter-call delay: the first call proceeds immediately, every later
/// call starts no earlier than `delay` after the previous one started.
pub struct FixedDelay {
    delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay, last_call: Mutex::new(None) }
    }

    /// Delay that keeps a single worker within `requests_per_minute`.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1) as u64;
        Self::new(Duration::from_millis(60_000 / rpm))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl CallScheduler for FixedDelay {
    async fn before_call(&self) {
        // Held across the sleep so concurrent callers queue up behind it.
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.delay;
            if ready_at > Instant::now() {
                tracing::debug!(wait_ms = (ready_at - Instant::now()).as_millis() as u64, "Rate limit delay");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// No delay at all. For local backends and tests.
pub struct Unthrottled;

#[async_trait]
impl CallScheduler for Unthrottled {
    async fn before_call(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_spaces_calls() {
        let sched = FixedDelay::new(Duration::from_millis(500));
        let t0 = Instant::now();
        sched.before_call().await;
        assert_eq!(t0.elapsed(), Duration::ZERO);
        sched.before_call().await;
        sched.before_call().await;
        assert!(t0.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_when_delay_already_elapsed() {
        let sched = FixedDelay::new(Duration::from_millis(100));
        sched.before_call().await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        let t1 = Instant::now();
        sched.before_call().await;
        assert_eq!(t1.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_per_minute_delay() {
        assert_eq!(FixedDelay::per_minute(20).delay(), Duration::from_secs(3));
        assert_eq!(FixedDelay::per_minute(0).delay(), Duration::from_secs(60));
    }
}
