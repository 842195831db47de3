//! Cancellable one-shot timer for actor select loops

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};

/// Explicit timer handle: armed, cancelled and polled by its owner
///
/// A disarmed timer never fires, so it can sit in a `select!` unconditionally.
#[derive(Debug, Default)]
pub struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) the timer to fire `after` from now
    pub fn arm(&mut self, after: Duration) {
        self.sleep = Some(Box::pin(sleep_until(Instant::now() + after)));
    }

    /// Disarms the timer; returns whether it was armed
    pub fn cancel(&mut self) -> bool {
        self.sleep.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|sleep| sleep.deadline())
    }

    /// Resolves once the armed deadline passes and disarms the timer
    ///
    /// Cancel safe: dropping the future leaves the timer armed.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_disarms() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_millis(500));
        assert!(timer.is_armed());

        let start = Instant::now();
        timer.fired().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(502));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_timer_never_fires() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_millis(10));
        assert!(timer.cancel());
        assert!(!timer.cancel());

        let result = timeout(Duration::from_secs(60), timer.fired()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_moves_deadline() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_millis(10));
        let first = timer.deadline().unwrap();

        timer.arm(Duration::from_millis(100));
        assert_eq!(timer.deadline().unwrap() - first, Duration::from_millis(90));
    }
}
