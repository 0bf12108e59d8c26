//! Background eviction of stale rate limit entries.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Longest period the sweeper will wait between passes.
const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Handle to a running sweeper task.
///
/// Dropping the handle stops the task at its next wake-up.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a task that calls [`RateLimiter::sweep_expired`] every `interval`.
///
/// The task holds only a weak reference to the limiter and exits once the
/// limiter has been dropped.
pub fn spawn_sweeper(limiter: &Arc<RateLimiter>, interval: Duration) -> SweeperHandle {
    let (shutdown, rx) = watch::channel(false);
    let limiter = Arc::downgrade(limiter);
    let task = tokio::spawn(run_sweeper(limiter, interval, rx));
    SweeperHandle { shutdown, task }
}

async fn run_sweeper(
    limiter: Weak<RateLimiter>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    // tokio intervals panic on a zero period
    let period = interval.clamp(Duration::from_millis(1), MAX_PERIOD);
    let now = tokio::time::Instant::now();
    let start = now.checked_add(period).unwrap_or(now);
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval = ?period, "Rate limit sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(limiter) = limiter.upgrade() else {
                    debug!("Rate limiter dropped, stopping sweeper");
                    break;
                };
                let evicted = limiter.sweep_expired();
                if evicted > 0 {
                    info!(
                        evicted,
                        remaining = limiter.entry_count(),
                        "Rate limit sweeper evicted stale entries"
                    );
                }
            }
            // Fires on shutdown() and when the handle is dropped
            _ = shutdown.changed() => break,
        }
    }

    info!("Rate limit sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::ratelimit::clock::ManualClock;

    fn limiter_with_clock() -> (Arc<RateLimiter>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::with_clock(
            RateLimitConfig::default(),
            clock.clone(),
        ));
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_sweeper_evicts_on_tick() {
        let (limiter, clock) = limiter_with_clock();
        limiter.is_allowed("1.2.3.4");
        clock.advance(Duration::from_secs(61));

        let handle = spawn_sweeper(&limiter, Duration::from_millis(10));

        let mut waited = Duration::ZERO;
        while limiter.entry_count() > 0 && waited < Duration::from_secs(2) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += Duration::from_millis(10);
        }

        assert_eq!(limiter.entry_count(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_keeps_live_entries() {
        let (limiter, _clock) = limiter_with_clock();
        limiter.is_allowed("1.2.3.4");

        let handle = spawn_sweeper(&limiter, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(limiter.entry_count(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let (limiter, _clock) = limiter_with_clock();
        let handle = spawn_sweeper(&limiter, Duration::from_secs(300));

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("sweeper did not stop");
    }

    #[tokio::test]
    async fn test_dropping_limiter_stops_task() {
        let (limiter, _clock) = limiter_with_clock();
        let handle = spawn_sweeper(&limiter, Duration::from_millis(5));
        drop(limiter);

        let mut waited = Duration::ZERO;
        while !handle.is_finished() && waited < Duration::from_secs(2) {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += Duration::from_millis(5);
        }

        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_huge_interval_keeps_task_alive() {
        let (limiter, _clock) = limiter_with_clock();
        let handle = spawn_sweeper(&limiter, Duration::MAX);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("sweeper did not stop");
    }

    #[tokio::test]
    async fn test_start_with_oversized_cleanup_interval() {
        let config = RateLimitConfig {
            cleanup_interval_secs: u64::MAX,
            ..Default::default()
        };
        let (limiter, handle) = RateLimiter::start(config);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert!(limiter.is_allowed("1.2.3.4"));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_attaches_sweeper() {
        let config = RateLimitConfig {
            cleanup_interval_secs: 1,
            ..Default::default()
        };
        let (limiter, handle) = RateLimiter::start(config);

        assert!(limiter.is_allowed("1.2.3.4"));
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
