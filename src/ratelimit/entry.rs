//! Per-IP fixed-window state.

use std::time::{Duration, Instant};

/// Length of one counting window.
///
/// Fixed at one minute regardless of configuration.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Fallback horizon when a deadline does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(u32::MAX as u64);

/// `now + by`, saturating at a far-future instant instead of panicking.
pub fn deadline_after(now: Instant, by: Duration) -> Instant {
    now.checked_add(by)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Rate limit state tracked for a single client IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests seen in the current window
    pub count: u32,
    /// End of the current window
    pub reset_time: Instant,
    /// End of the active block, if any
    pub blocked_until: Option<Instant>,
}

impl RateLimitEntry {
    /// Start a fresh window at `now` with one request counted.
    pub fn new(now: Instant) -> Self {
        Self {
            count: 1,
            reset_time: now + WINDOW,
            blocked_until: None,
        }
    }

    /// Whether a block is in force at `now`.
    pub fn is_blocked(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    /// Whether the counting window has ended.
    ///
    /// `now == reset_time` still counts as inside the window.
    pub fn window_expired(&self, now: Instant) -> bool {
        now > self.reset_time
    }

    /// Whether the entry carries no live state and can be dropped.
    pub fn is_stale(&self, now: Instant) -> bool {
        self.window_expired(now) && self.blocked_until.map_or(true, |until| now > until)
    }

    /// Wipe the entry into a fresh window, clearing any block.
    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }

    /// Time left in the current window.
    pub fn duration_until_reset(&self, now: Instant) -> Duration {
        self.reset_time.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_starts_window() {
        let now = Instant::now();
        let entry = RateLimitEntry::new(now);

        assert_eq!(entry.count, 1);
        assert_eq!(entry.reset_time, now + WINDOW);
        assert!(entry.blocked_until.is_none());
        assert!(!entry.is_blocked(now));
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let now = Instant::now();
        let entry = RateLimitEntry::new(now);

        assert!(!entry.window_expired(entry.reset_time));
        assert!(entry.window_expired(entry.reset_time + Duration::from_nanos(1)));
    }

    #[test]
    fn test_block_boundary_is_exclusive() {
        let now = Instant::now();
        let mut entry = RateLimitEntry::new(now);
        let until = now + Duration::from_secs(10);
        entry.blocked_until = Some(until);

        assert!(entry.is_blocked(now));
        assert!(!entry.is_blocked(until));
    }

    #[test]
    fn test_stale_requires_expired_window_and_block() {
        let now = Instant::now();
        let mut entry = RateLimitEntry::new(now);
        let after_window = now + WINDOW + Duration::from_secs(1);

        assert!(!entry.is_stale(now));
        assert!(entry.is_stale(after_window));

        entry.blocked_until = Some(now + Duration::from_secs(600));
        assert!(!entry.is_stale(after_window));
        assert!(entry.is_stale(now + Duration::from_secs(601)));
    }

    #[test]
    fn test_stale_boundaries_are_strict() {
        let now = Instant::now();
        let mut entry = RateLimitEntry::new(now);

        // Window ends exactly now: still live
        assert!(!entry.is_stale(entry.reset_time));

        // Window over, block ends exactly now: still live
        let until = entry.reset_time + Duration::from_secs(30);
        entry.blocked_until = Some(until);
        assert!(!entry.is_stale(until));
        assert!(entry.is_stale(until + Duration::from_nanos(1)));
    }

    #[test]
    fn test_deadline_after_saturates() {
        let now = Instant::now();

        assert_eq!(deadline_after(now, Duration::from_secs(10)), now + Duration::from_secs(10));
        assert!(deadline_after(now, Duration::MAX) > now);
    }

    #[test]
    fn test_reset_clears_block() {
        let now = Instant::now();
        let mut entry = RateLimitEntry::new(now);
        entry.count = 7;
        entry.blocked_until = Some(now + Duration::from_secs(30));

        let later = now + Duration::from_secs(90);
        entry.reset(later);

        assert_eq!(entry, RateLimitEntry::new(later));
        assert_eq!(entry.duration_until_reset(later), WINDOW);
    }
}
