//! Core rate limiter implementation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::entry::{deadline_after, RateLimitEntry};
use super::policy::IpList;
use super::sweeper::{spawn_sweeper, SweeperHandle};
use crate::config::RateLimitConfig;

/// Per-IP admission control with allow/deny lists and progressive blocking.
///
/// Whitelisted IPs are always admitted and blacklisted IPs always refused,
/// without touching the counters. Everyone else is counted in fixed
/// one-minute windows; exceeding `requests_per_minute` blocks the IP for
/// `block_duration`. While blocked every request is refused. Once the block
/// has lapsed, requests inside the same window keep counting and re-block;
/// an IP is admitted again only when both the block has lapsed and the
/// window has expired, at which point the entry starts over from a clean
/// slate.
///
/// All state lives in this process. Separate instances, including replicas
/// of the same service, do not share counters.
pub struct RateLimiter {
    config: RateLimitConfig,
    whitelist: IpList,
    blacklist: IpList,
    /// Per-IP state, guarded by a single lock
    entries: RwLock<HashMap<String, RateLimitEntry>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter using the system clock.
    ///
    /// No sweeper is attached; see [`RateLimiter::start`].
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a new rate limiter reading time from `clock`.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let whitelist = IpList::new("whitelist", &config.whitelisted_ips);
        let blacklist = IpList::new("blacklist", &config.blacklisted_ips);

        debug!(
            requests_per_minute = config.requests_per_minute,
            block_duration = ?config.block_duration(),
            whitelist = whitelist.len(),
            blacklist = blacklist.len(),
            "Rate limiter created"
        );

        Self {
            config,
            whitelist,
            blacklist,
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Create a shared rate limiter and start its background sweeper.
    ///
    /// Must be called from within a Tokio runtime. The sweeper stops when the
    /// returned handle is shut down or dropped, or when the limiter is dropped.
    pub fn start(config: RateLimitConfig) -> (Arc<Self>, SweeperHandle) {
        let interval = config.cleanup_interval();
        let limiter = Arc::new(Self::new(config));
        let sweeper = spawn_sweeper(&limiter, interval);
        (limiter, sweeper)
    }

    /// Decide whether a request from `ip` is admitted.
    ///
    /// Records the request against the IP's current window as a side effect.
    pub fn is_allowed(&self, ip: &str) -> bool {
        // List checks never touch the table
        if self.is_whitelisted(ip) {
            trace!(ip = %ip, "Whitelisted IP admitted");
            return true;
        }

        if self.is_blacklisted(ip) {
            trace!(ip = %ip, "Blacklisted IP refused");
            return false;
        }

        let mut entries = self.entries.write();
        let now = self.clock.now();

        let entry = match entries.get_mut(ip) {
            Some(entry) => entry,
            None => {
                trace!(ip = %ip, "First request from IP");
                entries.insert(ip.to_string(), RateLimitEntry::new(now));
                return true;
            }
        };

        // A block holds even if its window has already run out
        if entry.is_blocked(now) {
            trace!(ip = %ip, "Blocked IP refused");
            return false;
        }

        if entry.window_expired(now) {
            entry.reset(now);
            return true;
        }

        entry.count = entry.count.saturating_add(1);

        if entry.count > self.config.requests_per_minute {
            let until = deadline_after(now, self.config.block_duration());
            entry.blocked_until = Some(until);
            debug!(
                ip = %ip,
                count = entry.count,
                limit = self.config.requests_per_minute,
                block_duration = ?self.config.block_duration(),
                "Rate limit exceeded, blocking IP"
            );
            return false;
        }

        true
    }

    /// Whether `ip` matches the whitelist.
    pub fn is_whitelisted(&self, ip: &str) -> bool {
        self.whitelist.contains(ip)
    }

    /// Whether `ip` matches the blacklist.
    pub fn is_blacklisted(&self, ip: &str) -> bool {
        self.blacklist.contains(ip)
    }

    /// Remove every entry whose window has ended and whose block, if any, has
    /// lapsed. Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let now = self.clock.now();
        let before = entries.len();

        entries.retain(|_, entry| !entry.is_stale(now));

        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "Swept expired rate limit entries");
        }
        evicted
    }

    /// The current state recorded for `ip`, if any.
    pub fn entry(&self, ip: &str) -> Option<RateLimitEntry> {
        self.entries.read().get(ip).copied()
    }

    /// Get the number of tracked IPs.
    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Forget all tracked IPs.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
