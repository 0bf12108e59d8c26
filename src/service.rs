//! Admission service tying IP extraction to the rate limiter.
//!
//! This is the boundary a transport layer talks to: it passes in request
//! metadata and renders the returned decision however it likes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument, warn};

use crate::client_ip::{client_ip, is_valid_ip};
use crate::config::ServiceConfig;
use crate::ratelimit::RateLimiter;

/// Request metadata needed to make an admission decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionRequest {
    /// Transport-level peer address, usually `ip:port`
    pub remote_addr: String,
    /// Request headers keyed by lowercase name
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub headers: HashMap<String, String>,
}

/// Collects headers under lowercase names; the first of several case
/// variants of one name wins.
fn deserialize_headers<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct HeaderVisitor;

    impl<'de> Visitor<'de> for HeaderVisitor {
        type Value = HashMap<String, String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of header names to values")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut headers = HashMap::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, value)) = map.next_entry::<String, String>()? {
                headers.entry(name.to_ascii_lowercase()).or_insert(value);
            }
            Ok(headers)
        }
    }

    deserializer.deserialize_map(HeaderVisitor)
}

impl AdmissionRequest {
    /// A request with no headers.
    pub fn from_remote_addr(remote_addr: impl Into<String>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            headers: HashMap::new(),
        }
    }

    /// Set a header, replacing any earlier value under the same name in any
    /// letter case.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.headers.insert(name, value.into());
        self
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Request may proceed
    Allowed,
    /// Refused by a list or the rate limit
    Denied,
    /// The client IP could not be parsed
    InvalidIp,
}

impl Verdict {
    /// HTTP status code a transport would typically answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Verdict::Allowed => 200,
            Verdict::Denied => 429,
            Verdict::InvalidIp => 400,
        }
    }
}

/// Decision returned to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    /// The client IP the decision was made for
    pub ip: String,
    /// Whether the request may proceed
    pub allowed: bool,
    /// Why
    pub verdict: Verdict,
    /// Suggested response status
    pub status: u16,
}

impl AdmissionDecision {
    fn new(ip: String, verdict: Verdict) -> Self {
        Self {
            ip,
            allowed: verdict == Verdict::Allowed,
            verdict,
            status: verdict.status_code(),
        }
    }
}

/// Per-request admission checks against a shared [`RateLimiter`].
#[derive(Clone)]
pub struct AdmissionService {
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter>,
    config: ServiceConfig,
}

impl AdmissionService {
    /// Create a new AdmissionService with the given rate limiter.
    pub fn new(rate_limiter: Arc<RateLimiter>, config: ServiceConfig) -> Self {
        Self {
            rate_limiter,
            config,
        }
    }

    /// The underlying rate limiter.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Decide whether `request` is admitted.
    #[instrument(skip(self, request), fields(remote_addr = %request.remote_addr))]
    pub fn check(&self, request: &AdmissionRequest) -> AdmissionDecision {
        let ip = client_ip(&request.headers, &request.remote_addr);

        if self.config.reject_invalid_ip && !is_valid_ip(&ip) {
            warn!(ip = %ip, "Rejecting request with invalid client IP");
            return AdmissionDecision::new(ip, Verdict::InvalidIp);
        }

        let verdict = if self.rate_limiter.is_allowed(&ip) {
            Verdict::Allowed
        } else {
            Verdict::Denied
        };

        debug!(ip = %ip, verdict = ?verdict, "Admission decision made");

        AdmissionDecision::new(ip, verdict)
    }
}
