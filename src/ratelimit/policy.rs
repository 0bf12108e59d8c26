//! Whitelist and blacklist matching.
//!
//! A list holds literal addresses and CIDR ranges as configured. An IP
//! matches an entry when it is string-equal to the entry, or when the entry
//! is a CIDR range containing the parsed IP. Entries with a `/` that do not
//! parse as CIDR never match anything; they are reported once when the list
//! is built and otherwise ignored.

use std::net::IpAddr;

use ipnet::IpNet;
use tracing::warn;

/// A single configured list entry.
#[derive(Debug, Clone)]
struct ListEntry {
    /// The entry exactly as configured
    raw: String,
    /// Parsed range, present only for well-formed CIDR entries
    net: Option<IpNet>,
}

impl ListEntry {
    fn parse(raw: &str) -> Self {
        let net = if raw.contains('/') {
            raw.parse::<IpNet>().ok()
        } else {
            None
        };
        Self {
            raw: raw.to_string(),
            net,
        }
    }

    /// Whether this entry is a usable IP literal or CIDR range.
    fn is_well_formed(&self) -> bool {
        if self.raw.contains('/') {
            self.net.is_some()
        } else {
            self.raw.parse::<IpAddr>().is_ok()
        }
    }
}

/// An ordered list of IP literals and CIDR ranges.
#[derive(Debug, Clone, Default)]
pub struct IpList {
    /// Human-readable list name used in logs
    name: &'static str,
    entries: Vec<ListEntry>,
    /// Whether any entry is a usable CIDR range
    has_ranges: bool,
}

impl IpList {
    /// Build a list from configured entries.
    pub fn new<S: AsRef<str>>(name: &'static str, entries: &[S]) -> Self {
        let entries: Vec<ListEntry> = entries
            .iter()
            .map(|e| ListEntry::parse(e.as_ref()))
            .collect();

        for entry in entries.iter().filter(|e| !e.is_well_formed()) {
            warn!(
                list = name,
                entry = %entry.raw,
                "Ignoring malformed IP list entry"
            );
        }

        let has_ranges = entries.iter().any(|e| e.net.is_some());
        Self {
            name,
            entries,
            has_ranges,
        }
    }

    /// The list name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of configured entries, malformed ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether `ip` matches any entry.
    pub fn contains(&self, ip: &str) -> bool {
        if self.entries.iter().any(|e| e.raw == ip) {
            return true;
        }

        if !self.has_ranges {
            return false;
        }

        // IPv4-mapped IPv6 addresses are compared as IPv4
        let addr = match ip.parse::<IpAddr>() {
            Ok(addr) => addr.to_canonical(),
            Err(_) => return false,
        };

        self.entries
            .iter()
            .filter_map(|e| e.net.as_ref())
            .any(|net| net.contains(&addr))
    }

    /// Entries that are neither an IP literal nor a valid CIDR range.
    pub fn malformed_entries(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.is_well_formed())
            .map(|e| e.raw.as_str())
    }
}
