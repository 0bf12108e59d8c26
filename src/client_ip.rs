//! Client IP extraction from request metadata.
//!
//! These helpers are transport-neutral: the caller hands over whatever
//! headers it has plus the socket peer address, and gets back the best guess
//! at the originating client. Forwarding headers are trusted as given, so
//! deployments should strip them at the edge if clients can reach the
//! service directly.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::net::IpAddr;

/// Proxy chain header; the left-most entry is the original client.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Single-address header set by common reverse proxies.
pub const X_REAL_IP: &str = "x-real-ip";
/// Cloudflare's connecting client header.
pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";

/// Read access to request headers by case-insensitive name.
pub trait HeaderSource {
    /// The first value of header `name`, if present.
    fn header(&self, name: &str) -> Option<&str>;
}

/// An exact key match wins. Otherwise any key equal ignoring ASCII case is
/// used, and if the map holds several case variants of the same name which
/// one is returned is unspecified. Lowercase the keys up front to avoid that.
impl<S: BuildHasher> HeaderSource for HashMap<String, String, S> {
    fn header(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.get(name) {
            return Some(value.as_str());
        }
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl<K: AsRef<str>, V: AsRef<str>> HeaderSource for [(K, V)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.as_ref().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref())
    }
}

impl<K: AsRef<str>, V: AsRef<str>> HeaderSource for Vec<(K, V)> {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

/// Determine the client IP for a request.
///
/// Sources are consulted in order: the first `X-Forwarded-For` entry,
/// `X-Real-IP`, `CF-Connecting-IP`, then the host part of `remote_addr`.
/// Empty values fall through to the next source. If `remote_addr` has no
/// port to strip it is returned unchanged, however malformed; use
/// [`is_valid_ip`] to check the result.
pub fn client_ip<H: HeaderSource + ?Sized>(headers: &H, remote_addr: &str) -> String {
    if let Some(forwarded) = headers.header(X_FORWARDED_FOR) {
        let first = forwarded.split(',').next().unwrap_or_default().trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    for name in [X_REAL_IP, CF_CONNECTING_IP] {
        if let Some(value) = headers.header(name) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    match split_host(remote_addr) {
        Some(host) => host.to_string(),
        None => remote_addr.to_string(),
    }
}

/// Whether `s` is a syntactically valid IPv4 or IPv6 literal.
pub fn is_valid_ip(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}

/// Split the host out of `host:port` or `[host]:port`.
///
/// Returns `None` when there is no port to strip, or when an unbracketed
/// host contains a colon (a bare IPv6 address).
fn split_host(addr: &str) -> Option<&str> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        tail.strip_prefix(':')?;
        return Some(host);
    }

    let (host, _port) = addr.rsplit_once(':')?;
    if host.contains(':') {
        return None;
    }
    Some(host)
}
