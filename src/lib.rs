//! Ipwarden - Adaptive IP Rate Limiter
//!
//! This crate implements per-IP admission control for request-serving
//! processes: allow and deny lists with CIDR ranges, fixed one-minute
//! counting windows, a block penalty for clients that exceed their quota,
//! and a background sweeper that keeps the state table bounded.
//!
//! State is held in process memory only. Two instances never share
//! counters, so a client spread across replicas gets each replica's quota.

pub mod client_ip;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod service;
