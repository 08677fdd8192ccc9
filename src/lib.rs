//! Floodgate - Distributed Sliding-Window Rate Limiting
//!
//! This crate implements a request-admission gate that bounds how many
//! operations a caller may perform within a rolling time window. Counts are
//! shared across process instances through Redis; when Redis is unreachable
//! the gate degrades to a process-local approximation behind a health
//! circuit breaker, and never surfaces a backend failure to the protected
//! operation.

pub mod config;
pub mod error;
pub mod ratelimit;
