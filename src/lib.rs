//! Tollgate - Per-Identifier Rate Limiting
//!
//! This crate implements an in-memory rate limiter that keeps one token bucket
//! per identifier in a bounded map, and a small HTTP file download service
//! whose requests are admitted through it.

pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod ratelimit;
