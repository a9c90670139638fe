//! Shared service plumbing: env config, tracing, health checks, HTTP middleware.

pub mod config;
pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
