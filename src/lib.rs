//! HTTP gateway for a prediction market.
//!
//! Handlers authenticate bearer tokens, throttle callers through one shared
//! sliding-window [`rate_limit::RateLimiter`], and forward market operations
//! to the contract relay. Question rewriting goes to an LLM backend.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod relay;
pub mod state;
pub mod throttle;
pub mod upstream;
pub mod worker;

pub use handlers::app;
