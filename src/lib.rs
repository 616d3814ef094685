//! Relay - multi-provider AI request orchestrator
//!
//! This library routes agent runs across heterogeneous AI providers with
//! per-provider circuit breakers, retry with backoff, configured fallback
//! chains, an auditable decision trace with a human approval gate, and a
//! bounded-concurrency run queue.

pub mod circuit;
pub mod cli;
pub mod config;
pub mod logging;
pub mod provider;
pub mod queue;
pub mod routing;
pub mod store;
pub mod trace;
