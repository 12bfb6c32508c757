//! Core library for the agentic lending orchestrator.
//!
//! The interesting machinery lives in [`workflows::loan`]: a five-stage loan
//! application pipeline driven by a delayed-stage scheduler over pluggable
//! repository, queue, notifier, and authenticator contracts.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
