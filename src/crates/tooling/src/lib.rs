//! # tooling - ambient helpers for flowgraph
//!
//! Concerns the execution core deliberately leaves to callers:
//!
//! - [`async_utils::timeout`]: soft per-task timeouts (the scheduler
//!   imposes none; wrap vertex tasks that need one);
//! - [`async_utils::retry`]: bounded exponential backoff for provider
//!   calls retried at the caller's discretion;
//! - [`logging`]: opt-in tracing subscriber setup and timing helpers.

pub mod async_utils;
pub mod logging;

pub use async_utils::retry::{retry, RetryPolicy};
pub use async_utils::timeout::{with_timeout, TimeoutError};
