//! Persistence integration tests.
//!
//! Debounce timing, single-flight flushing, retries, the final flush on
//! close, and crash safety of the on-disk snapshot. These run against a real
//! execution context and either an in-memory recording sink or a data
//! directory.

#[path = "../common/mod.rs"]
mod common;

mod crash_safety;
mod debounce;
mod lifecycle;
