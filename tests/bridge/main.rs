//! Bridge integration tests.
//!
//! End-to-end request/response behavior through the public handle: ordering
//! within a caller, batching, snapshot round trips, and what callers see when
//! the execution context goes away.

#[path = "../common/mod.rs"]
mod common;

mod consistency;
mod snapshot;
mod termination;
