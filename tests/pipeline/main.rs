//! Pipeline Tests
//!
//! End-to-end tests through the public `conduit` API:
//! - Contract calls against the in-memory driver
//! - Transactions spanning several calls
//! - Mock sessions standing in for real ones
//! - Shared engines under concurrent use
//! - Property checks on binding rules

mod common;

mod concurrency;
mod end_to_end;
mod properties;
