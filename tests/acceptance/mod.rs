//! Integration tests for scheduler acceptance testing.
//!
//! These tests exercise the public scheduler surface end to end:
//! - Periodic dispatch accuracy and interval metrics
//! - Lifecycle transitions (start, stop, restart, drop)
//! - Fault escalation (callback failures, timeliness faults)

mod common;
mod fault_test;
mod lifecycle_test;
