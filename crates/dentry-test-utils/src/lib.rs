// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Dentry Resolver Test Utilities
//!
//! Shared test scaffolding: one log file per test, the `#[logged_test]`
//! attribute that wires it up, and assertion macros that write to it.

extern crate self as dentry_test_utils;

pub mod guard;
pub mod logging;
pub mod macros;

pub use dentry_test_utils_macros::logged_test;
pub use guard::TestLoggerGuard;
pub use logging::{create_unique_test_log, TestLogError, TestLogger};
