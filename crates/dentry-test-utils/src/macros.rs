// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Assertions that leave a trace in the test log before panicking.

/// Assert a condition, recording the check and its result in `$logger`.
#[macro_export]
macro_rules! logged_assert {
    ($logger:expr, $condition:expr) => {
        $crate::logged_assert!($logger, $condition, stringify!($condition))
    };
    ($logger:expr, $condition:expr, $message:expr) => {{
        let passed = $condition;
        let line = format!("assert {}: {}", if passed { "ok" } else { "FAILED" }, $message);
        if let Err(err) = $logger.log(&line) {
            eprintln!("test log write failed: {err}");
        }
        if !passed {
            panic!("assertion failed: {}", $message);
        }
    }};
}

/// Equality assertion that records both operands in `$logger`.
#[macro_export]
macro_rules! logged_assert_eq {
    ($logger:expr, $left:expr, $right:expr) => {{
        let (left, right) = (&$left, &$right);
        let passed = *left == *right;
        let line = format!(
            "assert_eq {}: {} == {} (left: {:?}, right: {:?})",
            if passed { "ok" } else { "FAILED" },
            stringify!($left),
            stringify!($right),
            left,
            right
        );
        if let Err(err) = $logger.log(&line) {
            eprintln!("test log write failed: {err}");
        }
        if !passed {
            panic!("{}", line);
        }
    }};
}
