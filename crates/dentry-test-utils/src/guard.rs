// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Guard used by `#[logged_test]` to finalize a test log exactly once.

use std::path::{Path, PathBuf};

use crate::{TestLogError, TestLogger};

/// Owns a [`TestLogger`] for the duration of one test body.
///
/// Dropping the guard without calling [`finish_success`](Self::finish_success),
/// including during a panic unwind, records a failure.
pub struct TestLoggerGuard {
    logger: Option<TestLogger>,
    log_path: PathBuf,
}

impl TestLoggerGuard {
    pub fn new(test_name: &str) -> Result<Self, TestLogError> {
        let logger = TestLogger::new(test_name)?;
        let log_path = logger.log_path().to_path_buf();
        Ok(Self {
            logger: Some(logger),
            log_path,
        })
    }

    /// Logger for the test body.
    ///
    /// # Panics
    /// After the guard has been finalized.
    pub fn logger(&mut self) -> &mut TestLogger {
        match self.logger.as_mut() {
            Some(logger) => logger,
            None => panic!("test log {} already finalized", self.log_path.display()),
        }
    }

    pub fn finish_success(mut self) -> Result<PathBuf, TestLogError> {
        match self.logger.take() {
            Some(logger) => logger.finish_success(),
            None => Ok(self.log_path.clone()),
        }
    }

    pub fn finish_failure(mut self, reason: &str) -> Result<PathBuf, TestLogError> {
        match self.logger.take() {
            Some(logger) => logger.finish_failure(reason),
            None => Ok(self.log_path.clone()),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

impl Drop for TestLoggerGuard {
    fn drop(&mut self) {
        let Some(logger) = self.logger.take() else {
            return;
        };
        let reason = if std::thread::panicking() {
            "test panicked"
        } else {
            "guard dropped before finish_success"
        };
        if let Err(err) = logger.finish_failure(reason) {
            eprintln!("could not finalize test log {}: {err}", self.log_path.display());
        }
    }
}
