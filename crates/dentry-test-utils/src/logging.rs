// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-test log files
//!
//! Every test gets its own file under `target/test-logs/<date>/`. Passing
//! tests print a single line; failing tests print the log path and size so
//! the full trace can be opened directly.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TestLogError {
    #[error("test log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write test log {path}")]
    Write { path: PathBuf },

    #[error("invalid test name: {name}")]
    InvalidTestName { name: String },

    #[error("failed to encode test log record: {0}")]
    Json(#[from] serde_json::Error),
}

const MAX_TEST_NAME_LEN: usize = 200;

/// Writer for a single test's log file.
pub struct TestLogger {
    log_path: PathBuf,
    writer: BufWriter<File>,
    test_name: String,
    start_time: DateTime<Utc>,
}

impl TestLogger {
    pub fn new(test_name: &str) -> Result<Self, TestLogError> {
        validate_test_name(test_name)?;

        let log_path = create_unique_test_log(test_name)?;
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&log_path)?;

        let mut logger = Self {
            log_path,
            writer: BufWriter::new(file),
            test_name: test_name.to_string(),
            start_time: Utc::now(),
        };
        logger.write_header()?;
        Ok(logger)
    }

    /// Append a timestamped line and flush it.
    pub fn log(&mut self, message: &str) -> Result<(), TestLogError> {
        let timestamp = Utc::now().format("%H:%M:%S%.3f");
        writeln!(self.writer, "[{timestamp}] {message}").map_err(|_| self.write_error())?;
        self.writer.flush().map_err(|_| self.write_error())
    }

    /// Append `label: <pretty json>`.
    pub fn log_json<T: serde::Serialize>(
        &mut self,
        label: &str,
        data: &T,
    ) -> Result<(), TestLogError> {
        let json = serde_json::to_string_pretty(data)?;
        self.log(&format!("{label}: {json}"))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn finish_success(mut self) -> Result<PathBuf, TestLogError> {
        let elapsed = self.elapsed_secs();
        self.log(&format!("passed in {elapsed:.3}s"))?;
        self.writer.flush().map_err(|_| self.write_error())?;

        println!("ok {}", self.test_name);
        Ok(self.log_path)
    }

    pub fn finish_failure(mut self, reason: &str) -> Result<PathBuf, TestLogError> {
        let elapsed = self.elapsed_secs();
        self.log(&format!("failed after {elapsed:.3}s: {reason}"))?;
        self.writer.flush().map_err(|_| self.write_error())?;

        match fs::metadata(&self.log_path) {
            Ok(meta) => println!(
                "FAILED {} - log: {} ({} bytes)",
                self.test_name,
                self.log_path.display(),
                meta.len()
            ),
            Err(_) => println!("FAILED {} - log: {}", self.test_name, self.log_path.display()),
        }
        Ok(self.log_path)
    }

    fn elapsed_secs(&self) -> f64 {
        Utc::now().signed_duration_since(self.start_time).num_milliseconds() as f64 / 1000.0
    }

    fn write_error(&self) -> TestLogError {
        TestLogError::Write {
            path: self.log_path.clone(),
        }
    }

    fn write_header(&mut self) -> Result<(), TestLogError> {
        writeln!(self.writer, "=== Dentry Resolver Test Log ===")?;
        writeln!(self.writer, "Test: {}", self.test_name)?;
        writeln!(
            self.writer,
            "Started: {}",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(self.writer, "Process: {}", std::process::id())?;
        writeln!(
            self.writer,
            "Thread: {}",
            std::thread::current().name().unwrap_or("unnamed")
        )?;
        writeln!(self.writer, "===")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Reserve a fresh log file path for `test_name`, creating the dated
/// directory under `target/test-logs` if needed.
pub fn create_unique_test_log(test_name: &str) -> Result<PathBuf, TestLogError> {
    let now = Utc::now();
    let log_dir = find_workspace_root()
        .join("target")
        .join("test-logs")
        .join(now.format("%Y-%m-%d").to_string());
    fs::create_dir_all(&log_dir)?;

    let filename = format!(
        "{}-{}-{}.log",
        sanitize_filename(test_name),
        now.format("%H-%M-%S"),
        Uuid::new_v4()
    );
    Ok(log_dir.join(filename))
}

/// Nearest ancestor whose `Cargo.toml` declares a `[workspace]`, falling
/// back to the current directory.
fn find_workspace_root() -> PathBuf {
    let current = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    current
        .ancestors()
        .find(|dir| {
            fs::read_to_string(dir.join("Cargo.toml"))
                .map(|content| content.contains("[workspace]"))
                .unwrap_or(false)
        })
        .map(Path::to_path_buf)
        .unwrap_or(current)
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

fn validate_test_name(name: &str) -> Result<(), TestLogError> {
    if name.is_empty() || name.len() > MAX_TEST_NAME_LEN {
        return Err(TestLogError::InvalidTestName {
            name: name.chars().take(32).collect(),
        });
    }
    Ok(())
}
