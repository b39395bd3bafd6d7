// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the dentry resolver

use dentry_resolver_proto::WireError;

/// Failures that prevent a resolution from producing an outcome at all.
///
/// Terminal resolution outcomes (invalid key, discarded, truncated, cache
/// miss, user write failure) are values carried by the outcome types, not
/// errors.
#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
    #[error("malformed request: {0}")]
    Request(#[from] WireError),
    #[error("external resolution session already in flight")]
    SessionBusy,
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration loading and validation errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field} must not exceed {max} (got {value})")]
    TooLarge {
        field: &'static str,
        max: usize,
        value: usize,
    },
}

pub type ResolverResult<T> = Result<T, ResolverError>;
