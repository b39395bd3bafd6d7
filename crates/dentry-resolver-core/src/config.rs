// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration types for the dentry resolver
//!
//! Defaults equal the limits existing consumers of the segment store and
//! output buffers depend on. Overrides exist so tests and the CLI can run
//! with a smaller store or tighter budgets.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{DR_MAX_ITERATION_DEPTH, DR_MAX_TAIL_CALL, PATHNAMES_CAPACITY};

/// Segment store sizing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathnamesConfig {
    pub capacity: usize,
}

impl Default for PathnamesConfig {
    fn default() -> Self {
        Self {
            capacity: PATHNAMES_CAPACITY,
        }
    }
}

/// Per-invocation and per-resolution walk budgets
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalkerConfig {
    pub max_iteration_depth: usize,
    pub max_tail_calls: u32,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_iteration_depth: DR_MAX_ITERATION_DEPTH,
            max_tail_calls: DR_MAX_TAIL_CALL,
        }
    }
}

/// Resolver configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    pub pathnames: PathnamesConfig,
    pub walker: WalkerConfig,
}

impl ResolverConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ResolverConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pathnames.capacity == 0 {
            return Err(ConfigError::Zero {
                field: "pathnames.capacity",
            });
        }
        if self.walker.max_iteration_depth == 0 {
            return Err(ConfigError::Zero {
                field: "walker.max_iteration_depth",
            });
        }
        // the unrolled walker cannot go deeper than the verifier allows
        if self.walker.max_iteration_depth > DR_MAX_ITERATION_DEPTH {
            return Err(ConfigError::TooLarge {
                field: "walker.max_iteration_depth",
                max: DR_MAX_ITERATION_DEPTH,
                value: self.walker.max_iteration_depth,
            });
        }
        if self.walker.max_tail_calls == 0 {
            return Err(ConfigError::Zero {
                field: "walker.max_tail_calls",
            });
        }
        Ok(())
    }
}
