// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Validation for external resolution requests

use crate::messages::ResolveRequest;
use thiserror::Error;

/// Wire decoding or validation error
#[derive(Error, Debug)]
pub enum WireError {
    #[error("blob too short: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("SSZ decoding failed: {0}")]
    SszDecode(String),
    #[error("schema validation failed: {0}")]
    Schema(String),
}

/// Validate a decoded request before any state is seeded from it.
///
/// The starting identity is not checked here: an unknown or zero key is a
/// cache miss reported to the caller, not a malformed request.
pub fn validate_request(request: &ResolveRequest) -> Result<(), WireError> {
    if request.userspace_buffer == 0 {
        return Err(WireError::Schema(
            "output buffer address must not be null".to_string(),
        ));
    }
    Ok(())
}

/// Decode and validate a request blob in one step.
pub fn parse_request(blob: &[u8]) -> Result<ResolveRequest, WireError> {
    let request = ResolveRequest::from_blob(blob)?;
    validate_request(&request)?;
    Ok(request)
}
