// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Dentry resolver protocol: segment store and external request layouts
//!
//! This crate defines the byte layouts shared between the resolver and
//! out-of-band callers: the path key identity, the segment store entry,
//! the external resolution request blob and the 256-byte slot format of
//! the output buffer.

pub mod messages;
pub mod segments;
pub mod validation;

pub use messages::{PathKey, PathLeaf, ResolveRequest};
pub use segments::{join_segments, reaches_root, split_segments, SegmentSlots};
pub use validation::*;

/// Longest segment name stored, excluding the NUL terminator.
pub const MAX_SEGMENT_LENGTH: usize = 255;

/// Name stored for the filesystem root. An empty name under a zeroed
/// parent marks a truncated walk instead.
pub const ROOT_SEGMENT: &[u8] = b"/";

/// Stride of one segment slot in an output buffer.
pub const SEGMENT_SLOT_SIZE: usize = MAX_SEGMENT_LENGTH + 1;

pub fn encode_ssz(data: &impl ssz::Encode) -> Vec<u8> {
    data.as_ssz_bytes()
}

pub fn decode_ssz<T: ssz::Decode>(data: &[u8]) -> Result<T, ssz::DecodeError> {
    T::from_ssz_bytes(data)
}
