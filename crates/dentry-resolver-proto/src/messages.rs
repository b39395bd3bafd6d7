// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed-size message layouts for the dentry resolver

use serde::{Deserialize, Serialize};
use ssz::{Decode, Encode};
use ssz_derive::{Decode, Encode};

use crate::validation::WireError;
use crate::{MAX_SEGMENT_LENGTH, ROOT_SEGMENT, SEGMENT_SLOT_SIZE};

/// Identity of a filesystem object: inode within a mount, disambiguated by
/// the path generation when inode numbers get reused.
///
/// Encoded as 16 little-endian bytes: `ino`, `mount_id`, `path_id`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub struct PathKey {
    pub ino: u64,
    pub mount_id: u32,
    pub path_id: u32,
}

impl PathKey {
    /// Sentinel marking "no parent": the walk reached the root.
    pub const ROOT: PathKey = PathKey {
        ino: 0,
        mount_id: 0,
        path_id: 0,
    };

    pub const ENCODED_LEN: usize = 16;

    pub fn new(mount_id: u32, ino: u64, path_id: u32) -> Self {
        Self {
            ino,
            mount_id,
            path_id,
        }
    }

    pub fn is_root(&self) -> bool {
        self.ino == 0
    }

    /// A key the walker refuses to start from.
    pub fn is_invalid(&self) -> bool {
        self.ino == 0 || self.mount_id == 0
    }
}

impl std::fmt::Display for PathKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.mount_id, self.ino, self.path_id)
    }
}

/// Segment store entry: one path component plus the identity of its parent.
///
/// The name is a NUL-terminated byte string of at most
/// [`MAX_SEGMENT_LENGTH`] bytes kept in a fixed [`SEGMENT_SLOT_SIZE`] buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PathLeaf {
    pub parent: PathKey,
    pub name: [u8; SEGMENT_SLOT_SIZE],
}

impl PathLeaf {
    pub const ENCODED_LEN: usize = PathKey::ENCODED_LEN + SEGMENT_SLOT_SIZE;

    /// Build a leaf, truncating `name` at the first NUL or after
    /// [`MAX_SEGMENT_LENGTH`] bytes.
    pub fn new(parent: PathKey, name: &[u8]) -> Self {
        let mut buf = [0u8; SEGMENT_SLOT_SIZE];
        let len = name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name.len())
            .min(MAX_SEGMENT_LENGTH);
        buf[..len].copy_from_slice(&name[..len]);
        Self { parent, name: buf }
    }

    /// Entry for the filesystem root: named `/`, zeroed parent.
    pub fn root() -> Self {
        Self::new(PathKey::ROOT, ROOT_SEGMENT)
    }

    /// Empty name and zeroed parent. Written where a walk was cut short by
    /// the invocation ceiling; it never stands for the root.
    pub fn truncated() -> Self {
        Self {
            parent: PathKey::ROOT,
            name: [0u8; SEGMENT_SLOT_SIZE],
        }
    }

    /// Name bytes up to the NUL terminator.
    pub fn name_bytes(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_SEGMENT_LENGTH);
        &self.name[..len]
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_root() && self.name_bytes() == ROOT_SEGMENT
    }

    pub fn is_truncated(&self) -> bool {
        self.parent.is_root() && self.name[0] == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(&self.parent.as_ssz_bytes());
        out.extend_from_slice(&self.name);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < Self::ENCODED_LEN {
            return Err(WireError::Truncated {
                expected: Self::ENCODED_LEN,
                actual: data.len(),
            });
        }
        let parent = PathKey::from_ssz_bytes(&data[..PathKey::ENCODED_LEN])
            .map_err(|e| WireError::SszDecode(format!("{e:?}")))?;
        let mut name = [0u8; SEGMENT_SLOT_SIZE];
        name.copy_from_slice(&data[PathKey::ENCODED_LEN..Self::ENCODED_LEN]);
        Ok(Self { parent, name })
    }
}

impl std::fmt::Debug for PathLeaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathLeaf")
            .field("parent", &self.parent)
            .field("name", &self.name_lossy())
            .finish()
    }
}

/// External resolution request: the identity to start from followed by the
/// address of the caller's output buffer.
///
/// Both resolve-path and resolve-segment share this 24-byte layout. Callers
/// may deliver it inside a larger blob; only the leading bytes are read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ResolveRequest {
    pub key: PathKey,
    pub userspace_buffer: u64,
}

impl ResolveRequest {
    pub const ENCODED_LEN: usize = PathKey::ENCODED_LEN + 8;

    pub fn new(key: PathKey, userspace_buffer: u64) -> Self {
        Self {
            key,
            userspace_buffer,
        }
    }

    pub fn to_blob(&self) -> Vec<u8> {
        self.as_ssz_bytes()
    }

    pub fn from_blob(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < Self::ENCODED_LEN {
            return Err(WireError::Truncated {
                expected: Self::ENCODED_LEN,
                actual: data.len(),
            });
        }
        Self::from_ssz_bytes(&data[..Self::ENCODED_LEN])
            .map_err(|e| WireError::SszDecode(format!("{e:?}")))
    }
}
