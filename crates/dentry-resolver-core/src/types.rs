// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for the dentry resolver

use serde::{Deserialize, Serialize};

pub use dentry_resolver_proto::{PathKey, PathLeaf, MAX_SEGMENT_LENGTH, SEGMENT_SLOT_SIZE};

/// Walker steps allowed in a single invocation.
pub const DR_MAX_ITERATION_DEPTH: usize = 58;

/// Chained invocations allowed for one resolution.
pub const DR_MAX_TAIL_CALL: u32 = 30;

/// Entries held by the segment store before LRU eviction kicks in.
pub const PATHNAMES_CAPACITY: usize = 64_000;

/// Status code reported for a starting key with a zero inode or mount.
pub const DENTRY_INVALID: i64 = -1;
/// Status code reported when a discarder matched the leaf or its parent.
pub const DENTRY_DISCARDED: i64 = -2;
/// Status code reported when the invocation ceiling cut the walk short.
pub const DENTRY_TRUNCATED: i64 = -3;

/// Filter class consulted against the two outermost segments of a walk.
///
/// Mirrors the event type a discarder was registered for; the value is
/// opaque to the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscarderType(pub u32);

/// Entry in the tail-call program table the walkers are chained through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ResolverProgram {
    /// Hook-triggered walker that populates the segment store.
    Kern = 0,
    /// External walker that copies cached segments to a caller buffer.
    Erpc = 1,
}

/// Completion handler selected by the hook that started a resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum CallbackSelector {
    Open = 0,
    SetAttr = 1,
    Mkdir = 2,
    Mount = 3,
    SecurityInodeRmdir = 4,
    SetXAttr = 5,
    Unlink = 6,
    LinkSrc = 7,
    LinkDst = 8,
    Rename = 9,
}

impl CallbackSelector {
    /// Raw selector meaning "no callback requested".
    pub const NONE: i32 = -1;

    pub const COUNT: usize = 10;

    pub const ALL: [CallbackSelector; Self::COUNT] = [
        CallbackSelector::Open,
        CallbackSelector::SetAttr,
        CallbackSelector::Mkdir,
        CallbackSelector::Mount,
        CallbackSelector::SecurityInodeRmdir,
        CallbackSelector::SetXAttr,
        CallbackSelector::Unlink,
        CallbackSelector::LinkSrc,
        CallbackSelector::LinkDst,
        CallbackSelector::Rename,
    ];

    /// Map a raw selector to a table slot. `-1` and anything out of range
    /// select nothing.
    pub fn from_raw(raw: i32) -> Option<Self> {
        usize::try_from(raw).ok().and_then(|idx| Self::ALL.get(idx).copied())
    }

    pub fn raw(self) -> i32 {
        self as i32
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for CallbackSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallbackSelector::Open => "open",
            CallbackSelector::SetAttr => "setattr",
            CallbackSelector::Mkdir => "mkdir",
            CallbackSelector::Mount => "mount",
            CallbackSelector::SecurityInodeRmdir => "rmdir",
            CallbackSelector::SetXAttr => "setxattr",
            CallbackSelector::Unlink => "unlink",
            CallbackSelector::LinkSrc => "link_src",
            CallbackSelector::LinkDst => "link_dst",
            CallbackSelector::Rename => "rename",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for CallbackSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|sel| sel.to_string() == s.to_lowercase())
            .ok_or_else(|| format!("unknown callback selector: {s}"))
    }
}

/// Discard rule engine consulted for the leaf and its immediate parent.
#[cfg_attr(test, mockall::automock)]
pub trait DiscardFilter: Send + Sync {
    /// Whether the inode is discarded for this class. `is_leaf` is set for
    /// the first segment of the walk only.
    fn is_discarded_by_inode(
        &self,
        discarder_type: DiscarderType,
        mount_id: u32,
        ino: u64,
        is_leaf: bool,
    ) -> bool;
}

/// Filter that never discards.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDiscarders;

impl DiscardFilter for NoDiscarders {
    fn is_discarded_by_inode(&self, _: DiscarderType, _: u32, _: u64, _: bool) -> bool {
        false
    }
}
