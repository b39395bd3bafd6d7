// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bounded dentry walker
//!
//! One call to [`Walker::invoke`] is one budgeted invocation: at most
//! `max_depth` parent hops, each recording a segment in the store. Progress
//! is written back into the [`ResolverInput`] so the next invocation
//! resumes where this one stopped.

use crate::dentry::DentryView;
use crate::store::PathnameStore;
use tracing::{trace, warn};

use crate::types::{
    CallbackSelector, DiscardFilter, DiscarderType, PathKey, PathLeaf, MAX_SEGMENT_LENGTH,
};

/// Continuation state of one hook-triggered resolution.
#[derive(Clone, Debug)]
pub struct ResolverInput<H> {
    /// Identity of the dentry the next invocation starts from.
    pub key: PathKey,
    pub dentry: H,
    pub discarder_type: Option<DiscarderType>,
    /// Invocations consumed so far.
    pub iteration: u32,
    /// Last status code; see the `DENTRY_*` constants.
    pub ret: i64,
    /// Raw callback selector, `-1` for none.
    pub callback: i32,
}

impl<H: Copy> ResolverInput<H> {
    pub fn new(key: PathKey, dentry: H) -> Self {
        Self {
            key,
            dentry,
            discarder_type: None,
            iteration: 0,
            ret: 0,
            callback: CallbackSelector::NONE,
        }
    }

    pub fn with_discarder(mut self, discarder_type: DiscarderType) -> Self {
        self.discarder_type = Some(discarder_type);
        self
    }

    pub fn with_callback(mut self, callback: CallbackSelector) -> Self {
        self.callback = callback.raw();
        self
    }

    /// Set the raw selector as received from a hook, unchecked.
    pub fn with_raw_callback(mut self, callback: i32) -> Self {
        self.callback = callback;
        self
    }
}

/// Why a walker invocation stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkStatus {
    /// Starting key has a zero inode or mount; nothing was written.
    Invalid,
    /// A discarder matched the leaf or its parent.
    Discarded,
    /// The root was reached after this many steps.
    Resolved(usize),
    /// The step budget ran out before the root.
    MaxDepthReached,
}

pub struct Walker<'a, T: DentryView> {
    tree: &'a T,
    store: &'a PathnameStore,
    filter: &'a dyn DiscardFilter,
    max_depth: usize,
}

impl<'a, T: DentryView> Walker<'a, T> {
    pub fn new(
        tree: &'a T,
        store: &'a PathnameStore,
        filter: &'a dyn DiscardFilter,
        max_depth: usize,
    ) -> Self {
        Self {
            tree,
            store,
            filter,
            max_depth,
        }
    }

    pub fn invoke(&self, input: &mut ResolverInput<T::Handle>) -> WalkStatus {
        if input.key.is_invalid() {
            return WalkStatus::Invalid;
        }

        let mut next_key = input.key;
        let mut dentry = input.dentry;
        let mut d_parent = dentry;

        for i in 0..self.max_depth {
            d_parent = self.tree.parent(dentry);

            let key = next_key;
            if dentry != d_parent {
                next_key.ino = self.tree.inode(d_parent);
            }

            // only the leaf and its parent are filtered
            if let Some(discarder_type) = input.discarder_type {
                if input.iteration <= 1
                    && i < 2
                    && self.filter.is_discarded_by_inode(
                        discarder_type,
                        key.mount_id,
                        key.ino,
                        i == 0,
                    )
                {
                    trace!(key = %key, step = i, "dentry walk discarded");
                    return WalkStatus::Discarded;
                }
            }

            let name = self.tree.name(dentry);
            let leaf = if name.first().map_or(true, |&b| b == b'/') {
                next_key = PathKey::ROOT;
                PathLeaf::root()
            } else {
                if name.len() > MAX_SEGMENT_LENGTH {
                    warn!(
                        key = %key,
                        len = name.len(),
                        max = MAX_SEGMENT_LENGTH,
                        "dentry name cut to segment length"
                    );
                }
                PathLeaf::new(next_key, name)
            };
            self.store.put(key, leaf);

            dentry = d_parent;
            if next_key.is_root() {
                input.dentry = d_parent;
                input.key = next_key;
                return WalkStatus::Resolved(i + 1);
            }
        }

        input.dentry = d_parent;
        input.key = next_key;
        WalkStatus::MaxDepthReached
    }
}
