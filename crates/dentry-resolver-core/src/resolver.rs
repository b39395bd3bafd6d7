// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Hook-triggered resolution controller
//!
//! A resolution is a chain of bounded walker invocations. Each invocation is
//! one call to [`DentryResolver::kern_step`]; [`DentryResolver::resolve`] is
//! the trampoline that keeps calling it until the walk is terminal and then
//! hands the result to the callback table exactly once.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::callbacks::{CallbackTable, DentryCallback};
use crate::config::ResolverConfig;
use crate::dentry::DentryView;
use crate::erpc::ErpcState;
use crate::error::ResolverResult;
use crate::store::PathnameStore;
use crate::types::{
    CallbackSelector, DiscardFilter, NoDiscarders, PathKey, PathLeaf, ResolverProgram,
    DENTRY_DISCARDED, DENTRY_INVALID, DENTRY_TRUNCATED,
};
use crate::walker::{ResolverInput, WalkStatus, Walker};

const COMPONENT: &str = "dentry-resolver";

/// Terminal outcome of a hook-triggered resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved,
    Discarded,
    Invalid,
    /// The invocation ceiling was hit; a truncation marker was stored at
    /// the last identity reached.
    Truncated,
}

/// Path rebuilt from the segment store alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CachedPath {
    /// Leaf-to-root names, the last one being the root segment.
    Complete(Vec<Vec<u8>>),
    /// Names collected before a truncation marker or the walk ceiling.
    Truncated(Vec<Vec<u8>>),
    /// The identity or one of its ancestors is not cached.
    Miss,
}

impl CachedPath {
    /// Segments of a complete path, `None` otherwise.
    pub fn complete(self) -> Option<Vec<Vec<u8>>> {
        match self {
            CachedPath::Complete(segments) => Some(segments),
            CachedPath::Truncated(_) | CachedPath::Miss => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, CachedPath::Complete(_))
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, CachedPath::Truncated(_))
    }
}

/// Result handed to callers and completion handlers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: ResolveOutcome,
    /// Identity the resolution started from.
    pub start: PathKey,
    /// Identity the walk stopped at.
    pub key: PathKey,
    pub invocations: u32,
    /// Total depth when resolved, otherwise the `DENTRY_*` status code.
    pub ret: i64,
    /// Handler that ran, if any.
    pub callback: Option<CallbackSelector>,
}

impl Resolution {
    pub fn code(&self) -> i64 {
        self.ret
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome == ResolveOutcome::Resolved
    }
}

/// What the trampoline does after one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernStep {
    Continue,
    Done(ResolveOutcome),
}

/// Resolver instance: owns the segment store, the completion table and
/// the external session slot.
pub struct DentryResolver {
    config: ResolverConfig,
    store: Arc<PathnameStore>,
    filter: Arc<dyn DiscardFilter>,
    callbacks: CallbackTable,
    pub(crate) erpc: Mutex<ErpcState>,
}

impl DentryResolver {
    pub fn new(config: ResolverConfig) -> ResolverResult<Self> {
        Self::with_filter(config, Arc::new(NoDiscarders))
    }

    pub fn with_filter(
        config: ResolverConfig,
        filter: Arc<dyn DiscardFilter>,
    ) -> ResolverResult<Self> {
        config.validate()?;
        let store = Arc::new(PathnameStore::new(config.pathnames.capacity));
        Ok(Self::with_store(config, store, filter))
    }

    /// Build on an existing store, e.g. one shared with another resolver.
    /// The config is trusted as is.
    pub fn with_store(
        config: ResolverConfig,
        store: Arc<PathnameStore>,
        filter: Arc<dyn DiscardFilter>,
    ) -> Self {
        Self {
            config,
            store,
            filter,
            callbacks: CallbackTable::new(),
            erpc: Mutex::new(ErpcState::default()),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<PathnameStore> {
        &self.store
    }

    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    pub fn register_callback(
        &self,
        selector: CallbackSelector,
        handler: Arc<dyn DentryCallback>,
    ) -> Option<Arc<dyn DentryCallback>> {
        self.callbacks.register(selector, handler)
    }

    /// Look up a single stored segment.
    pub fn lookup(&self, key: &PathKey) -> Option<PathLeaf> {
        self.store.get(key)
    }

    /// Run one walker invocation and decide whether another is needed.
    ///
    /// `input.ret` is updated on every terminal step; a non-terminal step
    /// leaves the cursor in `input` for the next call.
    pub fn kern_step<T: DentryView>(
        &self,
        tree: &T,
        input: &mut ResolverInput<T::Handle>,
    ) -> KernStep {
        let depth = self.config.walker.max_iteration_depth;
        input.iteration += 1;

        let walker = Walker::new(tree, &self.store, self.filter.as_ref(), depth);
        let status = walker.invoke(input);
        trace!(
            component = COMPONENT,
            program = ?ResolverProgram::Kern,
            iteration = input.iteration,
            status = ?status,
            key = %input.key,
            "walker invocation finished"
        );

        match status {
            WalkStatus::Invalid => {
                input.ret = DENTRY_INVALID;
                KernStep::Done(ResolveOutcome::Invalid)
            }
            WalkStatus::Discarded => {
                input.ret = DENTRY_DISCARDED;
                KernStep::Done(ResolveOutcome::Discarded)
            }
            WalkStatus::Resolved(steps) => {
                let prior = depth as i64 * i64::from(input.iteration - 1);
                input.ret = steps as i64 + prior;
                KernStep::Done(ResolveOutcome::Resolved)
            }
            WalkStatus::MaxDepthReached => {
                input.ret = depth as i64 * i64::from(input.iteration);
                if input.iteration < self.config.walker.max_tail_calls {
                    return KernStep::Continue;
                }
                self.store.put(input.key, PathLeaf::truncated());
                warn!(
                    component = COMPONENT,
                    key = %input.key,
                    invocations = input.iteration,
                    "invocation ceiling reached, path truncated"
                );
                input.ret = DENTRY_TRUNCATED;
                KernStep::Done(ResolveOutcome::Truncated)
            }
        }
    }

    /// Resolve the path of `input.dentry` into the store and dispatch the
    /// requested completion handler.
    pub fn resolve<T: DentryView>(
        &self,
        tree: &T,
        mut input: ResolverInput<T::Handle>,
    ) -> Resolution {
        let start = input.key;
        let outcome = loop {
            match self.kern_step(tree, &mut input) {
                KernStep::Continue => continue,
                KernStep::Done(outcome) => break outcome,
            }
        };

        let mut resolution = Resolution {
            outcome,
            start,
            key: input.key,
            invocations: input.iteration,
            ret: input.ret,
            callback: None,
        };
        debug!(
            component = COMPONENT,
            start = %start,
            outcome = ?outcome,
            ret = resolution.ret,
            invocations = resolution.invocations,
            "resolution finished"
        );

        resolution.callback = self.callbacks.dispatch(input.callback, &resolution);
        resolution
    }

    /// Rebuild the path of `key` from the store alone, leaf to root.
    pub fn cached_segments(&self, key: PathKey) -> CachedPath {
        // one extra hop for a marker stored right at the ceiling
        let budget = self.config.walker.max_iteration_depth
            * self.config.walker.max_tail_calls as usize
            + 1;
        let mut segments = Vec::new();
        let mut cursor = key;
        for _ in 0..budget {
            let Some(leaf) = self.store.get(&cursor) else {
                return CachedPath::Miss;
            };
            if leaf.is_truncated() {
                return CachedPath::Truncated(segments);
            }
            segments.push(leaf.name_bytes().to_vec());
            cursor = leaf.parent;
            if cursor.is_root() {
                return CachedPath::Complete(segments);
            }
        }
        CachedPath::Truncated(segments)
    }
}

impl std::fmt::Debug for DentryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DentryResolver")
            .field("config", &self.config)
            .field("store_len", &self.store.len())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::MockDentryCallback;
    use crate::dentry::InMemoryDentryTree;
    use crate::types::{DiscarderType, MockDiscardFilter};

    const MOUNT: u32 = 3;

    fn resolver() -> DentryResolver {
        DentryResolver::new(ResolverConfig::default()).unwrap()
    }

    fn small_resolver(depth: usize, tail_calls: u32) -> DentryResolver {
        let mut config = ResolverConfig::default();
        config.walker.max_iteration_depth = depth;
        config.walker.max_tail_calls = tail_calls;
        DentryResolver::new(config).unwrap()
    }

    #[test]
    fn resolves_and_reports_depth() {
        let mut tree = InMemoryDentryTree::new();
        let leaf = tree.insert_path("/a/b/c.txt").unwrap();
        let resolver = resolver();

        let res = resolver.resolve(&tree, ResolverInput::new(tree.key(leaf, MOUNT), leaf));
        assert_eq!(res.outcome, ResolveOutcome::Resolved);
        assert_eq!(res.code(), 4);
        assert_eq!(res.invocations, 1);
        assert_eq!(
            resolver.cached_segments(tree.key(leaf, MOUNT)).complete().unwrap(),
            vec![b"c.txt".to_vec(), b"b".to_vec(), b"a".to_vec(), b"/".to_vec()]
        );
    }

    #[test]
    fn chains_invocations_for_deep_paths() {
        let (tree, leaf) = InMemoryDentryTree::chain(130);
        let resolver = resolver();
        let res = resolver.resolve(&tree, ResolverInput::new(tree.key(leaf, MOUNT), leaf));
        assert!(res.is_resolved());
        assert_eq!(res.invocations, 3);
        assert_eq!(res.ret, 130);
        let segments = resolver.cached_segments(tree.key(leaf, MOUNT)).complete().unwrap();
        assert_eq!(segments.len(), 130);
    }

    #[test]
    fn truncates_at_invocation_ceiling() {
        let (tree, leaf) = InMemoryDentryTree::chain(20);
        let resolver = small_resolver(3, 2);
        let res = resolver.resolve(&tree, ResolverInput::new(tree.key(leaf, MOUNT), leaf));

        assert_eq!(res.outcome, ResolveOutcome::Truncated);
        assert_eq!(res.code(), DENTRY_TRUNCATED);
        assert_eq!(res.invocations, 2);
        // six segments walked, marker stored at the seventh identity
        assert_eq!(resolver.store().len(), 7);
        let marker = resolver.store().peek(&res.key).unwrap();
        assert!(marker.is_truncated());
        assert!(!marker.is_root());

        let from_leaf = resolver.cached_segments(tree.key(leaf, MOUNT));
        assert_eq!(
            from_leaf,
            CachedPath::Truncated((0..6).map(|i| format!("d{}", 19 - i).into_bytes()).collect())
        );
        let mid = tree.key(tree.parent(tree.parent(leaf)), MOUNT);
        assert!(resolver.cached_segments(mid).is_truncated());
    }

    #[test]
    fn cached_path_distinguishes_miss_from_truncation() {
        let resolver = resolver();
        let a = PathKey::new(MOUNT, 10, 0);
        let b = PathKey::new(MOUNT, 11, 0);
        assert_eq!(resolver.cached_segments(a), CachedPath::Miss);

        resolver.store().put(a, PathLeaf::new(b, b"a"));
        assert_eq!(resolver.cached_segments(a), CachedPath::Miss);

        resolver.store().put(b, PathLeaf::truncated());
        assert_eq!(resolver.cached_segments(a), CachedPath::Truncated(vec![b"a".to_vec()]));

        resolver.store().put(b, PathLeaf::root());
        assert_eq!(
            resolver.cached_segments(a),
            CachedPath::Complete(vec![b"a".to_vec(), b"/".to_vec()])
        );
    }

    #[test]
    fn invalid_key_dispatches_once_without_writes() {
        let mut tree = InMemoryDentryTree::new();
        let leaf = tree.insert_path("/a").unwrap();
        let resolver = resolver();

        let mut handler = MockDentryCallback::new();
        handler
            .expect_on_resolved()
            .withf(|res| res.outcome == ResolveOutcome::Invalid && res.ret == DENTRY_INVALID)
            .times(1)
            .return_const(());
        resolver.register_callback(CallbackSelector::Unlink, Arc::new(handler));

        let input = ResolverInput::new(PathKey::new(MOUNT, 0, 0), leaf)
            .with_callback(CallbackSelector::Unlink);
        let res = resolver.resolve(&tree, input);
        assert_eq!(res.callback, Some(CallbackSelector::Unlink));
        assert!(resolver.store().is_empty());
    }

    #[test]
    fn discard_dispatches_with_discarded_code() {
        let mut tree = InMemoryDentryTree::new();
        let leaf = tree.insert_path("/var/log/syslog").unwrap();
        let mut filter = MockDiscardFilter::new();
        filter.expect_is_discarded_by_inode().returning(|_, _, _, is_leaf| is_leaf);
        let resolver =
            DentryResolver::with_filter(ResolverConfig::default(), Arc::new(filter)).unwrap();

        let mut handler = MockDentryCallback::new();
        handler
            .expect_on_resolved()
            .withf(|res| res.ret == DENTRY_DISCARDED)
            .times(1)
            .return_const(());
        resolver.register_callback(CallbackSelector::Open, Arc::new(handler));

        let input = ResolverInput::new(tree.key(leaf, MOUNT), leaf)
            .with_discarder(DiscarderType(1))
            .with_callback(CallbackSelector::Open);
        let res = resolver.resolve(&tree, input);
        assert_eq!(res.outcome, ResolveOutcome::Discarded);
        assert!(resolver.store().is_empty());
    }

    #[test]
    fn no_callback_never_dispatches() {
        let mut tree = InMemoryDentryTree::new();
        let leaf = tree.insert_path("/a").unwrap();
        let resolver = resolver();
        for sel in CallbackSelector::ALL {
            let mut handler = MockDentryCallback::new();
            handler.expect_on_resolved().never();
            resolver.register_callback(sel, Arc::new(handler));
        }
        let res = resolver.resolve(&tree, ResolverInput::new(tree.key(leaf, MOUNT), leaf));
        assert!(res.is_resolved());
        assert_eq!(res.callback, None);
    }

    #[test]
    fn kern_step_exposes_each_invocation() {
        let (tree, leaf) = InMemoryDentryTree::chain(10);
        let resolver = small_resolver(4, 30);
        let mut input = ResolverInput::new(tree.key(leaf, MOUNT), leaf);

        assert_eq!(resolver.kern_step(&tree, &mut input), KernStep::Continue);
        assert_eq!(input.ret, 4);
        assert_eq!(resolver.kern_step(&tree, &mut input), KernStep::Continue);
        assert_eq!(
            resolver.kern_step(&tree, &mut input),
            KernStep::Done(ResolveOutcome::Resolved)
        );
        assert_eq!(input.ret, 10);
        assert_eq!(input.iteration, 3);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = ResolverConfig::default();
        config.walker.max_tail_calls = 0;
        assert!(DentryResolver::new(config).is_err());
    }
}
