// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::sync::Arc;

use dentry_resolver_core::{
    AddressSpace, DentryResolver, DentryView, ErpcStatus, FaultErrno, FaultInjector, FaultPolicy,
    InMemoryDentryTree, NoDiscarders, PathKey, PathLeaf, Protection, ResolveOutcome,
    ResolverConfig, ResolverError, ResolverInput, DENTRY_TRUNCATED, DR_MAX_ITERATION_DEPTH,
    DR_MAX_TAIL_CALL, SEGMENT_SLOT_SIZE,
};
use dentry_resolver_proto::{join_segments, reaches_root, split_segments, ResolveRequest};
use dentry_test_utils::{logged_assert, logged_assert_eq};

const MOUNT: u32 = 2;

fn request(key: PathKey, buffer: u64) -> Vec<u8> {
    ResolveRequest::new(key, buffer).to_blob()
}

fn resolved_tree(path: &str) -> (DentryResolver, PathKey) {
    let mut tree = InMemoryDentryTree::new();
    let leaf = tree.insert_path(path).unwrap();
    let resolver = DentryResolver::new(ResolverConfig::default()).unwrap();
    let key = tree.key(leaf, MOUNT);
    assert!(resolver.resolve(&tree, ResolverInput::new(key, leaf)).is_resolved());
    (resolver, key)
}

#[dentry_test_utils::logged_test]
fn hook_then_external_request_round_trips_the_path() {
    let (resolver, key) = resolved_tree("/a/b/c.txt");
    let space = AddressSpace::new();
    let buffer = space.map(8 * SEGMENT_SLOT_SIZE, Protection::ReadWrite);

    let reply = resolver.resolve_path(&space, &request(key, buffer)).unwrap();
    logger.log(&format!("reply: {reply:?}")).unwrap();

    logged_assert_eq!(logger, reply.status, ErpcStatus::Resolved);
    // leaf, two directories and the root slot
    assert_eq!(reply.segments, 4);
    let raw = space.read(buffer, reply.segments * SEGMENT_SLOT_SIZE).unwrap();
    let segments = split_segments(&raw, reply.segments);
    assert_eq!(segments, [b"c.txt".to_vec(), b"b".to_vec(), b"a".to_vec(), b"/".to_vec()]);
    logged_assert!(logger, reaches_root(&segments));
    assert_eq!(join_segments(&segments), "/a/b/c.txt");
}

#[dentry_test_utils::logged_test]
fn seeded_chain_writes_three_slots_and_stops() {
    let resolver = DentryResolver::new(ResolverConfig::default()).unwrap();
    let c = PathKey::new(1, 30, 0);
    let b = PathKey::new(1, 20, 0);
    let a = PathKey::new(1, 10, 0);
    resolver.store().put(c, PathLeaf::new(b, b"c.txt"));
    resolver.store().put(b, PathLeaf::new(a, b"b"));
    resolver.store().put(a, PathLeaf::new(PathKey::ROOT, b"a"));

    let space = AddressSpace::new();
    let buffer = space.map(4 * SEGMENT_SLOT_SIZE, Protection::ReadWrite);
    let reply = resolver.resolve_path(&space, &request(c, buffer)).unwrap();

    assert_eq!(reply.status, ErpcStatus::Resolved);
    assert_eq!(reply.segments, 3);
    assert_eq!(reply.invocations, 1);
    let raw = space.read(buffer, 4 * SEGMENT_SLOT_SIZE).unwrap();
    assert_eq!(&raw[..6], b"c.txt\0");
    assert_eq!(&raw[256..258], b"b\0");
    assert_eq!(&raw[512..514], b"a\0");
    assert!(raw[768..].iter().all(|&byte| byte == 0));
}

#[dentry_test_utils::logged_test]
fn deep_external_requests_chain_invocations() {
    let depth = 3 * DR_MAX_ITERATION_DEPTH;
    let (tree, leaf) = InMemoryDentryTree::chain(depth);
    let resolver = DentryResolver::new(ResolverConfig::default()).unwrap();
    let key = tree.key(leaf, MOUNT);
    resolver.resolve(&tree, ResolverInput::new(key, leaf));

    let space = AddressSpace::new();
    let buffer = space.map(depth * SEGMENT_SLOT_SIZE, Protection::ReadWrite);
    let reply = resolver.resolve_path(&space, &request(key, buffer)).unwrap();
    assert_eq!(reply.status, ErpcStatus::Resolved);
    assert_eq!(reply.segments, depth);
    assert_eq!(reply.invocations, 3);

    let raw = space.read(buffer, depth * SEGMENT_SLOT_SIZE).unwrap();
    let path = join_segments(&split_segments(&raw, depth));
    assert_eq!(path, tree.path_of(leaf));
}

#[dentry_test_utils::logged_test]
fn truncated_hook_walk_surfaces_as_external_truncation() {
    let depth = DR_MAX_ITERATION_DEPTH * DR_MAX_TAIL_CALL as usize + 5;
    let (tree, leaf) = InMemoryDentryTree::chain(depth);
    let resolver = DentryResolver::new(ResolverConfig::default()).unwrap();
    let key = tree.key(leaf, MOUNT);
    resolver.resolve(&tree, ResolverInput::new(key, leaf));

    let slots = DR_MAX_ITERATION_DEPTH * DR_MAX_TAIL_CALL as usize;
    let space = AddressSpace::new();
    let buffer = space.map(slots * SEGMENT_SLOT_SIZE, Protection::ReadWrite);
    let reply = resolver.resolve_path(&space, &request(key, buffer)).unwrap();

    assert_eq!(reply.status, ErpcStatus::Truncated);
    assert_eq!(reply.invocations, DR_MAX_TAIL_CALL);
    assert_eq!(reply.segments, slots);
}

#[dentry_test_utils::logged_test]
fn mid_chain_request_stops_at_truncation_marker() {
    let depth = DR_MAX_ITERATION_DEPTH * DR_MAX_TAIL_CALL as usize + 5;
    let (tree, leaf) = InMemoryDentryTree::chain(depth);
    let resolver = DentryResolver::new(ResolverConfig::default()).unwrap();
    let res = resolver.resolve(&tree, ResolverInput::new(tree.key(leaf, MOUNT), leaf));
    assert_eq!(res.outcome, ResolveOutcome::Truncated);

    // one hop above the leaf the external walk has budget left when it
    // lands on the marker
    let parent = tree.parent(leaf);
    let slots = DR_MAX_ITERATION_DEPTH * DR_MAX_TAIL_CALL as usize;
    let space = AddressSpace::new();
    let buffer = space.map(slots * SEGMENT_SLOT_SIZE, Protection::ReadWrite);
    let reply = resolver.resolve_path(&space, &request(tree.key(parent, MOUNT), buffer)).unwrap();
    logger.log(&format!("reply: {reply:?}")).unwrap();

    logged_assert_eq!(logger, reply.status, ErpcStatus::Truncated);
    assert_eq!(reply.code(), DENTRY_TRUNCATED);
    assert_eq!(reply.segments, slots - 1);

    let raw = space.read(buffer, reply.segments * SEGMENT_SLOT_SIZE).unwrap();
    let segments = split_segments(&raw, reply.segments);
    assert_eq!(segments[0], tree.name(parent).to_vec());
    assert!(!reaches_root(&segments));
}

#[dentry_test_utils::logged_test]
fn shallow_hook_budget_truncation_is_seen_by_a_wider_reader() {
    let (tree, leaf) = InMemoryDentryTree::chain(40);
    let mut hook_config = ResolverConfig::default();
    hook_config.walker.max_iteration_depth = 4;
    hook_config.walker.max_tail_calls = 3;
    let hook = DentryResolver::new(hook_config).unwrap();
    let res = hook.resolve(&tree, ResolverInput::new(tree.key(leaf, MOUNT), leaf));
    assert_eq!(res.outcome, ResolveOutcome::Truncated);

    // same store, default budgets: the reader would otherwise walk far past
    // the twelve cached segments
    let reader = DentryResolver::with_store(
        ResolverConfig::default(),
        hook.store().clone(),
        Arc::new(NoDiscarders),
    );
    let space = AddressSpace::new();
    let buffer = space.map(40 * SEGMENT_SLOT_SIZE, Protection::ReadWrite);

    let reply = reader.resolve_path(&space, &request(tree.key(leaf, MOUNT), buffer)).unwrap();
    logged_assert_eq!(logger, reply.status, ErpcStatus::Truncated);
    assert_eq!(reply.segments, 12);
    assert_eq!(reply.invocations, 1);

    let mid = tree.parent(tree.parent(leaf));
    let reply = reader.resolve_path(&space, &request(tree.key(mid, MOUNT), buffer)).unwrap();
    assert_eq!(reply.status, ErpcStatus::Truncated);
    assert_eq!(reply.segments, 10);

    let reply = reader.resolve_segment(&space, &request(res.key, buffer)).unwrap();
    assert_eq!(reply.status, ErpcStatus::Truncated);
}

#[dentry_test_utils::logged_test]
fn external_requests_at_ceiling_boundaries() {
    let ceiling = DR_MAX_ITERATION_DEPTH * DR_MAX_TAIL_CALL as usize;
    let space = AddressSpace::new();
    let buffer = space.map((ceiling + 1) * SEGMENT_SLOT_SIZE, Protection::ReadWrite);

    for (depth, invocations) in [(2 * DR_MAX_ITERATION_DEPTH, 2), (ceiling, DR_MAX_TAIL_CALL)] {
        let (tree, leaf) = InMemoryDentryTree::chain(depth);
        let resolver = DentryResolver::new(ResolverConfig::default()).unwrap();
        let key = tree.key(leaf, MOUNT);
        assert!(resolver.resolve(&tree, ResolverInput::new(key, leaf)).is_resolved());

        let reply = resolver.resolve_path(&space, &request(key, buffer)).unwrap();
        logger.log(&format!("depth {depth}: {reply:?}")).unwrap();
        logged_assert_eq!(logger, reply.status, ErpcStatus::Resolved);
        assert_eq!(reply.segments, depth);
        assert_eq!(reply.invocations, invocations);
        let raw = space.read(buffer, depth * SEGMENT_SLOT_SIZE).unwrap();
        let segments = split_segments(&raw, depth);
        assert!(reaches_root(&segments));
        assert_eq!(join_segments(&segments), tree.path_of(leaf));
    }

    let (tree, leaf) = InMemoryDentryTree::chain(ceiling + 1);
    let resolver = DentryResolver::new(ResolverConfig::default()).unwrap();
    let res = resolver.resolve(&tree, ResolverInput::new(tree.key(leaf, MOUNT), leaf));
    assert_eq!(res.outcome, ResolveOutcome::Truncated);

    let reply = resolver.resolve_path(&space, &request(tree.key(leaf, MOUNT), buffer)).unwrap();
    logged_assert_eq!(logger, reply.status, ErpcStatus::Truncated);
    assert_eq!(reply.segments, ceiling);
    let parent = tree.parent(leaf);
    let reply = resolver.resolve_path(&space, &request(tree.key(parent, MOUNT), buffer)).unwrap();
    assert_eq!(reply.status, ErpcStatus::Truncated);
    assert_eq!(reply.segments, ceiling - 1);
}

#[dentry_test_utils::logged_test]
fn injected_write_fault_keeps_earlier_slots() {
    let (resolver, key) = resolved_tree("/var/lib/app/state.db");
    let policy = FaultPolicy::fail_nth_write(3, FaultErrno::Eperm);
    let faults = Arc::new(FaultInjector::with_policy(policy.clone()));
    logged_assert_eq!(logger, faults.snapshot(), policy);
    let space = AddressSpace::with_faults(faults.clone());
    let buffer = space.map(8 * SEGMENT_SLOT_SIZE, Protection::ReadWrite);

    let reply = resolver.resolve_path(&space, &request(key, buffer)).unwrap();
    assert_eq!(reply.status, ErpcStatus::WriteFailed { errno: libc::EPERM });
    assert_eq!(reply.code(), -i64::from(libc::EPERM));
    assert_eq!(reply.segments, 2);
    assert_eq!(faults.injected(), 1);

    let raw = space.read(buffer, 3 * SEGMENT_SLOT_SIZE).unwrap();
    assert_eq!(
        split_segments(&raw, 3),
        vec![b"state.db".to_vec(), b"app".to_vec(), Vec::new()]
    );
}

#[dentry_test_utils::logged_test]
fn undersized_buffer_faults_at_the_boundary() {
    let (resolver, key) = resolved_tree("/one/two/three");
    let space = AddressSpace::new();
    let buffer = space.map(2 * SEGMENT_SLOT_SIZE, Protection::ReadWrite);

    let reply = resolver.resolve_path(&space, &request(key, buffer)).unwrap();
    assert_eq!(reply.status, ErpcStatus::WriteFailed { errno: libc::EFAULT });
    assert_eq!(reply.segments, 2);
}

#[dentry_test_utils::logged_test]
fn read_only_buffer_is_rejected() {
    let (resolver, key) = resolved_tree("/ro");
    let space = AddressSpace::new();
    let buffer = space.map(SEGMENT_SLOT_SIZE, Protection::ReadOnly);

    let reply = resolver.resolve_segment(&space, &request(key, buffer)).unwrap();
    assert_eq!(reply.status, ErpcStatus::WriteFailed { errno: libc::EPERM });
    assert_eq!(reply.segments, 0);
}

#[dentry_test_utils::logged_test]
fn unknown_identity_is_a_cache_miss() {
    let (resolver, _) = resolved_tree("/known");
    let space = AddressSpace::new();
    let buffer = space.map(SEGMENT_SLOT_SIZE, Protection::ReadWrite);
    let unknown = PathKey::new(MOUNT, 987_654, 0);

    let reply = resolver.resolve_path(&space, &request(unknown, buffer)).unwrap();
    assert_eq!(reply.status, ErpcStatus::CacheMiss);
    assert_eq!(reply.segments, 0);
    assert_eq!(reply.code(), -i64::from(libc::ENOENT));
}

#[dentry_test_utils::logged_test]
fn null_buffer_is_a_malformed_request() {
    let (resolver, key) = resolved_tree("/x");
    let space = AddressSpace::new();
    let err = resolver.resolve_path(&space, &request(key, 0)).unwrap_err();
    assert!(matches!(err, ResolverError::Request(_)));
}

#[dentry_test_utils::logged_test]
fn path_requests_from_many_threads_never_interleave() {
    let (resolver, key) = resolved_tree("/srv/www/index.html");
    let space = AddressSpace::new();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let resolver = &resolver;
            let space = &space;
            scope.spawn(move || {
                let buffer = space.map(8 * SEGMENT_SLOT_SIZE, Protection::ReadWrite);
                let mut served = 0;
                for _ in 0..200 {
                    match resolver.resolve_path(space, &request(key, buffer)) {
                        Ok(reply) => {
                            assert_eq!(reply.status, ErpcStatus::Resolved);
                            served += 1;
                        }
                        Err(ResolverError::SessionBusy) => {}
                        Err(other) => panic!("unexpected error {other}"),
                    }
                }
                let raw = space.read(buffer, 4 * SEGMENT_SLOT_SIZE).unwrap();
                if served > 0 {
                    assert_eq!(join_segments(&split_segments(&raw, 4)), "/srv/www/index.html");
                }
            });
        }
    });
}
