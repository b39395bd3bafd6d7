// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Dentry Resolver Core
//!
//! Reconstructs absolute paths by walking dentry parent links in bounded
//! invocations, caching every segment in an LRU store, and serving cached
//! paths to external callers through caller-owned buffers.

pub mod callbacks;
pub mod config;
pub mod dentry;
pub mod erpc;
pub mod error;
pub mod fault;
pub mod resolver;
pub mod store;
pub mod types;
pub mod usermem;
pub mod walker;

pub use callbacks::{CallbackTable, DentryCallback};
pub use config::{PathnamesConfig, ResolverConfig, WalkerConfig};
pub use dentry::{DentryError, DentryId, DentryView, InMemoryDentryTree};
pub use erpc::{ErpcReply, ErpcState, ErpcStatus};
pub use error::{ConfigError, ResolverError, ResolverResult};
pub use fault::{FaultErrno, FaultInjector, FaultOp, FaultPolicy, FaultRule};
pub use resolver::{CachedPath, DentryResolver, KernStep, ResolveOutcome, Resolution};
pub use store::{PathnameStore, StoreStats};
pub use types::*;
pub use usermem::{AddressSpace, Protection, SliceMemory, UserMemory, UserWriteError};
pub use walker::{ResolverInput, WalkStatus, Walker};
