// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! External resolution requests
//!
//! A caller passes a 24-byte request blob naming a starting identity and
//! the address of its output buffer. Resolved names are copied into that
//! buffer in 256-byte slots, leaf first. Only one path request may be in
//! flight at a time; a concurrent caller gets [`ResolverError::SessionBusy`].

use dentry_resolver_proto::parse_request;
use tracing::{debug, warn};

use crate::error::{ResolverError, ResolverResult};
use crate::resolver::DentryResolver;
use crate::types::{PathKey, ResolverProgram, SEGMENT_SLOT_SIZE};
use crate::usermem::UserMemory;

const COMPONENT: &str = "dentry-erpc";

/// Progress of the in-flight external path request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErpcState {
    pub key: PathKey,
    pub userspace_buffer: u64,
    /// Byte offset of the next slot to fill.
    pub cursor: u64,
    pub iteration: u32,
    pub ret: i64,
}

impl ErpcState {
    fn seed(&mut self, key: PathKey, userspace_buffer: u64) {
        *self = Self {
            key,
            userspace_buffer,
            ..Self::default()
        };
    }

    /// Slots written so far.
    pub fn segments(&self) -> usize {
        (self.cursor / SEGMENT_SLOT_SIZE as u64) as usize
    }
}

/// Terminal status of an external request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErpcStatus {
    /// The root sentinel was reached.
    Resolved,
    /// A segment was not in the store; earlier slots are valid.
    CacheMiss,
    /// The invocation ceiling was hit, or the chain led to a truncation
    /// marker, before the root.
    Truncated,
    /// Copying into the caller buffer failed; earlier slots are valid.
    WriteFailed { errno: i32 },
}

impl ErpcStatus {
    pub fn code(self) -> i64 {
        match self {
            ErpcStatus::Resolved => 0,
            ErpcStatus::CacheMiss => -i64::from(libc::ENOENT),
            ErpcStatus::Truncated => crate::types::DENTRY_TRUNCATED,
            ErpcStatus::WriteFailed { errno } => -i64::from(errno),
        }
    }
}

/// Reply to an external request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErpcReply {
    pub status: ErpcStatus,
    /// Slots filled in the caller buffer.
    pub segments: usize,
    pub invocations: u32,
}

impl ErpcReply {
    pub fn code(&self) -> i64 {
        self.status.code()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ErpcStep {
    Continue,
    Done(ErpcStatus),
}

impl DentryResolver {
    /// Copy the cached path of the requested identity into the caller
    /// buffer, chaining bounded invocations like the hook walker does.
    pub fn resolve_path(&self, mem: &dyn UserMemory, blob: &[u8]) -> ResolverResult<ErpcReply> {
        let request = parse_request(blob)?;
        let mut state = self.erpc.try_lock().ok_or(ResolverError::SessionBusy)?;
        state.seed(request.key, request.userspace_buffer);

        let status = loop {
            match self.erpc_step(mem, &mut state) {
                ErpcStep::Continue => continue,
                ErpcStep::Done(status) => break status,
            }
        };
        state.ret = status.code();

        let reply = ErpcReply {
            status,
            segments: state.segments(),
            invocations: state.iteration,
        };
        debug!(
            component = COMPONENT,
            program = ?ResolverProgram::Erpc,
            key = %request.key,
            status = ?status,
            segments = reply.segments,
            "path request finished"
        );
        Ok(reply)
    }

    fn erpc_step(&self, mem: &dyn UserMemory, state: &mut ErpcState) -> ErpcStep {
        state.iteration += 1;
        for _ in 0..self.config().walker.max_iteration_depth {
            let Some(leaf) = self.store().get(&state.key) else {
                return ErpcStep::Done(ErpcStatus::CacheMiss);
            };
            if leaf.is_truncated() {
                return ErpcStep::Done(ErpcStatus::Truncated);
            }
            if let Err(errno) = write_slot(mem, state.userspace_buffer, state.cursor, &leaf.name) {
                return ErpcStep::Done(ErpcStatus::WriteFailed { errno });
            }
            state.cursor += SEGMENT_SLOT_SIZE as u64;
            state.key = leaf.parent;
            if state.key.is_root() {
                return ErpcStep::Done(ErpcStatus::Resolved);
            }
        }
        if state.iteration < self.config().walker.max_tail_calls {
            ErpcStep::Continue
        } else {
            ErpcStep::Done(ErpcStatus::Truncated)
        }
    }

    /// Copy the single stored name of the requested identity into the
    /// first slot of the caller buffer.
    pub fn resolve_segment(
        &self,
        mem: &dyn UserMemory,
        blob: &[u8],
    ) -> ResolverResult<ErpcReply> {
        let request = parse_request(blob)?;
        let status = match self.store().get(&request.key) {
            None => ErpcStatus::CacheMiss,
            Some(leaf) if leaf.is_truncated() => ErpcStatus::Truncated,
            Some(leaf) => match write_slot(mem, request.userspace_buffer, 0, &leaf.name) {
                Ok(()) => ErpcStatus::Resolved,
                Err(errno) => ErpcStatus::WriteFailed { errno },
            },
        };
        Ok(ErpcReply {
            status,
            segments: usize::from(status == ErpcStatus::Resolved),
            invocations: 1,
        })
    }
}

fn write_slot(mem: &dyn UserMemory, base: u64, cursor: u64, name: &[u8]) -> Result<(), i32> {
    let addr = base.checked_add(cursor).ok_or(libc::EFAULT)?;
    mem.write_user(addr, name).map_err(|err| {
        warn!(
            component = COMPONENT,
            addr = format_args!("{addr:#x}"),
            errno = err.errno,
            "user buffer write failed"
        );
        err.errno
    })
}
