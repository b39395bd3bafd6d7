// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Caller-owned output memory
//!
//! The external protocol only ever writes through [`UserMemory`], which
//! bounds-checks each copy the way a user copy-out does and reports the
//! failure as an errno.

use std::collections::BTreeMap;
use std::sync::Arc;

use libc::{EFAULT, EPERM};
use parking_lot::Mutex;

use crate::fault::{FaultInjector, FaultOp};

/// A rejected copy into caller memory.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
#[error("user memory write failed (errno {errno})")]
pub struct UserWriteError {
    pub errno: i32,
}

impl UserWriteError {
    pub fn fault() -> Self {
        Self { errno: EFAULT }
    }

    pub fn perm() -> Self {
        Self { errno: EPERM }
    }
}

/// Destination for resolved segment names.
#[cfg_attr(test, mockall::automock)]
pub trait UserMemory {
    /// Copy `data` to `addr`. Nothing is written on failure.
    fn write_user(&self, addr: u64, data: &[u8]) -> Result<(), UserWriteError>;
}

/// Access rights of a mapped region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protection {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug)]
struct Region {
    data: Vec<u8>,
    prot: Protection,
}

#[derive(Debug)]
struct Mappings {
    regions: BTreeMap<u64, Region>,
    next_base: u64,
}

/// Sparse simulated address space of page-aligned regions.
#[derive(Debug)]
pub struct AddressSpace {
    mappings: Mutex<Mappings>,
    faults: Arc<FaultInjector>,
}

const PAGE_SIZE: u64 = 4096;
const FIRST_BASE: u64 = 0x1000_0000;

impl AddressSpace {
    pub fn new() -> Self {
        Self::with_faults(Arc::new(FaultInjector::new()))
    }

    pub fn with_faults(faults: Arc<FaultInjector>) -> Self {
        Self {
            mappings: Mutex::new(Mappings {
                regions: BTreeMap::new(),
                next_base: FIRST_BASE,
            }),
            faults,
        }
    }

    pub fn faults(&self) -> &Arc<FaultInjector> {
        &self.faults
    }

    /// Map a zeroed region of `len` bytes and return its base address.
    /// Consecutive regions are separated by an unmapped guard page.
    pub fn map(&self, len: usize, prot: Protection) -> u64 {
        let mut guard = self.mappings.lock();
        let base = guard.next_base;
        let pages = (len as u64).div_ceil(PAGE_SIZE).max(1);
        guard.next_base = base + (pages + 1) * PAGE_SIZE;
        guard.regions.insert(
            base,
            Region {
                data: vec![0; len],
                prot,
            },
        );
        base
    }

    pub fn unmap(&self, base: u64) -> bool {
        self.mappings.lock().regions.remove(&base).is_some()
    }

    /// Copy `len` bytes out of a mapped region.
    pub fn read(&self, addr: u64, len: usize) -> Option<Vec<u8>> {
        let guard = self.mappings.lock();
        let (offset, region) = locate(&guard.regions, addr, len)?;
        Some(region.data[offset..offset + len].to_vec())
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

fn locate(regions: &BTreeMap<u64, Region>, addr: u64, len: usize) -> Option<(usize, &Region)> {
    let (base, region) = regions.range(..=addr).next_back()?;
    let offset = usize::try_from(addr - base).ok()?;
    let end = offset.checked_add(len)?;
    (end <= region.data.len()).then_some((offset, region))
}

impl UserMemory for AddressSpace {
    fn write_user(&self, addr: u64, data: &[u8]) -> Result<(), UserWriteError> {
        if let Some(err) = self.faults.should_fault(FaultOp::WriteUser) {
            return Err(err);
        }
        let mut guard = self.mappings.lock();
        let offset = match locate(&guard.regions, addr, data.len()) {
            Some((offset, region)) if region.prot == Protection::ReadWrite => offset,
            Some(_) => return Err(UserWriteError::perm()),
            None => return Err(UserWriteError::fault()),
        };
        let Some((_, region)) = guard.regions.range_mut(..=addr).next_back() else {
            return Err(UserWriteError::fault());
        };
        region.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// A local buffer exposed at a fixed base address.
#[derive(Debug)]
pub struct SliceMemory<'a> {
    base: u64,
    buf: Mutex<&'a mut [u8]>,
}

impl<'a> SliceMemory<'a> {
    pub fn new(base: u64, buf: &'a mut [u8]) -> Self {
        Self {
            base,
            buf: Mutex::new(buf),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }
}

impl UserMemory for SliceMemory<'_> {
    fn write_user(&self, addr: u64, data: &[u8]) -> Result<(), UserWriteError> {
        let mut buf = self.buf.lock();
        let offset = addr
            .checked_sub(self.base)
            .and_then(|off| usize::try_from(off).ok())
            .ok_or_else(UserWriteError::fault)?;
        let dst = offset
            .checked_add(data.len())
            .and_then(|end| buf.get_mut(offset..end))
            .ok_or_else(UserWriteError::fault)?;
        dst.copy_from_slice(data);
        Ok(())
    }
}
