// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Output buffer slot format
//!
//! A resolve-path reply fills consecutive [`SEGMENT_SLOT_SIZE`] slots, leaf
//! first. Each slot holds a NUL-terminated name; the root contributes a
//! `/` slot, which closes a complete path.

use crate::{ROOT_SEGMENT, SEGMENT_SLOT_SIZE};

/// Iterator over the names stored in the first `count` slots of a buffer.
pub struct SegmentSlots<'a> {
    buf: &'a [u8],
    remaining: usize,
}

impl<'a> SegmentSlots<'a> {
    pub fn new(buf: &'a [u8], count: usize) -> Self {
        Self {
            buf,
            remaining: count,
        }
    }
}

impl<'a> Iterator for SegmentSlots<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.buf.is_empty() {
            return None;
        }
        let slot_len = self.buf.len().min(SEGMENT_SLOT_SIZE);
        let (slot, rest) = self.buf.split_at(slot_len);
        self.buf = rest;
        self.remaining -= 1;
        let len = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
        Some(&slot[..len])
    }
}

/// Whether the last of `segments` is the root, i.e. the path is complete.
pub fn reaches_root<S: AsRef<[u8]>>(segments: &[S]) -> bool {
    segments.last().is_some_and(|last| last.as_ref() == ROOT_SEGMENT)
}

/// Copy the names of the first `count` slots out of `buf`.
pub fn split_segments(buf: &[u8], count: usize) -> Vec<Vec<u8>> {
    SegmentSlots::new(buf, count).map(<[u8]>::to_vec).collect()
}

/// Turn leaf-to-root segments into an absolute path. The root segment and
/// empty (unwritten) slots contribute no component.
pub fn join_segments<S: AsRef<[u8]>>(segments: &[S]) -> String {
    let mut path = String::new();
    for segment in segments.iter().rev() {
        let segment = segment.as_ref();
        if segment.is_empty() || segment == ROOT_SEGMENT {
            continue;
        }
        path.push('/');
        path.push_str(&String::from_utf8_lossy(segment));
    }
    if path.is_empty() && !segments.is_empty() {
        path.push('/');
    }
    path
}
