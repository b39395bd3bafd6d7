// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Read-only view of the in-memory dentry parent chain
//!
//! The walker never traverses directories downward; it only follows parent
//! links from an already materialized dentry. The root dentry is its own
//! parent and is named `/`.

use std::collections::HashMap;

use crate::types::{PathKey, MAX_SEGMENT_LENGTH};

/// Tree edits the in-memory dentry cache refuses
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DentryError {
    #[error("dentry name is {len} bytes, limit is {max}")]
    NameTooLong { len: usize, max: usize },
    #[error("dentry name must be non-empty, without '/' or NUL")]
    BadName,
    #[error("cannot move a dentry under itself or one of its descendants")]
    RenameIntoDescendant,
    #[error("the root dentry cannot be renamed")]
    RenameRoot,
}

/// Accessors the walker needs on a dentry cache.
pub trait DentryView {
    type Handle: Copy + Eq + std::fmt::Debug;

    /// Parent of `dentry`; the root returns itself.
    fn parent(&self, dentry: Self::Handle) -> Self::Handle;

    /// Inode number backing `dentry`.
    fn inode(&self, dentry: Self::Handle) -> u64;

    /// Raw name bytes of `dentry`, unterminated.
    fn name(&self, dentry: Self::Handle) -> &[u8];
}

/// Index of a dentry inside an [`InMemoryDentryTree`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DentryId(pub(crate) usize);

#[derive(Clone, Debug)]
struct DentryNode {
    parent: DentryId,
    inode: u64,
    name: Vec<u8>,
    children: HashMap<Vec<u8>, DentryId>,
}

/// Arena-backed dentry tree for driving the resolver outside the kernel
#[derive(Clone, Debug)]
pub struct InMemoryDentryTree {
    nodes: Vec<DentryNode>,
    next_ino: u64,
}

impl InMemoryDentryTree {
    /// Inode number conventionally given to a filesystem root.
    pub const ROOT_INO: u64 = 2;

    pub fn new() -> Self {
        Self {
            nodes: vec![DentryNode {
                parent: DentryId(0),
                inode: Self::ROOT_INO,
                name: b"/".to_vec(),
                children: HashMap::new(),
            }],
            next_ino: Self::ROOT_INO + 1,
        }
    }

    /// Build a straight chain of `depth` dentries counting the root, and
    /// return the tree with its deepest dentry.
    pub fn chain(depth: usize) -> (Self, DentryId) {
        let mut tree = Self::new();
        let mut cursor = tree.root();
        for level in 1..depth {
            let ino = tree.next_ino;
            cursor = tree.push_child(cursor, format!("d{level}").into_bytes(), ino);
        }
        (tree, cursor)
    }

    pub fn root(&self) -> DentryId {
        DentryId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Add `name` under `parent` with the next free inode number, or return
    /// the existing child of that name.
    pub fn add_child(&mut self, parent: DentryId, name: &[u8]) -> Result<DentryId, DentryError> {
        self.add_child_with_inode(parent, name, self.next_ino)
    }

    pub fn add_child_with_inode(
        &mut self,
        parent: DentryId,
        name: &[u8],
        ino: u64,
    ) -> Result<DentryId, DentryError> {
        check_name(name)?;
        if let Some(existing) = self.nodes[parent.0].children.get(name) {
            return Ok(*existing);
        }
        Ok(self.push_child(parent, name.to_vec(), ino))
    }

    fn push_child(&mut self, parent: DentryId, name: Vec<u8>, ino: u64) -> DentryId {
        let id = DentryId(self.nodes.len());
        self.nodes[parent.0].children.insert(name.clone(), id);
        self.nodes.push(DentryNode {
            parent,
            inode: ino,
            name,
            children: HashMap::new(),
        });
        self.next_ino = self.next_ino.max(ino + 1);
        id
    }

    /// Create every missing component of an absolute or relative path and
    /// return the final dentry.
    pub fn insert_path(&mut self, path: &str) -> Result<DentryId, DentryError> {
        path.split('/')
            .filter(|c| !c.is_empty())
            .try_fold(self.root(), |parent, component| self.add_child(parent, component.as_bytes()))
    }

    pub fn lookup(&self, path: &str) -> Option<DentryId> {
        path.split('/').filter(|c| !c.is_empty()).try_fold(self.root(), |parent, component| {
            self.nodes[parent.0].children.get(component.as_bytes()).copied()
        })
    }

    /// Move `dentry` under `new_parent` as `new_name`, keeping its inode.
    pub fn rename(
        &mut self,
        dentry: DentryId,
        new_parent: DentryId,
        new_name: &[u8],
    ) -> Result<(), DentryError> {
        if dentry == self.root() {
            return Err(DentryError::RenameRoot);
        }
        check_name(new_name)?;
        if self.is_ancestor_or_self(dentry, new_parent) {
            return Err(DentryError::RenameIntoDescendant);
        }
        let old_parent = self.nodes[dentry.0].parent;
        let old_name = std::mem::take(&mut self.nodes[dentry.0].name);
        self.nodes[old_parent.0].children.remove(&old_name);
        self.nodes[dentry.0].parent = new_parent;
        self.nodes[dentry.0].name = new_name.to_vec();
        self.nodes[new_parent.0].children.insert(new_name.to_vec(), dentry);
        Ok(())
    }

    fn is_ancestor_or_self(&self, ancestor: DentryId, dentry: DentryId) -> bool {
        let mut cursor = dentry;
        loop {
            if cursor == ancestor {
                return true;
            }
            if cursor == self.root() {
                return false;
            }
            cursor = self.nodes[cursor.0].parent;
        }
    }

    /// Identity of `dentry` on the given mount.
    pub fn key(&self, dentry: DentryId, mount_id: u32) -> PathKey {
        PathKey::new(mount_id, self.nodes[dentry.0].inode, 0)
    }

    /// Number of dentries between `dentry` and the root, both included.
    pub fn depth(&self, dentry: DentryId) -> usize {
        let mut depth = 1;
        let mut cursor = dentry;
        while cursor != self.root() {
            cursor = self.nodes[cursor.0].parent;
            depth += 1;
        }
        depth
    }

    /// Absolute path of `dentry`, built by walking the arena directly.
    pub fn path_of(&self, dentry: DentryId) -> String {
        let mut parts = Vec::new();
        let mut cursor = dentry;
        while cursor != self.root() {
            parts.push(String::from_utf8_lossy(&self.nodes[cursor.0].name).into_owned());
            cursor = self.nodes[cursor.0].parent;
        }
        if parts.is_empty() {
            return "/".to_string();
        }
        parts.iter().rev().fold(String::new(), |mut acc, part| {
            acc.push('/');
            acc.push_str(part);
            acc
        })
    }
}

fn check_name(name: &[u8]) -> Result<(), DentryError> {
    if name.len() > MAX_SEGMENT_LENGTH {
        return Err(DentryError::NameTooLong {
            len: name.len(),
            max: MAX_SEGMENT_LENGTH,
        });
    }
    if name.is_empty() || name.contains(&b'/') || name.contains(&0) {
        return Err(DentryError::BadName);
    }
    Ok(())
}

impl Default for InMemoryDentryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DentryView for InMemoryDentryTree {
    type Handle = DentryId;

    fn parent(&self, dentry: DentryId) -> DentryId {
        self.nodes[dentry.0].parent
    }

    fn inode(&self, dentry: DentryId) -> u64 {
        self.nodes[dentry.0].inode
    }

    fn name(&self, dentry: DentryId) -> &[u8] {
        &self.nodes[dentry.0].name
    }
}
