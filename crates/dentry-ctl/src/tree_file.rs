// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Dentry tree description files
//!
//! ```toml
//! mount_id = 3
//! paths = ["/etc/passwd", "/home/user/notes.txt"]
//!
//! [[renames]]
//! from = "/home/user/notes.txt"
//! to = "/tmp/notes.txt"
//! ```
//!
//! The same layout is accepted as JSON when the file ends in `.json`.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use dentry_resolver_core::{DentryId, InMemoryDentryTree};
use serde::Deserialize;

fn default_mount_id() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeFile {
    #[serde(default = "default_mount_id")]
    pub mount_id: u32,
    pub paths: Vec<String>,
    /// Applied in order after every path has been inserted.
    #[serde(default)]
    pub renames: Vec<RenameSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameSpec {
    pub from: String,
    pub to: String,
}

impl TreeFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tree file {}", path.display()))?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json {
            serde_json::from_str(&text)
                .with_context(|| format!("invalid JSON tree file {}", path.display()))
        } else {
            toml::from_str(&text)
                .with_context(|| format!("invalid TOML tree file {}", path.display()))
        }
    }

    pub fn build(&self) -> Result<InMemoryDentryTree> {
        let mut tree = InMemoryDentryTree::new();
        for path in &self.paths {
            tree.insert_path(path).with_context(|| format!("cannot insert {path}"))?;
        }
        for rename in &self.renames {
            apply_rename(&mut tree, rename)?;
        }
        Ok(tree)
    }
}

fn apply_rename(tree: &mut InMemoryDentryTree, rename: &RenameSpec) -> Result<()> {
    let source = tree
        .lookup(&rename.from)
        .ok_or_else(|| anyhow!("rename source {} does not exist", rename.from))?;
    let (parent_path, name) = split_parent(&rename.to)
        .ok_or_else(|| anyhow!("rename target {} has no file name", rename.to))?;
    if tree.lookup(&rename.to).is_some() {
        return Err(anyhow!("rename target {} already exists", rename.to));
    }
    let parent: DentryId = tree
        .insert_path(parent_path)
        .with_context(|| format!("cannot create rename target {}", rename.to))?;
    tree.rename(source, parent, name.as_bytes())
        .with_context(|| format!("cannot rename {} to {}", rename.from, rename.to))
}

/// Split `/a/b/c` into (`/a/b`, `c`); `None` for the root.
fn split_parent(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = trimmed.rsplit_once('/').unwrap_or(("", trimmed));
    (!name.is_empty()).then_some((parent, name))
}
