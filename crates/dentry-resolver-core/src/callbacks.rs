// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Completion handlers keyed by [`CallbackSelector`]

use std::sync::Arc;

use parking_lot::RwLock;

use crate::resolver::Resolution;
use crate::types::CallbackSelector;

/// Event-specific continuation run once a resolution is terminal.
#[cfg_attr(test, mockall::automock)]
pub trait DentryCallback: Send + Sync {
    fn on_resolved(&self, resolution: &Resolution);
}

/// Fixed table with one slot per selector.
#[derive(Default)]
pub struct CallbackTable {
    slots: RwLock<[Option<Arc<dyn DentryCallback>>; CallbackSelector::COUNT]>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `selector`, returning the one it replaces.
    pub fn register(
        &self,
        selector: CallbackSelector,
        handler: Arc<dyn DentryCallback>,
    ) -> Option<Arc<dyn DentryCallback>> {
        self.slots.write()[selector.index()].replace(handler)
    }

    pub fn unregister(&self, selector: CallbackSelector) -> Option<Arc<dyn DentryCallback>> {
        self.slots.write()[selector.index()].take()
    }

    pub fn is_registered(&self, selector: CallbackSelector) -> bool {
        self.slots.read()[selector.index()].is_some()
    }

    /// Jump to the handler for `raw`. Returns the selector that ran, or
    /// `None` when the selector is `-1`, out of range or unregistered.
    pub fn dispatch(&self, raw: i32, resolution: &Resolution) -> Option<CallbackSelector> {
        let selector = CallbackSelector::from_raw(raw)?;
        // clone out so a handler may re-register without deadlocking
        let handler = self.slots.read()[selector.index()].clone()?;
        handler.on_resolved(resolution);
        Some(selector)
    }
}

impl std::fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.read();
        let registered: Vec<CallbackSelector> = CallbackSelector::ALL
            .iter()
            .copied()
            .filter(|sel| slots[sel.index()].is_some())
            .collect();
        f.debug_struct("CallbackTable").field("registered", &registered).finish()
    }
}
