// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fault injection for writes into caller-owned memory

use libc::{EFAULT, EPERM};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::usermem::UserWriteError;

/// Operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultOp {
    /// A segment copy into the caller buffer.
    WriteUser,
}

/// Errno values a synthetic failure can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultErrno {
    Efault,
    Eperm,
}

impl FaultErrno {
    pub fn raw(self) -> i32 {
        match self {
            FaultErrno::Efault => EFAULT,
            FaultErrno::Eperm => EPERM,
        }
    }

    fn to_error(self) -> UserWriteError {
        UserWriteError { errno: self.raw() }
    }
}

/// Which op fails, after how many clean calls, and how often.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRule {
    pub op: FaultOp,
    pub errno: FaultErrno,
    /// Leading calls that succeed before the rule starts firing.
    #[serde(default)]
    pub start_after: u64,
    #[serde(default)]
    pub max_faults: Option<u64>,
}

impl Default for FaultRule {
    fn default() -> Self {
        Self {
            op: FaultOp::WriteUser,
            errno: FaultErrno::Efault,
            start_after: 0,
            max_faults: None,
        }
    }
}

/// JSON policy, as accepted by `dentry-ctl --fault-policy`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<FaultRule>,
}

impl FaultPolicy {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Fail the `nth` (1-based) user write with `errno`, once.
    pub fn fail_nth_write(nth: u64, errno: FaultErrno) -> Self {
        Self {
            enabled: true,
            rules: vec![FaultRule {
                op: FaultOp::WriteUser,
                errno,
                start_after: nth.saturating_sub(1),
                max_faults: Some(1),
            }],
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.rules.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
struct RuleCounters {
    hits: u64,
    invocations: u64,
}

#[derive(Debug, Default)]
struct FaultState {
    policy: FaultPolicy,
    counters: Vec<RuleCounters>,
}

/// Runtime controller holding the active policy and per-rule counters.
#[derive(Debug, Default)]
pub struct FaultInjector {
    state: Mutex<FaultState>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: FaultPolicy) -> Self {
        let injector = Self::new();
        injector.set_policy(policy);
        injector
    }

    pub fn snapshot(&self) -> FaultPolicy {
        self.state.lock().policy.clone()
    }

    pub fn set_policy(&self, policy: FaultPolicy) {
        let mut guard = self.state.lock();
        guard.counters = vec![RuleCounters::default(); policy.rules.len()];
        guard.policy = policy;
    }

    pub fn clear(&self) {
        self.set_policy(FaultPolicy::default());
    }

    /// Total faults injected since the policy was installed.
    pub fn injected(&self) -> u64 {
        self.state.lock().counters.iter().map(|c| c.hits).sum()
    }

    pub fn should_fault(&self, op: FaultOp) -> Option<UserWriteError> {
        let mut guard = self.state.lock();
        if !guard.policy.enabled {
            return None;
        }
        let FaultState { policy, counters } = &mut *guard;
        for (rule, counter) in policy.rules.iter().zip(counters.iter_mut()) {
            if rule.op != op {
                continue;
            }
            counter.invocations = counter.invocations.saturating_add(1);
            if counter.invocations <= rule.start_after {
                continue;
            }
            if rule.max_faults.is_some_and(|max| counter.hits >= max) {
                continue;
            }
            counter.hits = counter.hits.saturating_add(1);
            return Some(rule.errno.to_error());
        }
        None
    }
}
