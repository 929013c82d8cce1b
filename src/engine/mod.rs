// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Pod discovery and fan-out command execution
//!
//! Discovery walks contexts -> namespaces -> pods, filtering each level and
//! producing a flat set of [`Leaf`] targets. Execution runs one command on
//! every leaf and writes attributed output lines.

mod discovery;
mod execution;
mod filter;

use std::fmt;

use crate::kubernetes::ScopeLevel;

pub use discovery::DiscoveryEngine;
pub use execution::ExecutionEngine;
pub use filter::Filter;

/// One execution target: a pod in a namespace of a context
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Leaf {
    pub context: String,
    pub namespace: String,
    pub pod: String,
}

impl Leaf {
    pub fn new(
        context: impl Into<String>,
        namespace: impl Into<String>,
        pod: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            namespace: namespace.into(),
            pod: pod.into(),
        }
    }
}

/// Prefix used on every output line of this leaf
impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.context, self.namespace, self.pod)
    }
}

/// Why a branch contributed no leaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The listing call failed
    Error(String),
    /// The listing succeeded but nothing survived the filter
    Empty,
}

/// A namespace or pod listing that yielded nothing for one branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFailure {
    /// Level that was being listed
    pub level: ScopeLevel,
    pub context: String,
    /// Set when pods of a namespace were being listed
    pub namespace: Option<String>,
    pub reason: FailureReason,
}

impl fmt::Display for BranchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match &self.namespace {
            Some(ns) => format!("{}/{}", self.context, ns),
            None => self.context.clone(),
        };
        match &self.reason {
            FailureReason::Error(e) => {
                write!(f, "listing {}s in {} failed: {}", self.level, scope, e)
            }
            FailureReason::Empty => write!(f, "no matching {}s in {}", self.level, scope),
        }
    }
}

/// Output of one discovery run
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    /// Unique leaves, in no particular order
    pub leaves: Vec<Leaf>,
    /// Branches that contributed nothing
    pub failures: Vec<BranchFailure>,
}

impl DiscoveryResult {
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Leaves sorted by context, namespace, pod
    pub fn sorted_leaves(&self) -> Vec<Leaf> {
        let mut leaves = self.leaves.clone();
        leaves.sort();
        leaves
    }
}

/// Result of running the command on one leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Raw stdout, possibly empty
    Success(Vec<u8>),
    /// Error message from the executor
    Failure(String),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }
}
