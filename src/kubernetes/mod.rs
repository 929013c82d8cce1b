// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Collaborators that reach the clusters
//!
//! The engine only talks to Kubernetes through the two traits defined here,
//! so tests can drive discovery and execution with in-memory fakes.

mod client;
mod exec;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

pub use client::KubeLister;
pub use exec::{DEFAULT_KUBECTL, KubectlExecutor};

/// Level of the context -> namespace -> pod hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeLevel {
    Context,
    Namespace,
    Pod,
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeLevel::Context => write!(f, "context"),
            ScopeLevel::Namespace => write!(f, "namespace"),
            ScopeLevel::Pod => write!(f, "pod"),
        }
    }
}

/// Enumerates the names one level below a scope
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// All context names known to the kubeconfig
    async fn list_contexts(&self) -> Result<Vec<String>>;

    /// Namespace names in one context
    async fn list_namespaces(&self, context: &str) -> Result<Vec<String>>;

    /// Pod names in one namespace of one context
    async fn list_pods(&self, context: &str, namespace: &str) -> Result<Vec<String>>;
}

/// Runs a command inside one pod
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `command` with `shell -c` and return its raw stdout
    async fn execute(
        &self,
        context: &str,
        namespace: &str,
        pod: &str,
        shell: &str,
        command: &str,
    ) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_level_display() {
        assert_eq!(ScopeLevel::Context.to_string(), "context");
        assert_eq!(ScopeLevel::Namespace.to_string(), "namespace");
        assert_eq!(ScopeLevel::Pod.to_string(), "pod");
    }
}
