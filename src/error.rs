// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Fatal errors of a kube-knife run
//!
//! Only failures that abort the whole run live here. A namespace or pod listing
//! that fails for one branch, or a command that fails on one pod, is recorded as
//! a value by the engine and never surfaces as a `KnifeError`.

use thiserror::Error;

use crate::kubernetes::ScopeLevel;

#[derive(Debug, Error)]
pub enum KnifeError {
    /// Invalid or unusable configuration, detected before discovery starts
    #[error("configuration error: {0}")]
    Config(String),

    /// A filter pattern that does not compile as a regular expression
    #[error("invalid {level} pattern '{pattern}': {error}")]
    InvalidPattern {
        level: ScopeLevel,
        pattern: String,
        error: regex::Error,
    },

    /// Listing the top-level contexts failed
    #[error("failed to list contexts: {0:#}")]
    RootDiscovery(anyhow::Error),
}

pub type KnifeResult<T> = std::result::Result<T, KnifeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_message() {
        let error = regex::Regex::new("(").unwrap_err();
        let err = KnifeError::InvalidPattern {
            level: ScopeLevel::Namespace,
            pattern: "(".to_string(),
            error,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("invalid namespace pattern '('"));
    }

    #[test]
    fn test_root_discovery_keeps_cause_chain() {
        let cause = anyhow::anyhow!("no kubeconfig").context("reading kubeconfig");
        let err = KnifeError::RootDiscovery(cause);
        assert_eq!(
            err.to_string(),
            "failed to list contexts: reading kubeconfig: no kubeconfig"
        );
    }
}
