// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Hierarchical pod discovery
//!
//! One task per surviving context, admitted through a semaphore sized to the
//! concurrency limit. Each context task spawns one task per surviving namespace
//! (not separately bounded) and waits for all of them before reporting back.
//! A failing or empty namespace/pod listing only drops its own branch; only a
//! failure to list contexts aborts the run.

use anyhow::Result;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{BranchFailure, DiscoveryResult, FailureReason, Filter, Leaf};
use crate::config::RunConfig;
use crate::error::{KnifeError, KnifeResult};
use crate::kubernetes::{ResourceLister, ScopeLevel};
use crate::progress::ProgressHandle;

/// Filters for the three levels, compiled once per run
#[derive(Debug)]
struct Filters {
    context: Filter,
    namespace: Filter,
    pod: Filter,
}

/// What one branch (a context or a namespace) produced
#[derive(Debug, Default)]
struct Branch {
    leaves: Vec<Leaf>,
    failures: Vec<BranchFailure>,
}

impl Branch {
    fn failed(failure: BranchFailure) -> Self {
        Self {
            leaves: Vec::new(),
            failures: vec![failure],
        }
    }

    fn merge(&mut self, other: Branch) {
        self.leaves.extend(other.leaves);
        self.failures.extend(other.failures);
    }
}

/// Walks contexts -> namespaces -> pods and collects matching leaves
pub struct DiscoveryEngine {
    lister: Arc<dyn ResourceLister>,
    filters: Arc<Filters>,
    concurrency: usize,
    progress: Option<ProgressHandle>,
}

impl DiscoveryEngine {
    /// Compile the three patterns; fails before any listing happens
    pub fn new(lister: Arc<dyn ResourceLister>, config: &RunConfig) -> KnifeResult<Self> {
        if config.concurrency == 0 {
            return Err(KnifeError::Config(
                "concurrency limit must be at least 1".to_string(),
            ));
        }

        let skip = config.skip_filter;
        let filters = Filters {
            context: Filter::new(ScopeLevel::Context, &config.context_pattern, skip)?,
            namespace: Filter::new(ScopeLevel::Namespace, &config.namespace_pattern, skip)?,
            pod: Filter::new(ScopeLevel::Pod, &config.pod_pattern, skip)?,
        };

        Ok(Self {
            lister,
            filters: Arc::new(filters),
            concurrency: config.concurrency,
            progress: None,
        })
    }

    /// Publish discovery events to a progress handle
    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run discovery
    ///
    /// Only a failing context listing is an error. The returned leaf set has no
    /// duplicates and no defined order.
    pub async fn discover(&self) -> KnifeResult<DiscoveryResult> {
        let start = Instant::now();

        let contexts = select(&self.filters.context, self.lister.list_contexts())
            .await
            .map_err(KnifeError::RootDiscovery)?;
        let contexts = dedup(contexts);

        info!(
            contexts = contexts.len(),
            concurrency = self.concurrency,
            "Discovering pods"
        );
        if let Some(progress) = &self.progress {
            progress.contexts_resolved(contexts.len());
        }
        if contexts.is_empty() {
            warn!("No contexts matched the context filter");
            return Ok(DiscoveryResult::default());
        }

        // Fresh per run so concurrent runs never share admission state
        let limiter = Arc::new(Semaphore::new(self.concurrency));

        let handles: Vec<(String, JoinHandle<Branch>)> = contexts
            .into_iter()
            .map(|context| {
                let task = discover_context(
                    Arc::clone(&self.lister),
                    Arc::clone(&self.filters),
                    context.clone(),
                    Arc::clone(&limiter),
                    self.progress.clone(),
                );
                (context, tokio::spawn(task))
            })
            .collect();

        let mut seen = HashSet::new();
        let mut result = DiscoveryResult::default();
        for (context, handle) in handles {
            let branch = match handle.await {
                Ok(branch) => branch,
                Err(e) => {
                    error!(context = %context, error = %e, "Discovery task aborted");
                    Branch::failed(BranchFailure {
                        level: ScopeLevel::Namespace,
                        context,
                        namespace: None,
                        reason: FailureReason::Error(e.to_string()),
                    })
                }
            };
            for leaf in branch.leaves {
                if seen.insert(leaf.clone()) {
                    result.leaves.push(leaf);
                }
            }
            result.failures.extend(branch.failures);
        }

        info!(
            leaves = result.leaves.len(),
            failed_branches = result.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Discovery complete"
        );

        Ok(result)
    }
}

/// Apply `filter` to the names produced by `listing`
///
/// A literal filter never awaits the listing.
async fn select<F>(filter: &Filter, listing: F) -> Result<Vec<String>>
where
    F: Future<Output = Result<Vec<String>>>,
{
    if !filter.needs_listing() {
        return Ok(filter.apply(&[]));
    }
    let names = listing.await?;
    Ok(filter.apply(&names))
}

/// Drop repeated names, keeping first occurrences in order
fn dedup(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

fn record(progress: &Option<ProgressHandle>, failure: BranchFailure) -> Branch {
    warn!(
        level = %failure.level,
        context = %failure.context,
        namespace = ?failure.namespace,
        "{}",
        failure
    );
    if let Some(progress) = progress {
        progress.branch_failed(&failure);
    }
    Branch::failed(failure)
}

async fn discover_context(
    lister: Arc<dyn ResourceLister>,
    filters: Arc<Filters>,
    context: String,
    limiter: Arc<Semaphore>,
    progress: Option<ProgressHandle>,
) -> Branch {
    let (branch, elapsed_ms) = match limiter.acquire_owned().await {
        // Held until the walk returns, on every path
        Ok(_permit) => {
            let start = Instant::now();
            let branch = walk_context(&lister, &filters, &context, &progress).await;
            (branch, start.elapsed().as_millis() as u64)
        }
        Err(e) => {
            let failure = BranchFailure {
                level: ScopeLevel::Namespace,
                context: context.clone(),
                namespace: None,
                reason: FailureReason::Error(e.to_string()),
            };
            (record(&progress, failure), 0)
        }
    };

    debug!(
        context = %context,
        leaves = branch.leaves.len(),
        elapsed_ms = elapsed_ms,
        "Context discovered"
    );
    if let Some(progress) = &progress {
        progress.context_discovered(&context, branch.leaves.len(), elapsed_ms);
    }

    branch
}

/// List namespaces of one context and fan out over them
async fn walk_context(
    lister: &Arc<dyn ResourceLister>,
    filters: &Arc<Filters>,
    context: &str,
    progress: &Option<ProgressHandle>,
) -> Branch {
    let namespaces = match select(&filters.namespace, lister.list_namespaces(context)).await {
        Ok(namespaces) => dedup(namespaces),
        Err(e) => {
            return record(
                progress,
                BranchFailure {
                    level: ScopeLevel::Namespace,
                    context: context.to_string(),
                    namespace: None,
                    reason: FailureReason::Error(format!("{:#}", e)),
                },
            );
        }
    };

    if namespaces.is_empty() {
        return record(
            progress,
            BranchFailure {
                level: ScopeLevel::Namespace,
                context: context.to_string(),
                namespace: None,
                reason: FailureReason::Empty,
            },
        );
    }

    debug!(context = %context, namespaces = namespaces.len(), "Listing pods");

    let handles: Vec<(String, JoinHandle<Branch>)> = namespaces
        .into_iter()
        .map(|namespace| {
            let task = discover_namespace(
                Arc::clone(lister),
                Arc::clone(filters),
                context.to_string(),
                namespace.clone(),
                progress.clone(),
            );
            (namespace, tokio::spawn(task))
        })
        .collect();

    let mut branch = Branch::default();
    for (namespace, handle) in handles {
        match handle.await {
            Ok(ns_branch) => branch.merge(ns_branch),
            Err(e) => {
                error!(
                    context = %context,
                    namespace = %namespace,
                    error = %e,
                    "Pod listing task aborted"
                );
                branch.merge(Branch::failed(BranchFailure {
                    level: ScopeLevel::Pod,
                    context: context.to_string(),
                    namespace: Some(namespace),
                    reason: FailureReason::Error(e.to_string()),
                }));
            }
        }
    }

    branch
}

async fn discover_namespace(
    lister: Arc<dyn ResourceLister>,
    filters: Arc<Filters>,
    context: String,
    namespace: String,
    progress: Option<ProgressHandle>,
) -> Branch {
    let pods = match select(&filters.pod, lister.list_pods(&context, &namespace)).await {
        Ok(pods) => dedup(pods),
        Err(e) => {
            return record(
                &progress,
                BranchFailure {
                    level: ScopeLevel::Pod,
                    context,
                    namespace: Some(namespace),
                    reason: FailureReason::Error(format!("{:#}", e)),
                },
            );
        }
    };

    if pods.is_empty() {
        return record(
            &progress,
            BranchFailure {
                level: ScopeLevel::Pod,
                context,
                namespace: Some(namespace),
                reason: FailureReason::Empty,
            },
        );
    }

    debug!(context = %context, namespace = %namespace, pods = pods.len(), "Found pods");

    let leaves = pods
        .into_iter()
        .map(|pod| Leaf::new(context.clone(), namespace.clone(), pod))
        .collect();

    Branch {
        leaves,
        failures: Vec::new(),
    }
}
