// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Progress reporting for discovery and execution
//!
//! The engines publish what they are doing on a broadcast channel. The binary
//! uses it to drive a spinner, and failed or empty branches show up here as
//! `BranchFailed` so callers can surface them without the engine deciding how.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

use crate::engine::BranchFailure;

/// Create a spinner with consistent styling
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Progress update message
#[derive(Clone, Debug)]
pub enum ProgressUpdate {
    // === Connection ===
    /// Connecting to a cluster
    Connecting { cluster: String },
    /// Connected to a cluster
    Connected { cluster: String, elapsed_ms: u64 },

    // === Discovery ===
    /// Contexts surviving the context filter
    ContextsResolved { count: usize },
    /// One context finished discovery
    ContextDiscovered {
        context: String,
        leaves: usize,
        elapsed_ms: u64,
    },
    /// A namespace or pod listing failed or came back empty
    BranchFailed { failure: BranchFailure },

    // === Execution ===
    /// Command execution is starting
    ExecutionStarted { leaves: usize },
    /// One pod finished running the command
    LeafFinished {
        context: String,
        namespace: String,
        pod: String,
        ok: bool,
    },
}

/// Progress reporter shared by one run
pub struct ProgressReporter {
    sender: broadcast::Sender<ProgressUpdate>,
    /// Contexts done for the current discovery
    contexts_done: AtomicUsize,
    /// Contexts in the current discovery
    contexts_total: AtomicUsize,
    /// Pods done for the current execution
    leaves_done: AtomicUsize,
    /// Pods in the current execution
    leaves_total: AtomicUsize,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            sender,
            contexts_done: AtomicUsize::new(0),
            contexts_total: AtomicUsize::new(0),
            leaves_done: AtomicUsize::new(0),
            leaves_total: AtomicUsize::new(0),
        }
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }

    /// Report connecting to a cluster
    pub fn connecting(&self, cluster: &str) {
        let _ = self.sender.send(ProgressUpdate::Connecting {
            cluster: cluster.to_string(),
        });
    }

    /// Report connected to a cluster
    pub fn connected(&self, cluster: &str, elapsed_ms: u64) {
        let _ = self.sender.send(ProgressUpdate::Connected {
            cluster: cluster.to_string(),
            elapsed_ms,
        });
    }

    /// Report discovery start; resets the context counters
    pub fn contexts_resolved(&self, count: usize) {
        self.contexts_done.store(0, Ordering::SeqCst);
        self.contexts_total.store(count, Ordering::SeqCst);
        let _ = self.sender.send(ProgressUpdate::ContextsResolved { count });
    }

    pub fn context_discovered(&self, context: &str, leaves: usize, elapsed_ms: u64) {
        self.contexts_done.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(ProgressUpdate::ContextDiscovered {
            context: context.to_string(),
            leaves,
            elapsed_ms,
        });
    }

    pub fn branch_failed(&self, failure: &BranchFailure) {
        let _ = self.sender.send(ProgressUpdate::BranchFailed {
            failure: failure.clone(),
        });
    }

    /// Report execution start; resets the pod counters
    pub fn execution_started(&self, leaves: usize) {
        self.leaves_done.store(0, Ordering::SeqCst);
        self.leaves_total.store(leaves, Ordering::SeqCst);
        let _ = self.sender.send(ProgressUpdate::ExecutionStarted { leaves });
    }

    pub fn leaf_finished(&self, context: &str, namespace: &str, pod: &str, ok: bool) {
        self.leaves_done.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(ProgressUpdate::LeafFinished {
            context: context.to_string(),
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            ok,
        });
    }

    /// Discovery progress (done/total contexts)
    pub fn discovery_progress(&self) -> (usize, usize) {
        (
            self.contexts_done.load(Ordering::SeqCst),
            self.contexts_total.load(Ordering::SeqCst),
        )
    }

    /// Execution progress (done/total pods)
    pub fn execution_progress(&self) -> (usize, usize) {
        (
            self.leaves_done.load(Ordering::SeqCst),
            self.leaves_total.load(Ordering::SeqCst),
        )
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to progress reporter
pub type ProgressHandle = Arc<ProgressReporter>;

/// Create a new progress reporter handle
pub fn create_progress_handle() -> ProgressHandle {
    Arc::new(ProgressReporter::new())
}
