// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Runs one command on every discovered pod
//!
//! Every leaf gets its own task, admitted through a semaphore sized to the
//! concurrency limit. A leaf's output block is formatted in full and written
//! under a single lock of the sink, so lines of one pod never interleave with
//! another pod's lines. Across pods, blocks appear in completion order.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ExecutionOutcome, Leaf};
use crate::config::RunConfig;
use crate::error::{KnifeError, KnifeResult};
use crate::kubernetes::Executor;
use crate::progress::ProgressHandle;

/// Summary of one execution run
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub succeeded: usize,
    /// Leaves whose command failed, with the reported message
    pub failed: Vec<(Leaf, String)>,
}

impl ExecutionReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Format the output block of one leaf
///
/// Successful output loses exactly one trailing newline and becomes one
/// `"<context> <namespace> <pod>: <line>"` per line, with any `\r` before a
/// newline dropped; empty output still yields one line. A failure becomes a
/// single line carrying the message.
pub fn format_outcome(leaf: &Leaf, outcome: &ExecutionOutcome) -> String {
    let mut block = String::new();
    match outcome {
        ExecutionOutcome::Success(raw) => {
            let decoded = String::from_utf8_lossy(raw);
            let text: &str = decoded.as_ref();
            let text = text.strip_suffix('\n').unwrap_or(text);
            for line in text.split('\n') {
                let line = line.strip_suffix('\r').unwrap_or(line);
                block.push_str(&format!("{}: {}\n", leaf, line));
            }
        }
        ExecutionOutcome::Failure(message) => {
            let message = message.lines().collect::<Vec<_>>().join(" ");
            block.push_str(&format!("{}: {}\n", leaf, message));
        }
    }
    block
}

/// Fans a command out over leaves with bounded concurrency
pub struct ExecutionEngine {
    executor: Arc<dyn Executor>,
    shell: String,
    command: String,
    concurrency: usize,
    progress: Option<ProgressHandle>,
}

impl ExecutionEngine {
    pub fn new(executor: Arc<dyn Executor>, config: &RunConfig) -> KnifeResult<Self> {
        if config.concurrency == 0 {
            return Err(KnifeError::Config(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        let command = match config.command.as_deref() {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => {
                return Err(KnifeError::Config(
                    "no command configured for execution".to_string(),
                ));
            }
        };

        Ok(Self {
            executor,
            shell: config.shell.clone(),
            command,
            concurrency: config.concurrency,
            progress: None,
        })
    }

    /// Publish execution events to a progress handle
    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the command on every leaf and write formatted output to `sink`
    ///
    /// Returns once every leaf has an outcome.
    pub async fn run<W>(&self, leaves: Vec<Leaf>, sink: Arc<Mutex<W>>) -> ExecutionReport
    where
        W: Write + Send + 'static,
    {
        let start = Instant::now();
        info!(
            leaves = leaves.len(),
            concurrency = self.concurrency,
            shell = %self.shell,
            command = %self.command,
            "Executing command"
        );
        if let Some(progress) = &self.progress {
            progress.execution_started(leaves.len());
        }

        // Independent of discovery's limiter
        let limiter = Arc::new(Semaphore::new(self.concurrency));

        let handles: Vec<(Leaf, JoinHandle<ExecutionOutcome>)> = leaves
            .into_iter()
            .map(|leaf| {
                let task = execute_leaf(
                    Arc::clone(&self.executor),
                    leaf.clone(),
                    self.shell.clone(),
                    self.command.clone(),
                    Arc::clone(&limiter),
                    Arc::clone(&sink),
                    self.progress.clone(),
                );
                (leaf, tokio::spawn(task))
            })
            .collect();

        let mut report = ExecutionReport::default();
        for (leaf, handle) in handles {
            match handle.await {
                Ok(ExecutionOutcome::Success(_)) => report.succeeded += 1,
                Ok(ExecutionOutcome::Failure(message)) => report.failed.push((leaf, message)),
                Err(e) => {
                    error!(leaf = %leaf, error = %e, "Execution task aborted");
                    report.failed.push((leaf, e.to_string()));
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Execution complete"
        );

        report
    }
}

async fn execute_leaf<W>(
    executor: Arc<dyn Executor>,
    leaf: Leaf,
    shell: String,
    command: String,
    limiter: Arc<Semaphore>,
    sink: Arc<Mutex<W>>,
    progress: Option<ProgressHandle>,
) -> ExecutionOutcome
where
    W: Write + Send + 'static,
{
    let outcome = {
        // Released at the end of this block on both outcome paths
        let _permit = match limiter.acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return ExecutionOutcome::Failure(e.to_string()),
        };
        let start = Instant::now();
        let result = executor
            .execute(&leaf.context, &leaf.namespace, &leaf.pod, &shell, &command)
            .await;
        debug!(
            leaf = %leaf,
            ok = result.is_ok(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Command finished"
        );
        match result {
            Ok(raw) => ExecutionOutcome::Success(raw),
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(leaf = %leaf, error = %message, "Command failed");
                ExecutionOutcome::Failure(message)
            }
        }
    };

    let block = format_outcome(&leaf, &outcome);
    match sink.lock() {
        Ok(mut out) => {
            if let Err(e) = out.write_all(block.as_bytes()).and_then(|_| out.flush()) {
                error!(leaf = %leaf, error = %e, "Failed to write output");
            }
        }
        Err(e) => error!(leaf = %leaf, error = %e, "Output sink poisoned"),
    }

    if let Some(progress) = &progress {
        progress.leaf_finished(&leaf.context, &leaf.namespace, &leaf.pod, outcome.is_success());
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeExecutor;
    use std::collections::HashSet;
    use std::time::Duration;

    fn leaf() -> Leaf {
        Leaf::new("ctx1", "ns1", "pod1")
    }

    fn success(s: &str) -> ExecutionOutcome {
        ExecutionOutcome::Success(s.as_bytes().to_vec())
    }

    fn config(command: &str, concurrency: usize) -> RunConfig {
        RunConfig {
            command: Some(command.to_string()),
            concurrency,
            ..RunConfig::default()
        }
    }

    async fn run(
        executor: Arc<FakeExecutor>,
        leaves: Vec<Leaf>,
        concurrency: usize,
    ) -> (String, ExecutionReport) {
        let sink = Arc::new(Mutex::new(Vec::<u8>::new()));
        let engine = ExecutionEngine::new(executor, &config("uptime", concurrency)).unwrap();
        let report = engine.run(leaves, Arc::clone(&sink)).await;
        let out = String::from_utf8(sink.lock().unwrap().clone()).unwrap();
        (out, report)
    }

    #[test]
    fn test_format_multiline() {
        assert_eq!(
            format_outcome(&leaf(), &success("hello\nworld")),
            "ctx1 ns1 pod1: hello\nctx1 ns1 pod1: world\n"
        );
    }

    #[test]
    fn test_format_strips_one_trailing_newline() {
        assert_eq!(
            format_outcome(&leaf(), &success("hello\nworld\n")),
            "ctx1 ns1 pod1: hello\nctx1 ns1 pod1: world\n"
        );
        // Only one terminator goes; the blank line before it is real output
        assert_eq!(
            format_outcome(&leaf(), &success("hello\n\n")),
            "ctx1 ns1 pod1: hello\nctx1 ns1 pod1: \n"
        );
        assert_eq!(
            format_outcome(&leaf(), &success("hello\r\n")),
            "ctx1 ns1 pod1: hello\n"
        );
    }

    #[test]
    fn test_format_crlf_output() {
        assert_eq!(
            format_outcome(&leaf(), &success("a\r\nb\r\n")),
            "ctx1 ns1 pod1: a\nctx1 ns1 pod1: b\n"
        );
    }

    #[test]
    fn test_format_empty_output() {
        assert_eq!(format_outcome(&leaf(), &success("")), "ctx1 ns1 pod1: \n");
        assert_eq!(format_outcome(&leaf(), &success("\n")), "ctx1 ns1 pod1: \n");
    }

    #[test]
    fn test_format_single_line() {
        assert_eq!(
            format_outcome(&leaf(), &success("singleLine")),
            "ctx1 ns1 pod1: singleLine\n"
        );
    }

    #[test]
    fn test_format_failure() {
        let outcome = ExecutionOutcome::Failure("boom".to_string());
        assert_eq!(format_outcome(&leaf(), &outcome), "ctx1 ns1 pod1: boom\n");
    }

    #[test]
    fn test_format_failure_is_one_line() {
        let outcome =
            ExecutionOutcome::Failure("exit status: 1: error\ncontainer not found".to_string());
        assert_eq!(
            format_outcome(&leaf(), &outcome),
            "ctx1 ns1 pod1: exit status: 1: error container not found\n"
        );
    }

    #[test]
    fn test_format_invalid_utf8_is_lossy() {
        let outcome = ExecutionOutcome::Success(vec![b'o', b'k', 0xff]);
        assert_eq!(format_outcome(&leaf(), &outcome), "ctx1 ns1 pod1: ok\u{fffd}\n");
    }

    #[tokio::test]
    async fn test_run_success_and_failure() {
        let executor = Arc::new(
            FakeExecutor::new()
                .output("pod1", "hello\nworld\n")
                .failure("pod2", "boom"),
        );
        let leaves = vec![Leaf::new("ctx1", "ns1", "pod1"), Leaf::new("ctx1", "ns1", "pod2")];

        let (out, report) = run(executor.clone(), leaves, 10).await;

        let lines: HashSet<&str> = out.lines().collect();
        let expected: HashSet<&str> = [
            "ctx1 ns1 pod1: hello",
            "ctx1 ns1 pod1: world",
            "ctx1 ns1 pod2: boom",
        ]
        .into_iter()
        .collect();
        assert_eq!(lines, expected);
        assert_eq!(out.lines().count(), 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, vec![(Leaf::new("ctx1", "ns1", "pod2"), "boom".to_string())]);
        assert_eq!(report.total(), 2);
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_each_leaf_executed_once_with_shell_and_command() {
        let executor = Arc::new(FakeExecutor::new());
        let leaves: Vec<Leaf> = (0..5).map(|i| Leaf::new("c", "n", format!("p{i}"))).collect();

        let (out, report) = run(executor.clone(), leaves, 2).await;

        assert_eq!(report.succeeded, 5);
        assert_eq!(out.lines().count(), 5);
        let calls = executor.invocations.lock().unwrap();
        assert_eq!(calls.len(), 5);
        let pods: HashSet<&str> = calls.iter().map(|c| c.2.as_str()).collect();
        assert_eq!(pods.len(), 5);
        assert!(calls.iter().all(|c| c.3 == "sh" && c.4 == "uptime"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let executor = Arc::new(FakeExecutor::new().with_delay(Duration::from_millis(20)));
        let leaves: Vec<Leaf> = (0..12).map(|i| Leaf::new("c", "n", format!("p{i}"))).collect();

        let (_, report) = run(executor.clone(), leaves, 4).await;

        assert_eq!(report.total(), 12);
        let peak = executor.in_flight.peak();
        assert!(peak <= 4, "peak in-flight executions was {}", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_failed_leaves_release_their_permit() {
        let executor = Arc::new(
            FakeExecutor::new()
                .failure("p0", "boom")
                .failure("p1", "boom")
                .output("p2", "ok")
                .output("p3", "ok"),
        );
        let leaves: Vec<Leaf> = (0..4).map(|i| Leaf::new("c", "n", format!("p{i}"))).collect();

        let (out, report) = tokio::time::timeout(Duration::from_secs(5), run(executor, leaves, 1))
            .await
            .expect("execution stalled on a held permit");

        assert_eq!(report.total(), 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(out.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_leaf_blocks_do_not_interleave() {
        let many = (0..50).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let mut executor = FakeExecutor::new().with_delay(Duration::from_millis(1));
        for p in 0..8 {
            executor = executor.output(&format!("p{p}"), &many);
        }
        let leaves: Vec<Leaf> = (0..8).map(|i| Leaf::new("c", "n", format!("p{i}"))).collect();

        let (out, _) = run(Arc::new(executor), leaves, 8).await;

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 400);
        for block in lines.chunks(50) {
            let prefix = block[0].split(": ").next().unwrap();
            for (i, line) in block.iter().enumerate() {
                assert_eq!(*line, format!("{}: line{}", prefix, i));
            }
        }
    }

    #[tokio::test]
    async fn test_no_leaves() {
        let (out, report) = run(Arc::new(FakeExecutor::new()), vec![], 3).await;
        assert!(out.is_empty());
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_missing_command_rejected() {
        let config = RunConfig::default();
        let err = ExecutionEngine::new(Arc::new(FakeExecutor::new()), &config)
            .err()
            .unwrap();
        assert!(matches!(err, KnifeError::Config(_)));
    }
}
