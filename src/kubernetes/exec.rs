// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Remote command execution through `kubectl exec`

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::trace;

use super::Executor;

/// Default kubectl binary, resolved through PATH
pub const DEFAULT_KUBECTL: &str = "kubectl";

/// Runs commands in pods by spawning `kubectl exec`
pub struct KubectlExecutor {
    kubectl: String,
}

impl KubectlExecutor {
    pub fn new(kubectl: impl Into<String>) -> Self {
        Self {
            kubectl: kubectl.into(),
        }
    }

    /// Arguments passed to kubectl for one pod
    fn args(context: &str, namespace: &str, pod: &str, shell: &str, command: &str) -> Vec<String> {
        [
            "exec",
            "--context",
            context,
            "-n",
            namespace,
            pod,
            "--",
            shell,
            "-c",
            command,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[async_trait]
impl Executor for KubectlExecutor {
    async fn execute(
        &self,
        context: &str,
        namespace: &str,
        pod: &str,
        shell: &str,
        command: &str,
    ) -> Result<Vec<u8>> {
        let args = Self::args(context, namespace, pod, shell, command);
        trace!(kubectl = %self.kubectl, args = ?args, "Spawning kubectl");

        let output = Command::new(&self.kubectl)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.kubectl))?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            Err(anyhow!("{}", output.status))
        } else {
            Err(anyhow!("{}: {}", output.status, stderr))
        }
    }
}
