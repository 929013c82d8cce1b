// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Configuration for kube-knife
//!
//! User defaults live in ~/.kube-knife/config.json; command-line flags take
//! precedence over them. Everything kube-knife writes is stored under
//! ~/.kube-knife/:
//! - ~/.kube-knife/config.json - user configuration
//! - ~/.kube-knife/log/ - log files

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::Args;
use crate::error::{KnifeError, KnifeResult};
use crate::kubernetes::KubectlExecutor;

/// Default concurrency for discovery and execution
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default shell used to run the command in a pod
pub const DEFAULT_SHELL: &str = "sh";

/// Get the base kube-knife directory (~/.kube-knife/)
pub fn base_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".kube-knife"))
        .context("Could not determine home directory")
}

/// Persisted user defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shell used when --shell is not given
    #[serde(default)]
    pub shell: Option<String>,

    /// Concurrency limit when --max-concurrency is not given
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// kubectl binary when --kubectl is not given
    #[serde(default)]
    pub kubectl: Option<String>,
}

impl Config {
    /// Load config from disk, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the config file path (~/.kube-knife/config.json)
    pub fn config_path() -> Result<PathBuf> {
        Ok(base_dir()?.join("config.json"))
    }
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub context_pattern: String,
    pub namespace_pattern: String,
    pub pod_pattern: String,
    /// Treat the three patterns as literal names
    pub skip_filter: bool,
    /// Bound on in-flight context branches, and separately on in-flight executions
    pub concurrency: usize,
    pub shell: String,
    /// None lists pods instead of running anything
    pub command: Option<String>,
    pub kubectl: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            context_pattern: String::new(),
            namespace_pattern: String::new(),
            pod_pattern: String::new(),
            skip_filter: false,
            concurrency: DEFAULT_CONCURRENCY,
            shell: DEFAULT_SHELL.to_string(),
            command: None,
            kubectl: crate::kubernetes::DEFAULT_KUBECTL.to_string(),
        }
    }
}

impl RunConfig {
    /// Merge flags over file defaults and validate the result
    pub fn resolve(args: &Args, file: &Config) -> KnifeResult<Self> {
        let defaults = RunConfig::default();
        let config = Self {
            context_pattern: args.context.clone().unwrap_or_default(),
            namespace_pattern: args.namespace.clone().unwrap_or_default(),
            pod_pattern: args.pod.clone().unwrap_or_default(),
            skip_filter: args.skip_filter,
            concurrency: args
                .max_concurrency
                .or(file.max_concurrency)
                .unwrap_or(defaults.concurrency),
            shell: args
                .shell
                .clone()
                .or_else(|| file.shell.clone())
                .unwrap_or(defaults.shell),
            command: args.command.clone().filter(|c| !c.is_empty()),
            kubectl: args
                .kubectl
                .clone()
                .or_else(|| file.kubectl.clone())
                .unwrap_or(defaults.kubectl),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> KnifeResult<()> {
        if self.concurrency < 1 {
            return Err(KnifeError::Config(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        if self.shell.is_empty() {
            return Err(KnifeError::Config("shell must not be empty".to_string()));
        }
        if self.skip_filter {
            for (flag, value) in [
                ("--context", &self.context_pattern),
                ("--namespace", &self.namespace_pattern),
                ("--pod", &self.pod_pattern),
            ] {
                if value.is_empty() {
                    return Err(KnifeError::Config(format!(
                        "{} is required with --skip-filter",
                        flag
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether a command runs, as opposed to listing pods
    pub fn is_execution(&self) -> bool {
        self.command.is_some()
    }

    pub fn executor(&self) -> KubectlExecutor {
        KubectlExecutor::new(self.kubectl.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["kube-knife"];
        full.extend_from_slice(argv);
        Args::parse_from(full)
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.shell.is_none());
        assert!(config.max_concurrency.is_none());
        assert!(config.kubectl.is_none());
    }

    #[test]
    fn test_config_deserialize() {
        let json = r#"{"shell": "bash", "max_concurrency": 4}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.shell.as_deref(), Some("bash"));
        assert_eq!(config.max_concurrency, Some(4));
        assert!(config.kubectl.is_none());
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.shell.is_none());
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("config.json")).unwrap();
        assert!(config.max_concurrency.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"kubectl": "/opt/bin/kubectl"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.kubectl.as_deref(), Some("/opt/bin/kubectl"));
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_resolve_defaults() {
        let config = RunConfig::resolve(&args(&[]), &Config::default()).unwrap();
        assert_eq!(config, RunConfig::default());
        assert!(!config.is_execution());
    }

    #[test]
    fn test_flags_override_file() {
        let file = Config {
            shell: Some("bash".to_string()),
            max_concurrency: Some(4),
            kubectl: Some("kubectl-1.30".to_string()),
        };

        let config = RunConfig::resolve(&args(&[]), &file).unwrap();
        assert_eq!(config.shell, "bash");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.kubectl, "kubectl-1.30");

        let config =
            RunConfig::resolve(&args(&["-S", "zsh", "-m", "2", "--kubectl", "k"]), &file).unwrap();
        assert_eq!(config.shell, "zsh");
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.kubectl, "k");
    }

    #[test]
    fn test_empty_command_means_listing() {
        let config = RunConfig::resolve(&args(&["-C", ""]), &Config::default()).unwrap();
        assert!(!config.is_execution());

        let config = RunConfig::resolve(&args(&["-C", "uptime"]), &Config::default()).unwrap();
        assert_eq!(config.command.as_deref(), Some("uptime"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = RunConfig::resolve(&args(&["-m", "0"]), &Config::default()).unwrap_err();
        assert!(matches!(err, KnifeError::Config(_)));

        let file = Config {
            max_concurrency: Some(0),
            ..Config::default()
        };
        assert!(RunConfig::resolve(&args(&[]), &file).is_err());
    }

    #[test]
    fn test_skip_filter_requires_all_names() {
        let err = RunConfig::resolve(&args(&["-s", "-c", "prod", "-n", "web"]), &Config::default())
            .unwrap_err();
        assert!(err.to_string().contains("--pod is required"));

        let config = RunConfig::resolve(
            &args(&["-s", "-c", "prod", "-n", "web", "-p", "web-0"]),
            &Config::default(),
        )
        .unwrap();
        assert!(config.skip_filter);
        assert_eq!(config.pod_pattern, "web-0");
    }
}
