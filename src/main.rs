// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod cli;
pub mod config;
mod engine;
mod error;
mod kubernetes;
mod output;
pub mod progress;

use anyhow::Result;
use clap::Parser;
use kube::config::Kubeconfig;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use tracing_subscriber::prelude::*;

use cli::Args;
use config::RunConfig;
use engine::{DiscoveryEngine, DiscoveryResult, ExecutionEngine, FailureReason};
use error::KnifeError;
use kubernetes::KubeLister;
use output::Listing;
use progress::{ProgressHandle, ProgressUpdate, create_progress_handle, create_spinner};

/// Initialize logging with file output and optional stderr
fn init_logging(debug: bool) {
    use tracing_rolling_file::{RollingConditionBase, RollingFileAppenderBase};
    use tracing_subscriber::fmt::format::FmtSpan;

    let filter = if debug {
        "kube_knife=debug"
    } else {
        "kube_knife=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let log_dir = config::base_dir()
        .map(|p| p.join("log"))
        .unwrap_or_else(|_| std::path::PathBuf::from("."));

    // File appender with size-based rotation:
    // - Max 10MB per file
    // - Keep up to 5 files
    // - Also rotate daily
    let file_appender = std::fs::create_dir_all(&log_dir)
        .map_err(|e| e.to_string())
        .and_then(|_| {
            let condition = RollingConditionBase::new()
                .daily()
                .max_size(10 * 1024 * 1024);
            RollingFileAppenderBase::new(log_dir.join("kube-knife.log"), condition, 5)
                .map_err(|e| e.to_string())
        });

    let file_layer = match file_appender {
        Ok(appender) => {
            let (non_blocking, guard) = appender.get_non_blocking_appender();
            // Leak the guard to keep the background writer alive
            std::mem::forget(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_span_events(FmtSpan::NONE),
            )
        }
        Err(e) => {
            eprintln!("Warning: Could not create log file: {}", e);
            None
        }
    };

    let stderr_layer = debug.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::NONE)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (aws-lc-rs); an error means one is already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let args = Args::parse();
    init_logging(args.debug);

    let all_ok = run(&args).await?;
    if !all_ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Discover pods, then list them or run the command on each
///
/// Returns false when the command failed on at least one pod.
async fn run(args: &Args) -> Result<bool> {
    let file_config =
        config::Config::load().map_err(|e| KnifeError::Config(format!("{:#}", e)))?;
    let run_config = RunConfig::resolve(args, &file_config)?;
    debug!(config = ?run_config, "Starting kube-knife");

    let progress = create_progress_handle();
    let lister = build_lister(&run_config)?.with_progress(Arc::clone(&progress));

    let discovery =
        DiscoveryEngine::new(Arc::new(lister), &run_config)?.with_progress(Arc::clone(&progress));
    // Spinner only for listings; in execution mode stderr stays quiet
    let interactive = !args.debug && !run_config.is_execution();
    let result = discover_with_spinner(&discovery, &progress, interactive).await?;
    report_branch_failures(&result, args.debug);

    if !run_config.is_execution() {
        debug!("Listing pods");
        let listing = Listing::from_leaves(&result.sorted_leaves());
        println!("{}", listing.format(&args.output, args.no_headers));
        return Ok(true);
    }

    if result.is_empty() {
        eprintln!("No pods matched; nothing to run");
        return Ok(true);
    }

    debug!(pods = result.leaves.len(), "Executing command on pods");
    let executor = Arc::new(run_config.executor());
    let execution =
        ExecutionEngine::new(executor, &run_config)?.with_progress(Arc::clone(&progress));
    let sink = Arc::new(Mutex::new(std::io::stdout()));
    let report = execution.run(result.leaves, sink).await;

    let (done, total) = progress.execution_progress();
    debug!(
        done = done,
        total = total,
        failed = report.failed.len(),
        "Finished executing command"
    );
    if report.has_failures() {
        warn!(
            failed = report.failed.len(),
            total = report.total(),
            "Command failed on some pods"
        );
    }

    Ok(!report.has_failures())
}

/// Kubeconfig is only needed for listing; skip-filter mode works without one
fn build_lister(config: &RunConfig) -> Result<KubeLister, KnifeError> {
    match KubeLister::from_kubeconfig() {
        Ok(lister) => Ok(lister),
        Err(e) if config.skip_filter => {
            debug!(error = %e, "No kubeconfig, continuing with literal names");
            Ok(KubeLister::new(Kubeconfig::default()))
        }
        Err(e) => Err(KnifeError::Config(format!("{:#}", e))),
    }
}

/// Run discovery, showing a spinner when `interactive` and stderr is a terminal
async fn discover_with_spinner(
    discovery: &DiscoveryEngine,
    progress: &ProgressHandle,
    interactive: bool,
) -> Result<DiscoveryResult, KnifeError> {
    if !interactive || !console::Term::stderr().is_term() {
        return discovery.discover().await;
    }

    let spinner = create_spinner("Discovering pods...");
    let mut progress_rx = progress.subscribe();
    let mut discover = Box::pin(discovery.discover());

    let result = loop {
        tokio::select! {
            biased;
            update = progress_rx.recv() => {
                match update {
                    Ok(ProgressUpdate::Connecting { cluster }) => {
                        spinner.set_message(format!("Connecting to {}...", cluster));
                    }
                    Ok(ProgressUpdate::ContextsResolved { count }) => {
                        spinner.set_message(format!("Discovering pods in {} contexts...", count));
                    }
                    Ok(ProgressUpdate::ContextDiscovered { context, leaves, .. }) => {
                        let (done, total) = progress.discovery_progress();
                        spinner.set_message(format!(
                            "[{}/{}] {}: {} pods found", done, total, context, leaves
                        ));
                    }
                    _ => {}
                }
            }
            result = &mut discover => {
                break result;
            }
        }
    };

    spinner.finish_and_clear();
    result
}

/// Surface failed listings; empty branches are only logged
///
/// In debug mode every failure is already on stderr through the log.
fn report_branch_failures(result: &DiscoveryResult, debug: bool) {
    if !debug {
        for failure in &result.failures {
            if matches!(failure.reason, FailureReason::Error(_)) {
                eprintln!("Warning: {}", failure);
            }
        }
    }
    if !result.failures.is_empty() {
        warn!(
            failed_branches = result.failure_count(),
            "Some branches contributed no pods"
        );
    }
}
