// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "kube-knife")]
#[command(
    author,
    version,
    about = "Run a shell command in every pod matching context, namespace and pod regexes"
)]
pub struct Args {
    /// Context regex (unanchored; empty matches every context)
    #[arg(short, long, value_name = "REGEX")]
    pub context: Option<String>,

    /// Namespace regex
    #[arg(short, long, value_name = "REGEX")]
    pub namespace: Option<String>,

    /// Pod regex
    #[arg(short, long, value_name = "REGEX")]
    pub pod: Option<String>,

    /// Command to run in each pod; if empty, just list pods
    #[arg(short = 'C', long)]
    pub command: Option<String>,

    /// Shell used to run the command [default: sh]
    #[arg(short = 'S', long)]
    pub shell: Option<String>,

    /// Skip filtering: treat --context, --namespace and --pod as exact names
    #[arg(short, long)]
    pub skip_filter: bool,

    /// Maximum concurrent clusters during discovery and pods during execution [default: 10]
    #[arg(short, long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// kubectl binary used to exec into pods [default: kubectl]
    #[arg(long, value_name = "PATH")]
    pub kubectl: Option<String>,

    /// Output format for the pod listing
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Omit column headers in the pod listing
    #[arg(long)]
    pub no_headers: bool,

    /// Debug mode: verbose logging, also to stderr
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
    Yaml,
}
