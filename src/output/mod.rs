// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Rendering of the pod listing (no command given)

mod csv;
mod json;
mod table;
mod yaml;

pub use csv::CsvFormatter;
pub use json::JsonFormatter;
pub use table::TableFormatter;
pub use yaml::YamlFormatter;

use serde_json::{Map, Value};

use crate::cli::OutputFormat;
use crate::engine::Leaf;

/// Column names of the listing
pub const COLUMNS: [&str; 3] = ["context", "namespace", "pod"];

#[derive(Debug, Clone)]
pub struct Listing {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Listing {
    /// One row per leaf, in the given order
    pub fn from_leaves(leaves: &[Leaf]) -> Self {
        Self {
            columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: leaves
                .iter()
                .map(|l| vec![l.context.clone(), l.namespace.clone(), l.pod.clone()])
                .collect(),
        }
    }

    pub fn format(&self, format: &OutputFormat, no_headers: bool) -> String {
        match format {
            OutputFormat::Table => TableFormatter::format(self, no_headers),
            OutputFormat::Json => JsonFormatter::format(self),
            OutputFormat::Csv => CsvFormatter::format(self, no_headers),
            OutputFormat::Yaml => YamlFormatter::format(self),
        }
    }

    /// Rows as objects keyed by column name
    fn to_json_rows(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let obj: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(|v| Value::String(v.clone())))
                    .collect();
                Value::Object(obj)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Listing {
        Listing::from_leaves(&[
            Leaf::new("prod", "web", "nginx-0"),
            Leaf::new("prod", "web", "nginx-1"),
        ])
    }

    #[test]
    fn test_from_leaves() {
        let listing = listing();
        assert_eq!(listing.columns, vec!["context", "namespace", "pod"]);
        assert_eq!(listing.rows[1], vec!["prod", "web", "nginx-1"]);
    }

    #[test]
    fn test_json_rows() {
        let rows = listing().to_json_rows();
        assert_eq!(rows[0]["context"], "prod");
        assert_eq!(rows[0]["pod"], "nginx-0");
    }

    #[test]
    fn test_json_format() {
        let out = listing().format(&OutputFormat::Json, false);
        let parsed: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["namespace"], "web");
    }

    #[test]
    fn test_yaml_format() {
        let out = listing().format(&OutputFormat::Yaml, false);
        assert!(out.contains("pod: nginx-0"));
        assert!(out.contains("context: prod"));
    }
}
