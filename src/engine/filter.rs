// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use regex::Regex;

use crate::error::{KnifeError, KnifeResult};
use crate::kubernetes::ScopeLevel;

/// Selects names at one level of the hierarchy
///
/// A `Pattern` keeps candidates the regex matches anywhere (unanchored).
/// A `Literal` ignores the candidates and yields the literal as the only name,
/// which is how skip-filter mode addresses a resource without listing it.
#[derive(Debug, Clone)]
pub enum Filter {
    Pattern(Regex),
    Literal(String),
}

impl Filter {
    /// Compile `pattern` for `level`, or keep it verbatim when `skip` is set
    pub fn new(level: ScopeLevel, pattern: &str, skip: bool) -> KnifeResult<Self> {
        if skip {
            return Ok(Filter::Literal(pattern.to_string()));
        }
        Regex::new(pattern)
            .map(Filter::Pattern)
            .map_err(|error| KnifeError::InvalidPattern {
                level,
                pattern: pattern.to_string(),
                error,
            })
    }

    /// Whether the candidate list is needed at all
    pub fn needs_listing(&self) -> bool {
        matches!(self, Filter::Pattern(_))
    }

    /// Matching candidates, in their original order
    pub fn apply(&self, candidates: &[String]) -> Vec<String> {
        match self {
            Filter::Pattern(re) => candidates
                .iter()
                .filter(|c| re.is_match(c))
                .cloned()
                .collect(),
            Filter::Literal(name) => vec![name.clone()],
        }
    }
}
