// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Identity Matcher
//!
//! Decides whether a certificate identity matches any configured pattern.
//! Used for the privileged-user set and the cache allow-list.
//!
//! # Pattern Semantics
//!
//! - `/.../` is a regular expression; the slashes are stripped before compiling.
//! - anything else is handed to the regex engine as-is, so it matches as an
//!   unanchored substring (`admin` matches `user-admin-01`). Anchor patterns
//!   explicitly when an exact match is wanted.
//!
//! Patterns are compiled once per matcher. An invalid pattern never matches.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Identity pattern evaluation and caller name handling

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Prefix of caller names derived from an identity, e.g. `aegis=node1.example`.
pub const CALLER_PREFIX: &str = "aegis";

static DELIMITED: LazyLock<Regex> = LazyLock::new(|| Regex::new("^/.+/$").expect("static regex"));
static CALLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+=([\w\.\-]+)$").expect("static regex"));

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("invalid identity pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("could not find a valid caller identity name in '{0}'")]
    InvalidCaller(String),
}

/// Compiled set of literal-or-regex identity patterns.
#[derive(Debug, Clone, Default)]
pub struct IdentityMatcher {
    patterns: Vec<Regex>,
}

impl IdentityMatcher {
    /// Compile `patterns`, skipping (and logging) any that are not valid
    /// regular expressions.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|pattern| match compile(pattern.as_ref()) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!("Ignoring identity pattern: {}", e);
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    /// Compile `patterns`, failing on the first invalid one.
    pub fn try_new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, MatcherError> {
        let patterns = patterns
            .iter()
            .map(|pattern| compile(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    pub fn is_match(&self, identity: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(identity))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile(pattern: &str) -> Result<Regex, MatcherError> {
    let expression = if DELIMITED.is_match(pattern) {
        pattern.trim_start_matches('/').trim_end_matches('/')
    } else {
        pattern
    };

    Regex::new(expression).map_err(|source| MatcherError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// One-shot form of [`IdentityMatcher::is_match`].
pub fn match_any_pattern<S: AsRef<str>>(identity: &str, patterns: &[S]) -> bool {
    IdentityMatcher::new(patterns).is_match(identity)
}

/// Caller name for an identity, in the form `aegis=<identity>`.
pub fn caller_name(identity: &str) -> String {
    format!("{}={}", CALLER_PREFIX, identity)
}

/// Extract the identity from a caller name of the form `<prefix>=<identity>`.
pub fn caller_identity(caller: &str) -> Result<String, MatcherError> {
    CALLER
        .captures(caller)
        .and_then(|captures| captures.get(1))
        .map(|identity| identity.as_str().to_string())
        .ok_or_else(|| MatcherError::InvalidCaller(caller.to_string()))
}
