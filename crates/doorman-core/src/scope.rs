//! Scope sets.
//!
//! Scopes are stored and compared as ordered, deduplicated sets of
//! non-empty strings. Requests may spell them whitespace- or
//! comma-separated; the canonical wire form is space-joined.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An ordered, deduplicated set of scope strings.
///
/// Insertion order is stable: parsing keeps the first occurrence of each
/// scope, and [`union`](Self::union) appends new entries after the
/// existing ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse a whitespace- or comma-separated scope string.
    ///
    /// Empty segments are skipped, duplicates keep their first position.
    pub fn parse(raw: &str) -> Self {
        raw.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether every scope in `self` is present in `other`.
    pub fn is_subset(&self, other: &ScopeSet) -> bool {
        self.0.iter().all(|s| other.contains(s))
    }

    /// Scopes of `self` that are missing from `other`.
    pub fn difference<'a>(&'a self, other: &'a ScopeSet) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(|s| !other.contains(s))
            .map(String::as_str)
    }

    /// Union keeping the order of `self`, with new scopes appended.
    pub fn union(&self, other: &ScopeSet) -> ScopeSet {
        let mut merged = self.clone();
        for scope in other.iter() {
            if !merged.contains(scope) {
                merged.0.push(scope.to_string());
            }
        }
        merged
    }

    /// Intersection keeping the order of `self`.
    pub fn intersect(&self, other: &ScopeSet) -> ScopeSet {
        self.0
            .iter()
            .filter(|s| other.contains(s))
            .map(String::as_str)
            .collect()
    }

    /// Canonical space-joined form.
    pub fn join(&self) -> String {
        self.0.join(" ")
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join())
    }
}

impl<'a> FromIterator<&'a str> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = ScopeSet::new();
        for scope in iter {
            if !scope.is_empty() && !set.contains(scope) {
                set.0.push(scope.to_string());
            }
        }
        set
    }
}

impl FromIterator<String> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = ScopeSet::new();
        for scope in iter {
            if !scope.is_empty() && !set.contains(&scope) {
                set.0.push(scope);
            }
        }
        set
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(scopes: Vec<String>) -> Self {
        scopes.into_iter().collect()
    }
}
