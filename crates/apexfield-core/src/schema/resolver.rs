//! Semantic field resolution.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// First candidate present in `present`, in priority order.
pub fn resolve_column<'a>(candidates: &[&'a str], present: &BTreeSet<String>) -> Option<&'a str> {
    candidates.iter().copied().find(|c| present.contains(*c))
}

/// Ordered physical-name candidates per semantic key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnCandidateSet {
    entries: &'static [(&'static str, &'static [&'static str])],
}

impl ColumnCandidateSet {
    pub const fn new(entries: &'static [(&'static str, &'static [&'static str])]) -> Self {
        Self { entries }
    }

    pub const fn empty() -> Self {
        Self { entries: &[] }
    }

    /// Candidates for `key`, in priority order.
    pub fn candidates(&self, key: &str) -> Option<&'static [&'static str]> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, candidates)| *candidates)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    /// Resolve every key against a present-column set.
    pub fn resolve(&self, present: &BTreeSet<String>) -> ResolvedColumns {
        ResolvedColumns(
            self.entries
                .iter()
                .map(|(key, candidates)| {
                    (key.to_string(), resolve_column(candidates, present).map(str::to_string))
                })
                .collect(),
        )
    }
}

/// Semantic key → physical column, `None` where no candidate is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedColumns(BTreeMap<String, Option<String>>);

impl ResolvedColumns {
    /// Physical column for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|c| c.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}
