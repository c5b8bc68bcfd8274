//! Static, read-only cache tier.
//!
//! A small table of well-known names with fixed answers per task. Exact
//! matches on the whole canonical input are a hash lookup; partial matches
//! scan the table for the longest pattern appearing as a whole-word run
//! inside the input. Entries are never written at runtime.

use std::collections::HashMap;

use super::key::canonicalize;
use crate::types::TaskKind;

/// A known name and the answer it resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct WhitelistEntry {
    pub pattern: String,
    pub task: TaskKind,
    pub answer: String,
    /// Only match when the whole input is the pattern.
    pub exact_only: bool,
}

impl WhitelistEntry {
    pub fn new(pattern: impl Into<String>, task: TaskKind, answer: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            task,
            answer: answer.into(),
            exact_only: false,
        }
    }

    pub fn exact_only(mut self) -> Self {
        self.exact_only = true;
        self
    }
}

/// Seed rows for [`Whitelist::with_defaults`]: (pattern, category).
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("GCash", "Digital Wallet"),
    ("Maya", "Digital Wallet"),
    ("PayMaya", "Digital Wallet"),
    ("PayPal", "Digital Wallet"),
    ("Grab", "Transportation"),
    ("Angkas", "Transportation"),
    ("Uber", "Transportation"),
    ("Shopee", "Online Shopping"),
    ("Lazada", "Online Shopping"),
    ("Amazon", "Online Shopping"),
    ("Jollibee", "Food & Dining"),
    ("McDonald's", "Food & Dining"),
    ("Starbucks", "Food & Dining"),
    ("Meralco", "Utilities"),
    ("Maynilad", "Utilities"),
    ("PLDT", "Utilities"),
    ("Netflix", "Subscriptions"),
    ("Spotify", "Subscriptions"),
];

/// The static tier.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
    /// (task, canonical pattern) → index into `entries`.
    exact: HashMap<(TaskKind, String), usize>,
    /// Tokenized canonical pattern, parallel to `entries`.
    tokens: Vec<Vec<String>>,
}

impl Whitelist {
    /// An empty table; every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with well-known merchants and services for `categorize`.
    pub fn with_defaults() -> Self {
        Self::from_entries(
            DEFAULT_CATEGORIES
                .iter()
                .map(|(p, c)| WhitelistEntry::new(*p, TaskKind::Categorize, *c)),
        )
    }

    pub fn from_entries(entries: impl IntoIterator<Item = WhitelistEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.push(entry);
        }
        table
    }

    fn push(&mut self, entry: WhitelistEntry) {
        let idx = self.entries.len();
        self.exact
            .entry((entry.task, canonicalize(&entry.pattern)))
            .or_insert(idx);
        self.tokens.push(tokenize(&entry.pattern));
        self.entries.push(entry);
    }

    /// Resolve `input` for `task`. Exact matches win over partial ones.
    pub fn lookup(&self, task: TaskKind, input: &str) -> Option<&WhitelistEntry> {
        if let Some(&idx) = self.exact.get(&(task, canonicalize(input))) {
            return Some(&self.entries[idx]);
        }

        let haystack = tokenize(input);
        self.entries
            .iter()
            .zip(&self.tokens)
            .filter(|(e, pattern)| {
                e.task == task && !e.exact_only && contains_run(&haystack, pattern)
            })
            .max_by_key(|(_, pattern)| pattern.len())
            .map(|(e, _)| e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowercased words with surrounding punctuation stripped.
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}
