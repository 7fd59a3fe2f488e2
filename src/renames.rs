// src/renames.rs

//! Keeps one canonical name per file while history is walked newest-first.
//!
//! A rename is seen before the older name it replaces shows up again, so
//! every later (older) occurrence of `old` is mapped forward, and rows
//! already stored under `old` are rewritten by the caller.

use std::collections::HashMap;
use tracing::debug;

/// Rows stored under `from` must be moved to `to`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub filename: String,
    pub rewrite: Option<Rewrite>,
}

/// Session-scoped map of old path -> canonical path. Never persisted.
#[derive(Debug, Default)]
pub struct RenameTable {
    canonical: HashMap<String, String>,
}

impl RenameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Canonical name for a plain (non-rename) path.
    pub fn lookup<'a>(&'a self, name: &'a str) -> &'a str {
        self.canonical.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Records `old => new` and returns the canonical name `old` now maps to.
    ///
    /// If `new` is itself an old name of some canonical X, `old` points at X
    /// directly and the `new` entry is dropped, so lookups never chain.
    pub fn record(&mut self, old: String, new: String) -> String {
        let canonical = match self.canonical.remove(&new) {
            Some(target) => target,
            None => new,
        };
        if canonical == old {
            // renamed back to a name it had later on
            self.canonical.remove(&old);
        } else {
            self.canonical.insert(old, canonical.clone());
        }
        canonical
    }

    /// Resolves a raw numstat filename, recording a rename if it is one.
    pub fn resolve(&mut self, raw: &str) -> Resolution {
        match parse_rename(raw) {
            Some((old, new)) => {
                let canonical = self.record(old.clone(), new);
                debug!(old = %old, canonical = %canonical, "rename observed");
                let rewrite = (old != canonical).then(|| Rewrite {
                    from: old,
                    to: canonical.clone(),
                });
                Resolution {
                    filename: canonical,
                    rewrite,
                }
            }
            None => Resolution {
                filename: self.lookup(raw).to_string(),
                rewrite: None,
            },
        }
    }
}

/// Splits numstat rename notation into `(old, new)` paths.
///
/// Handles `prefix{old => new}suffix` (either side may be empty) and the
/// whole-path form `old => new`. Returns `None` for ordinary paths.
pub fn parse_rename(raw: &str) -> Option<(String, String)> {
    let arrow = raw.find("=>")?;

    let brace_open = raw[..arrow].rfind('{');
    let brace_close = raw[arrow..].find('}').map(|i| arrow + i);
    if let (Some(open), Some(close)) = (brace_open, brace_close) {
        let prefix = raw[..open].trim();
        let old_part = raw[open + 1..arrow].trim();
        let new_part = raw[arrow + 2..close].trim();
        let suffix = raw[close + 1..].trim();
        let old = join_parts(prefix, old_part, suffix);
        let new = join_parts(prefix, new_part, suffix);
        return Some((old, new));
    }

    let old = raw[..arrow].trim();
    let new = raw[arrow + 2..].trim();
    Some((old.to_string(), new.to_string()))
}

/// An empty side leaves `dir//file`; collapse it.
fn join_parts(prefix: &str, middle: &str, suffix: &str) -> String {
    let mut joined = format!("{prefix}{middle}{suffix}");
    while joined.contains("//") {
        joined = joined.replace("//", "/");
    }
    joined
}
