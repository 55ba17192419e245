//! Include/exclude glob filtering of tree entries.
//!
//! Patterns match the path relative to the requested root. `*` and `?` stay
//! within one path segment; `**` spans directories. With no include patterns
//! everything that is not excluded passes.

use glob::{MatchOptions, Pattern};

use crate::error::EngineError;
use crate::repository::TreeEntry;

/// Test files left out unless the caller supplies its own exclude list.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "test/**",
    "tests/**",
    "**/*_test.go",
    "**/*.tftest.hcl",
    "**/*.tftest.json",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct ContentFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl ContentFilter {
    /// Compile a filter. `exclude = None` applies [`DEFAULT_EXCLUDES`];
    /// `Some(list)`, even an empty one, replaces them.
    pub fn new(include: &[String], exclude: Option<&[String]>) -> Result<Self, EngineError> {
        let include = compile("include", include.iter().map(String::as_str))?;
        let exclude = match exclude {
            Some(list) => compile("exclude", list.iter().map(String::as_str))?,
            None => compile("exclude", DEFAULT_EXCLUDES.iter().copied())?,
        };
        Ok(Self { include, exclude })
    }

    /// Whether a root-relative path passes the filter.
    pub fn matches(&self, relative: &str) -> bool {
        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .any(|p| p.matches_with(relative, MATCH_OPTIONS));
        included
            && !self
                .exclude
                .iter()
                .any(|p| p.matches_with(relative, MATCH_OPTIONS))
    }

    /// Keep the entries under `root` that pass, in their original order.
    pub fn filter(&self, entries: Vec<TreeEntry>, root: &str) -> Vec<TreeEntry> {
        entries
            .into_iter()
            .filter(|e| relative_path(&e.path, root).is_some_and(|rel| self.matches(rel)))
            .collect()
    }
}

/// `path` relative to `root`. A path equal to `root` is reduced to its last
/// segment so a single requested file still matches `*.tf`-style patterns.
pub fn relative_path<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    let root = root.trim_matches('/');
    if root.is_empty() {
        return Some(path);
    }
    if path == root {
        return path.rsplit('/').next();
    }
    path.strip_prefix(root)?.strip_prefix('/')
}

fn compile<'a>(
    label: &str,
    patterns: impl Iterator<Item = &'a str>,
) -> Result<Vec<Pattern>, EngineError> {
    patterns
        .map(|raw| {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(EngineError::InvalidRequest(format!(
                    "empty {label} glob pattern"
                )));
            }
            Pattern::new(raw).map_err(|e| {
                EngineError::InvalidRequest(format!("invalid {label} glob {raw:?}: {e}"))
            })
        })
        .collect()
}
