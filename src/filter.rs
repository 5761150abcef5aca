// Per-rule filename filters.
//
// A rule carries an ordered list of patterns; a file whose name matches any
// pattern is excluded from the pass. Three shorthands are recognized for
// compatibility with existing rule files (`foo*` prefix, `*foo` suffix,
// exact name); anything else is compiled as a full glob.

use crate::error::{Result, SyncError};
use std::path::Path;

#[derive(Debug, Clone)]
enum PatternKind {
    Prefix(String),
    Suffix(String),
    Exact(String),
    Glob(glob::Pattern),
}

#[derive(Debug, Clone)]
pub struct FilterSet {
    patterns: Vec<PatternKind>,
}

impl FilterSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            compiled.push(Self::compile(raw)?);
        }
        Ok(Self { patterns: compiled })
    }

    fn compile(raw: &str) -> Result<PatternKind> {
        let stars = raw.matches('*').count();
        if stars == 0 {
            return Ok(PatternKind::Exact(raw.to_string()));
        }
        if stars == 1 {
            if let Some(suffix) = raw.strip_prefix('*') {
                return Ok(PatternKind::Suffix(suffix.to_string()));
            }
            if let Some(prefix) = raw.strip_suffix('*') {
                return Ok(PatternKind::Prefix(prefix.to_string()));
            }
        }
        let pattern =
            glob::Pattern::new(raw).map_err(|_| SyncError::InvalidFilter(raw.to_string()))?;
        Ok(PatternKind::Glob(pattern))
    }

    /// True if the file should be left out of the pass. Matching is done
    /// against the file name, not the full relative path.
    pub fn excludes(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };

        self.patterns.iter().any(|p| match p {
            PatternKind::Prefix(prefix) => name.starts_with(prefix.as_str()),
            PatternKind::Suffix(suffix) => name.ends_with(suffix.as_str()),
            PatternKind::Exact(exact) => name == exact,
            PatternKind::Glob(pattern) => pattern.matches(name),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
