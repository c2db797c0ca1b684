//! Include/exclude key filtering
//!
//! Patterns are compiled when the filter is built, so a malformed pattern is
//! reported before any listing starts. Matching is unanchored: a pattern
//! matches if it occurs anywhere in the key.

use regex::Regex;

use crate::error::{Error, Result};

/// Optional include and exclude patterns over object keys
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl FilterSpec {
    /// A filter that keeps every key
    pub fn all() -> Self {
        Self::default()
    }

    /// Compile a filter; empty strings are treated as absent
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// A key is kept iff it matches the include pattern (when set) and does
    /// not match the exclude pattern (when set)
    pub fn matches(&self, key: &str) -> bool {
        self.include.as_ref().is_none_or(|re| re.is_match(key))
            && self.exclude.as_ref().is_none_or(|re| !re.is_match(key))
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern {
        None | Some("") => Ok(None),
        Some(p) => Regex::new(p).map(Some).map_err(|e| Error::InvalidPattern {
            pattern: p.to_string(),
            message: e.to_string(),
        }),
    }
}
