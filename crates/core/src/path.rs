//! Remote path parsing and bucket locations
//!
//! Paths are written as `alias/bucket[/prefix]`. Once the bucket's
//! architecture is known the path is narrowed to a [`Location`].

use std::fmt;

use crate::error::{Error, Result};
use crate::traits::BucketArch;

/// A path on a configured remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath {
    pub alias: String,
    pub bucket: String,
    /// Key or key prefix inside the bucket, may be empty
    pub key: String,
}

impl RemotePath {
    pub fn new(alias: impl Into<String>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Narrow this path to a location of the given bucket architecture
    pub fn locate(&self, arch: BucketArch) -> Location {
        match arch {
            BucketArch::Flat => Location::Flat {
                bucket: self.bucket.clone(),
                prefix: self.key.clone(),
            },
            BucketArch::Tree => Location::Tree {
                bucket: self.bucket.clone(),
                prefix: self.key.clone(),
            },
        }
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}/{}", self.alias, self.bucket)
        } else {
            write!(f, "{}/{}/{}", self.alias, self.bucket, self.key)
        }
    }
}

/// Parse `alias/bucket[/prefix]`
pub fn parse_path(path: &str) -> Result<RemotePath> {
    if path.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".to_string()));
    }

    let parts: Vec<&str> = path.splitn(3, '/').collect();
    let alias = parts[0];
    if alias.is_empty() {
        return Err(Error::InvalidPath(format!("Alias is required: '{path}'")));
    }

    let bucket = parts.get(1).copied().unwrap_or_default();
    if bucket.is_empty() {
        return Err(Error::InvalidPath(format!(
            "Bucket name is required (alias/bucket): '{path}'"
        )));
    }

    let key = parts.get(2).copied().unwrap_or_default();
    Ok(RemotePath::new(alias, bucket, key))
}

/// A bucket plus prefix, tagged with how the bucket must be traversed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Flat key namespace; recursion means listing without a delimiter
    Flat { bucket: String, prefix: String },
    /// Hierarchical namespace; listed one directory at a time
    Tree { bucket: String, prefix: String },
}

impl Location {
    pub fn bucket(&self) -> &str {
        match self {
            Location::Flat { bucket, .. } | Location::Tree { bucket, .. } => bucket,
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            Location::Flat { prefix, .. } | Location::Tree { prefix, .. } => prefix,
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Location::Tree { .. })
    }
}
