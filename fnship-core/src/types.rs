// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! Newtype wrappers and shared vocabulary.
//!
//! Types validate their invariants at creation time.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigValidationError;

/// The mutable staging version. Never counted as a published version.
pub const LATEST_VERSION: &str = "$LATEST";

/// Alias pinned on every deploy unless configured otherwise.
pub const DEFAULT_ALIAS: &str = "current";

/// Validated local function name (the function's directory name).
/// Must be non-empty, alphanumeric with hyphens/underscores, max 64 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionName(String);

impl FunctionName {
    /// Create a new FunctionName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigValidationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(ConfigValidationError::InvalidFieldValue {
                field: "name",
                value: name,
                reason: "Function name cannot be empty".to_string(),
            });
        }

        if name.len() > 64 {
            return Err(ConfigValidationError::InvalidFieldValue {
                field: "name",
                value: name.clone(),
                reason: format!("Function name too long: {} chars (max 64)", name.len()),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigValidationError::InvalidFieldValue {
                field: "name",
                value: name,
                reason: "Function name must contain only alphanumeric characters, hyphens, and underscores".to_string(),
            });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FunctionName {
    type Error = ConfigValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FunctionName> for String {
    fn from(name: FunctionName) -> Self {
        name.0
    }
}

/// Lifecycle points at which plugins may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hook {
    /// Config resolution, once per function at load time.
    Open,
    /// Archive construction; may append entries.
    Build,
    /// Removal of local build byproducts.
    Clean,
    /// Last-mile mutation right before upload.
    Deploy,
}

impl Hook {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Build => "build",
            Self::Clean => "clean",
            Self::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Whether `version` names a published (immutable) version.
pub fn is_published(version: &str) -> bool {
    version != LATEST_VERSION
}

/// Orders version identifiers oldest first.
///
/// Published versions are decimal counters; anything unparseable sorts after
/// them lexically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_name_valid() {
        assert!(FunctionName::new("api").is_ok());
        assert!(FunctionName::new("worker_2").is_ok());
        assert!(FunctionName::new("Hello-World").is_ok());
    }

    #[test]
    fn test_function_name_invalid() {
        assert!(FunctionName::new("").is_err());
        assert!(FunctionName::new("a".repeat(65)).is_err());
        assert!(FunctionName::new("bad name").is_err());
        assert!(FunctionName::new("../up").is_err());
    }

    #[test]
    fn test_version_ordering() {
        let mut versions = vec!["10", "2", "1", "9"];
        versions.sort_by(|a, b| compare_versions(a, b));
        assert_eq!(versions, vec!["1", "2", "9", "10"]);
        assert!(!is_published(LATEST_VERSION));
        assert!(is_published("3"));
    }
}
