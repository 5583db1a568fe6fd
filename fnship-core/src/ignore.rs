// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! Ignore-file patterns and function name globbing.
//!
//! Both use gitignore semantics through the `ignore` crate.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{ShipError, ShipResult};

/// Name of the ignore file read from project and function directories.
pub const IGNORE_FILE: &str = ".fnshipignore";

/// Read the ignore file in `dir`, if present.
pub fn read_ignore_file(dir: &Path) -> ShipResult<Option<String>> {
    let path = dir.join(IGNORE_FILE);
    match fs::read_to_string(&path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ShipError::Io {
            context: "reading ignore file",
            source,
        }),
    }
}

/// Accumulated ignore patterns for one function directory.
///
/// Patterns are kept as text until the function is opened so plugins can
/// append or replace them; `compile` then builds the matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    lines: Vec<String>,
}

impl IgnoreRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every line of `content`.
    pub fn extend_from(&mut self, content: &str) {
        self.lines.extend(content.lines().map(str::to_string));
    }

    pub fn push(&mut self, pattern: impl Into<String>) {
        self.lines.push(pattern.into());
    }

    /// Discard all patterns gathered so far and use `content` instead.
    pub fn replace(&mut self, content: &str) {
        self.lines.clear();
        self.extend_from(content);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether any effective pattern (not blank, not a comment) is present.
    pub fn is_empty(&self) -> bool {
        !self
            .lines
            .iter()
            .any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
    }

    /// Build a matcher rooted at `root`.
    pub fn compile(&self, root: &Path) -> ShipResult<IgnoreMatcher> {
        let mut builder = GitignoreBuilder::new(root);
        let source = root.join(IGNORE_FILE);

        for line in &self.lines {
            builder
                .add_line(Some(source.clone()), line)
                .map_err(|e| ShipError::Ignore {
                    path: source.clone(),
                    message: e.to_string(),
                })?;
        }

        let matcher = builder.build().map_err(|e| ShipError::Ignore {
            path: source.clone(),
            message: e.to_string(),
        })?;

        Ok(IgnoreMatcher {
            root: root.to_path_buf(),
            matcher,
        })
    }
}

/// Compiled ignore patterns.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    root: PathBuf,
    matcher: Gitignore,
}

impl IgnoreMatcher {
    /// Check a path relative to the matcher root.
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        let rel_path = rel_path.strip_prefix(&self.root).unwrap_or(rel_path);
        if rel_path.as_os_str().is_empty() {
            return false;
        }
        self.matcher.matched(rel_path, is_dir).is_ignore()
    }
}

/// Shell-style name patterns used to select functions.
#[derive(Debug, Clone)]
pub struct NameGlobs {
    patterns: Vec<(String, Gitignore)>,
}

impl NameGlobs {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> ShipResult<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let mut builder = GitignoreBuilder::new("");
            builder
                .add_line(None, pattern)
                .map_err(|e| ShipError::Ignore {
                    path: PathBuf::from(pattern),
                    message: e.to_string(),
                })?;
            let glob = builder.build().map_err(|e| ShipError::Ignore {
                path: PathBuf::from(pattern),
                message: e.to_string(),
            })?;
            compiled.push((pattern.to_string(), glob));
        }

        Ok(Self { patterns: compiled })
    }

    /// No patterns selects everything.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|(_, g)| Self::hit(g, name))
    }

    /// Patterns that select none of `names`.
    pub fn unmatched<'a, S: AsRef<str>>(&'a self, names: &[S]) -> Vec<&'a str> {
        self.patterns
            .iter()
            .filter(|(_, g)| !names.iter().any(|n| Self::hit(g, n.as_ref())))
            .map(|(p, _)| p.as_str())
            .collect()
    }

    fn hit(glob: &Gitignore, name: &str) -> bool {
        glob.matched(name, true).is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rules_match_relative_paths() {
        let mut rules = IgnoreRules::new();
        rules.extend_from(".fnshipignore\nfunction.json\n*.log\nnode_modules/\n");

        let matcher = rules.compile(Path::new("/fn")).unwrap();
        assert!(matcher.is_ignored(Path::new("function.json"), false));
        assert!(matcher.is_ignored(Path::new("debug.log"), false));
        assert!(matcher.is_ignored(Path::new("node_modules"), true));
        assert!(!matcher.is_ignored(Path::new("index.js"), false));
    }

    #[test]
    fn test_replace_and_negation() {
        let mut rules = IgnoreRules::new();
        rules.push("*.js");
        rules.replace("*\n!fnship.jar\n");

        let matcher = rules.compile(Path::new("/fn")).unwrap();
        assert!(matcher.is_ignored(Path::new("index.js"), false));
        assert!(!matcher.is_ignored(Path::new("fnship.jar"), false));
    }

    #[test]
    fn test_is_empty_ignores_comments() {
        let mut rules = IgnoreRules::new();
        rules.extend_from("\n# nothing here\n");
        assert!(rules.is_empty());
        rules.push("dist/");
        assert!(!rules.is_empty());
    }

    #[test]
    fn test_read_missing_ignore_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_ignore_file(dir.path()).unwrap(), None);

        fs::write(dir.path().join(IGNORE_FILE), "*.tmp\n").unwrap();
        assert_eq!(
            read_ignore_file(dir.path()).unwrap().as_deref(),
            Some("*.tmp\n")
        );
    }

    #[test]
    fn test_name_globs() {
        let globs = NameGlobs::new(&["api*", "worker"]).unwrap();
        assert!(globs.matches("api"));
        assert!(globs.matches("api-v2"));
        assert!(globs.matches("worker"));
        assert!(!globs.matches("cron"));
        assert_eq!(globs.unmatched(&["api"]), vec!["worker"]);

        let all = NameGlobs::new::<&str>(&[]).unwrap();
        assert!(all.matches("anything"));
    }
}
