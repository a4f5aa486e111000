//! Ignore rule compilation and matching
//!
//! A subscription or snapshot operation carries a list of ignore entries,
//! each either a literal path or a glob pattern. Literals are resolved to
//! absolute form against the watched root and exclude themselves plus all
//! descendants. Globs are compiled once into a single matcher and applied
//! to the root-relative path; dotfiles are matchable like any other name.

use crate::error::{Error, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// Characters that mark an ignore entry as a glob rather than a literal path
const GLOB_METACHARS: &[char] = &['*', '?', '[', ']', '{', '}', '!'];

/// Compiled ignore rules for one watched root
#[derive(Debug)]
pub struct IgnoreMatcher {
    /// Watched root the rules were compiled against
    root: PathBuf,
    /// Absolute literal paths; each excludes itself and its descendants
    exact: Vec<PathBuf>,
    /// Compiled glob patterns, matched against root-relative paths
    globs: GlobSet,
}

impl IgnoreMatcher {
    /// Compile ignore rules for the given watched root.
    ///
    /// Relative literal entries are resolved against `root`. Entries
    /// containing glob metacharacters compile as globs; `*` does not cross
    /// path separators, `**` does.
    pub fn compile(
        root: &Path,
        patterns: &[String],
        case_insensitive: bool,
    ) -> Result<Self> {
        let mut exact = Vec::new();
        let mut globs = GlobSetBuilder::new();

        for pattern in patterns {
            if pattern.contains(GLOB_METACHARS) {
                let glob = GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .case_insensitive(case_insensitive)
                    .build()
                    .map_err(|source| Error::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })?;
                globs.add(glob);
            } else {
                let literal = Path::new(pattern);
                if literal.is_absolute() {
                    exact.push(literal.to_path_buf());
                } else {
                    exact.push(root.join(literal));
                }
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            exact,
            globs: globs.build().map_err(|source| Error::InvalidPattern {
                pattern: String::new(),
                source,
            })?,
        })
    }

    /// A matcher that ignores nothing
    pub fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            exact: Vec::new(),
            globs: GlobSet::empty(),
        }
    }

    /// Check whether a path is excluded by these rules.
    ///
    /// True iff the path equals a literal entry, is a descendant of one, or
    /// its root-relative form matches any compiled glob. O(rules) per check.
    pub fn is_ignored(&self, path: &Path) -> bool {
        for literal in &self.exact {
            // starts_with is component-wise, so this covers both the exact
            // path and the descendant-of-directory case
            if path.starts_with(literal) {
                return true;
            }
        }

        if let Ok(relative) = path.strip_prefix(&self.root) {
            if self.globs.is_match(relative) {
                return true;
            }
        }

        false
    }

    /// Root the rules were compiled against
    pub fn root(&self) -> &Path {
        &self.root
    }
}
