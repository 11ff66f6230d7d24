//! Lexical traversal and depth policy for relative paths.

use megadoc_core::{MegaDocConfig, MegaDocError, Result};

/// Number of `/` or `\` separators in `path`.
pub fn separator_depth(path: &str) -> usize {
    path.chars().filter(|c| matches!(c, '/' | '\\')).count()
}

/// Traversal and depth limits applied to a path without touching the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathPolicy {
    /// Allow `..` segments.
    pub allow_traversal: bool,
    /// Maximum number of separators.
    pub max_depth: usize,
}

impl PathPolicy {
    /// Take the limits from a configuration.
    pub fn from_config(config: &MegaDocConfig) -> Self {
        Self {
            allow_traversal: config.allow_path_traversal,
            max_depth: config.max_depth_levels,
        }
    }

    /// Check a path against the policy.
    pub fn check(&self, path: &str) -> Result<()> {
        if !self.allow_traversal && path.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(MegaDocError::traversal(path));
        }

        let depth = separator_depth(path);
        if depth > self.max_depth {
            return Err(MegaDocError::too_deep(path, depth, self.max_depth));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use megadoc_core::SecurityThreat;

    fn policy(allow_traversal: bool, max_depth: usize) -> PathPolicy {
        PathPolicy {
            allow_traversal,
            max_depth,
        }
    }

    #[test]
    fn test_separator_depth() {
        assert_eq!(separator_depth("file.py"), 0);
        assert_eq!(separator_depth("a/b\\c.py"), 2);
    }

    #[test]
    fn test_traversal_guard() {
        let err = policy(false, 10).check("../secret.py").unwrap_err();
        assert!(matches!(
            err,
            MegaDocError::Security {
                threat: SecurityThreat::PathTraversal,
                ..
            }
        ));
        assert!(policy(false, 10).check("a/..b/c.py").is_ok());
        assert!(policy(true, 10).check("../secret.py").is_ok());
    }

    #[test]
    fn test_depth_boundary() {
        assert!(policy(false, 3).check("a/b/c/file.py").is_ok());

        let err = policy(false, 2).check("a/b/c/file.py").unwrap_err();
        assert!(matches!(
            err,
            MegaDocError::Security {
                threat: SecurityThreat::PathTooDeep,
                ..
            }
        ));
    }
}
