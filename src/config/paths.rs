//! Path resolution between the source and target roots.
//!
//! # Architecture
//!
//! ```text
//! SiteConfig
//!     │
//!     └── paths() → PathResolver
//!                       │
//!                       ├── to_source("a/b.md")   → /abs/docs/a/b.md
//!                       ├── to_target("a/b.html") → /abs/site/a/b.html
//!                       └── source_relative(p)    → a/b.md
//! ```
//!
//! Both roots are absolute and normalized once when the config is loaded,
//! so every check here is a lexical prefix test.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Failures resolving a relative path against one of the roots.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("`{0}` is outside `{1}`")]
    OutOfBounds(PathBuf, PathBuf),

    #[error("missing resource `{0}`")]
    MissingResource(PathBuf),

    #[error("`{0}` exists and is not a file")]
    NotAFile(PathBuf),
}

/// Maps between source-relative and target-relative paths.
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    source: &'a Path,
    target: &'a Path,
}

impl<'a> PathResolver<'a> {
    #[inline]
    pub const fn new(source: &'a Path, target: &'a Path) -> Self {
        Self { source, target }
    }

    #[inline]
    pub const fn source(&self) -> &'a Path {
        self.source
    }

    #[inline]
    pub const fn target(&self) -> &'a Path {
        self.target
    }

    /// Source and target roots coincide.
    #[inline]
    pub fn in_place(&self) -> bool {
        self.source == self.target
    }

    /// Resolve a source-relative path to an existing regular file.
    pub fn to_source(&self, relative: impl AsRef<Path>) -> Result<PathBuf, PathError> {
        let path = self.resolve(self.source, relative.as_ref())?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(PathError::MissingResource(path))
        }
    }

    /// Resolve a target-relative path, rejecting paths occupied by directories.
    pub fn to_target(&self, relative: impl AsRef<Path>) -> Result<PathBuf, PathError> {
        let path = self.resolve(self.target, relative.as_ref())?;
        if path.exists() && !path.is_file() {
            Err(PathError::NotAFile(path))
        } else {
            Ok(path)
        }
    }

    /// Path of an absolute source path relative to the source root.
    pub fn source_relative<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        path.strip_prefix(self.source).ok()
    }

    /// Path of an absolute target path relative to the target root.
    pub fn target_relative<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        path.strip_prefix(self.target).ok()
    }

    fn resolve(&self, root: &Path, relative: &Path) -> Result<PathBuf, PathError> {
        let path = normalize(&root.join(relative));
        if path.starts_with(root) {
            Ok(path)
        } else {
            Err(PathError::OutOfBounds(relative.to_path_buf(), root.to_path_buf()))
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Replace the extension of `path` if it is one of `old`.
///
/// Extensions are given with their leading dot and compared case-sensitively.
///
/// ```ignore
/// rewrite("a/b/c.md", ".html", &[".md"])  // → Some("a/b/c.html")
/// rewrite("a/b/c.txt", ".html", &[".md"]) // → None
/// ```
pub fn rewrite(path: &Path, new: &str, old: &[&str]) -> Option<PathBuf> {
    let ext = path.extension()?.to_str()?;
    old.iter()
        .find(|candidate| candidate.strip_prefix('.') == Some(ext))
        .map(|_| path.with_extension(new.trim_start_matches('.')))
}

/// Lexically normalize a path, resolving `.` and `..` without touching the disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component);
                }
            }
            other => result.push(other),
        }
    }
    result
}

/// Render a relative path with forward slashes.
pub fn slashed(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
