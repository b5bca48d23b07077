//! Bundled default theme.
//!
//! Used when `[site] layout` is empty: the theme files are materialized
//! into the source tree once, then rendered like any user layout.

use crate::log;
use anyhow::{Context, Result};
use std::{fs, path::Path};

/// Layout path of the bundled theme, relative to the source root.
pub const LAYOUT: &str = "_theme/default.hbs";

/// A bundled theme file.
#[derive(Debug, Clone, Copy)]
pub struct Asset {
    /// Path relative to the source root
    pub path: &'static str,
    pub content: &'static str,
}

const ASSETS: &[Asset] = &[
    Asset {
        path: LAYOUT,
        content: include_str!("embed/theme/default.hbs"),
    },
    Asset {
        path: "_theme/quire.css",
        content: include_str!("embed/theme/quire.css"),
    },
];

/// Files of the bundled theme.
pub const fn assets() -> &'static [Asset] {
    ASSETS
}

/// Write missing theme files into `source`.
///
/// Existing files are left alone so local edits survive rebuilds.
/// Returns the number of files written.
pub fn materialize(source: &Path) -> Result<usize> {
    let mut written = 0;

    for asset in assets() {
        let path = source.join(asset.path);
        if path.exists() {
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, asset.content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written += 1;
    }

    if written > 0 {
        log!("theme"; "installed {written} bundled theme files");
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_assets_include_layout() {
        assert!(assets().iter().any(|asset| asset.path == LAYOUT));
        assert!(assets().iter().all(|asset| !asset.content.is_empty()));
    }

    #[test]
    fn test_materialize_once() {
        let dir = TempDir::new().unwrap();

        assert_eq!(materialize(dir.path()).unwrap(), assets().len());
        assert!(dir.path().join(LAYOUT).is_file());

        fs::write(dir.path().join(LAYOUT), "custom").unwrap();
        assert_eq!(materialize(dir.path()).unwrap(), 0);
        assert_eq!(fs::read_to_string(dir.path().join(LAYOUT)).unwrap(), "custom");
    }
}
