//! Site building orchestration.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── theme::materialize()   (bundled layout only)
//!     ├── Site::new()            validate + load layouts
//!     ├── clean_contents()       (skipped in place)
//!     ├── Site::process()        whole source tree
//!     └── write_root_summary()   (site.summary only)
//! ```

use crate::{
    config::{SiteConfig, paths},
    log,
    site::Site,
    theme,
    utils::xml::is_external_link,
};
use anyhow::{Context, Result, bail};
use regex::{Captures, Regex};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Instant,
};

/// Inline link destinations: `](dest` and reference definitions `[id]: dest`.
static LINK_DESTINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?P<lead>\]\(\s*<?|^\s{0,3}\[[^\]]+\]:\s*<?)(?P<dest>[^\s)>]+)")
        .expect("valid link destination pattern")
});

/// Build the entire site, returning the pipeline for incremental updates.
///
/// The layout is loaded before the target is cleaned, so a broken layout
/// leaves the previous output in place.
pub fn build_site(config: &'static SiteConfig) -> Result<Site> {
    let started = Instant::now();
    let paths = config.paths();

    if config.uses_bundled_layout() {
        theme::materialize(paths.source())?;
    }

    let mut site = Site::new(config)?;

    if !paths.in_place() {
        clean_contents(paths.target())?;
    }

    let report = site.process(site.sources()?)?;

    if let Some(summary) = write_root_summary(config)? {
        log!("build"; "summary written to {}", summary.display());
    }

    log!(
        "build";
        "processed {} files in {:.2} s",
        report.files.len(),
        started.elapsed().as_secs_f64()
    );
    if !report.failures.is_empty() {
        log!("warn"; "{} files failed, see errors above", report.failures.len());
    }

    Ok(site)
}

/// Remove the target tree. Refuses to run when source and target coincide.
pub fn clean(config: &SiteConfig) -> Result<()> {
    let paths = config.paths();
    let target = paths.target();

    if paths.in_place() {
        bail!(
            "refusing to clean `{}`: target is the source directory",
            target.display()
        );
    }

    if target.exists() {
        fs::remove_dir_all(target)
            .with_context(|| format!("Failed to clear target directory: {}", target.display()))?;
        log!("clean"; "removed {}", target.display());
    } else {
        log!("clean"; "nothing to remove at {}", target.display());
    }

    Ok(())
}

/// Empty the target directory, keeping the directory itself.
fn clean_contents(target: &Path) -> Result<()> {
    fs::create_dir_all(target)
        .with_context(|| format!("Failed to create target directory: {}", target.display()))?;

    for entry in fs::read_dir(target)? {
        let path = entry?.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    Ok(())
}

// ============================================================================
// Root Summary
// ============================================================================

/// Copy the source index document to the project root, if enabled.
///
/// Relative links are prefixed with the source directory so they keep
/// resolving from the new location.
pub fn write_root_summary(config: &SiteConfig) -> Result<Option<PathBuf>> {
    let Some((source, target)) = config.root_summary() else {
        return Ok(None);
    };

    if !source.is_file() {
        log!("warn"; "no {} to summarize", source.display());
        return Ok(None);
    }

    let text = fs::read_to_string(&source)
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let prefix = config
        .paths()
        .source()
        .strip_prefix(&config.root)
        .map(paths::slashed)
        .unwrap_or_default();

    fs::write(&target, relocate_links(&text, &prefix))
        .with_context(|| format!("Failed to write {}", target.display()))?;

    Ok(Some(target))
}

/// Prefix relative link destinations with `prefix/`.
fn relocate_links(text: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return text.to_owned();
    }

    LINK_DESTINATION
        .replace_all(text, |caps: &Captures<'_>| {
            let lead = &caps["lead"];
            let dest = &caps["dest"];
            if is_external_link(dest) || dest.starts_with(['/', '#']) {
                format!("{lead}{dest}")
            } else {
                format!("{lead}{prefix}/{dest}")
            }
        })
        .into_owned()
}

/// Whether `path` is the source index document used for the summary.
pub fn is_summary_source(config: &SiteConfig, path: &Path) -> bool {
    config
        .root_summary()
        .is_some_and(|(source, _)| source == path)
}
