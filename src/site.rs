//! Site pipeline: scan source paths, claim them with pipes, render outputs.
//!
//! # Flow
//!
//! ```text
//! paths ──► scan() ──► filter ──► Pipe::ORDER ──► Composer::extend
//!                        │             │
//!                        │             └── Err → Report::failures
//!                        └── directories, hidden, layouts, self-overwrites
//!
//! process() = scan() + page index update + SiteFile::render()
//! ```
//!
//! Scan order is lexicographic by source-relative path, so logs and
//! reports are reproducible.

use crate::config::{SiteConfig, paths};
use crate::layout::Layouts;
use crate::log;
use crate::logger::single_line;
use crate::model::{Composer, Model};
use crate::pipes::{Pipe, PipeError, Render, SiteFile, SiteModel, target_path};
use anyhow::{Context, Result};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Component, Path, PathBuf},
};
use walkdir::WalkDir;

// ============================================================================
// Report
// ============================================================================

/// A source file that could not be claimed or rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub source: PathBuf,
    pub pipe: &'static str,
    pub message: String,
}

/// Outcome of a scan or process run.
#[derive(Debug, Default)]
pub struct Report {
    pub files: Vec<SiteFile>,
    pub failures: Vec<Failure>,
}

impl Report {
    fn fail(&mut self, source: PathBuf, pipe: Pipe, err: PipeError) {
        let message = single_line(&anyhow::Error::from(err));
        log!("error"; "{}: {}: {}", pipe.name(), source.display(), message);
        self.failures.push(Failure {
            source,
            pipe: pipe.name(),
            message,
        });
    }
}

// ============================================================================
// Site
// ============================================================================

/// Pipeline over one immutable configuration.
pub struct Site {
    config: &'static SiteConfig,
    layout: PathBuf,
    layouts: Layouts,
    composer: Composer,
    globals: Model,
    /// Page models by target-relative path, feeding `pages` in layouts
    pages: BTreeMap<PathBuf, Value>,
}

impl Site {
    /// Load layouts and prepare the pipeline.
    pub fn new(config: &'static SiteConfig) -> Result<Self> {
        config.validate_layout()?;

        let layout = config.layout_path();
        let layouts = Layouts::load(&layout)
            .with_context(|| format!("Failed to load layouts from {}", layout.display()))?;

        Ok(Self {
            config,
            layout,
            layouts,
            composer: Composer::new(),
            globals: config.globals(),
            pages: BTreeMap::new(),
        })
    }

    #[inline]
    pub const fn config(&self) -> &'static SiteConfig {
        self.config
    }

    /// `path` is the layout file or another template beside it.
    pub fn is_layout(&self, path: &Path) -> bool {
        path == self.layout || Layouts::is_template(&self.layout, path)
    }

    /// Every file under the source root, hidden directories excluded.
    pub fn sources(&self) -> Result<Vec<PathBuf>> {
        collect_all_files(self.config.paths().source())
    }

    /// Resolve candidate paths to claimed files without rendering.
    ///
    /// Paths may be absolute or relative to the source root.
    pub fn scan<I, P>(&self, candidates: I) -> Report
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let source = self.config.paths().source();
        let relatives: BTreeSet<PathBuf> = candidates
            .into_iter()
            .filter_map(|path| self.candidate(path.as_ref()))
            .collect();

        let mut report = Report::default();
        for relative in relatives {
            for pipe in Pipe::ORDER {
                match pipe.attempt(self.config, &relative) {
                    Ok(None) => continue,
                    Ok(Some(file)) => report.files.push(self.composer.extend(file)),
                    Err(err) => report.fail(source.join(&relative), pipe, err),
                }
                break;
            }
        }

        report
    }

    /// Scan, then render every claimed file into the target tree.
    ///
    /// Per-file failures land in the report; write failures abort.
    pub fn process<I, P>(&mut self, candidates: I) -> Result<Report>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = self.scan(candidates);

        for file in &report.files {
            match file.render {
                Render::Page { .. } => {
                    self.pages
                        .insert(file.path.clone(), Value::Object(file.model.clone()));
                }
                Render::Remove => {
                    self.pages.remove(&file.path);
                }
                _ => {}
            }
        }

        let pages: Vec<Value> = self.pages.values().cloned().collect();
        let site = SiteModel {
            globals: &self.globals,
            pages: &pages,
            layouts: &self.layouts,
            minify: self.config.site.minify,
        };

        let paths = self.config.paths();
        let mut rendered = Vec::with_capacity(report.files.len());
        for file in std::mem::take(&mut report.files) {
            let result = paths
                .to_target(&file.path)
                .map_err(PipeError::from)
                .and_then(|target| file.render(&target, &site));

            match result {
                Ok(()) => rendered.push(file),
                Err(err) if err.is_fatal() => {
                    let context = format!("Failed to render {}", file.source.display());
                    return Err(anyhow::Error::from(err).context(context));
                }
                Err(err) => report.fail(file.source.clone(), file.pipe, err),
            }
        }

        report.files = rendered;
        Ok(report)
    }

    /// Remove the target mirroring a deleted source file or directory.
    ///
    /// Returns the removed target path, if any.
    pub fn remove(&mut self, deleted: &Path) -> Result<Option<PathBuf>> {
        let paths = self.config.paths();
        let Some(relative) = paths.source_relative(deleted).map(Path::to_path_buf) else {
            return Ok(None);
        };
        if relative.as_os_str().is_empty() {
            return Ok(None);
        }

        let mirrored = paths.target().join(&relative);
        if mirrored.is_dir() {
            fs::remove_dir_all(&mirrored)
                .with_context(|| format!("Failed to remove {}", mirrored.display()))?;
            self.pages.retain(|path, _| !path.starts_with(&relative));
            log!("watch"; "removed {}", paths::slashed(&relative));
            return Ok(Some(mirrored));
        }

        let target_relative = target_path(&relative);
        let target = paths.target().join(&target_relative);
        self.pages.remove(&target_relative);

        if target == deleted || !target.is_file() {
            return Ok(None);
        }
        fs::remove_file(&target)
            .with_context(|| format!("Failed to remove {}", target.display()))?;
        log!("watch"; "removed {}", paths::slashed(&target_relative));

        Ok(Some(target))
    }

    /// Source-relative path of a scan candidate, or `None` if filtered out.
    fn candidate(&self, path: &Path) -> Option<PathBuf> {
        let paths = self.config.paths();
        let absolute = paths::normalize(&paths.source().join(path));

        if absolute.is_dir() || self.is_layout(&absolute) {
            return None;
        }

        let relative = paths
            .source_relative(&absolute)
            .map_or_else(|| path.to_path_buf(), Path::to_path_buf);

        if is_hidden(&relative) {
            return None;
        }
        if paths.in_place() && target_path(&relative) == relative {
            return None;
        }

        Some(relative)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Any path component starts with a dot.
fn is_hidden(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Collect all files from a directory recursively, skipping hidden directories.
pub fn collect_all_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
