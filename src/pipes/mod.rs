//! Pipe chain: claims source files and describes how to render them.
//!
//! # Claim Order
//!
//! ```text
//! source path ──► Suppress ──► Markdown ──► Style ──► Copy
//!                    │            │           │         │
//!                    ▼            ▼           ▼         ▼
//!               stale target   .md→.html  .less/.css  verbatim
//!                 removed      via layout   →.css       bytes
//! ```
//!
//! The first pipe returning a [`SiteFile`] owns the source; later pipes are
//! never consulted, so no file is rendered twice.

mod copy;
pub mod markdown;
mod style;
mod suppress;

use crate::config::{ConfigError, PathError, PathResolver, SiteConfig, paths};
use crate::layout::{LayoutError, Layouts};
use crate::log;
use crate::model::{self, Model};
use crate::utils::minify::minify_html;
use serde_json::Value;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Failures raised while claiming or rendering one file.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Options(#[from] ConfigError),

    #[error("failed to read `{0}`")]
    Read(PathBuf, #[source] io::Error),

    #[error("invalid front matter: {0}")]
    FrontMatter(String),

    #[error("invalid stylesheet: {0}")]
    Style(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("failed to write `{0}`")]
    Write(PathBuf, #[source] io::Error),
}

impl PipeError {
    /// Environment failures abort the current operation; anything else is per-file.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Write(..))
    }
}

// ============================================================================
// Pipes
// ============================================================================

/// Closed set of pipes, tried in [`Pipe::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipe {
    Suppress,
    Markdown,
    Style,
    Copy,
}

impl Pipe {
    pub const ORDER: [Self; 4] = [Self::Suppress, Self::Markdown, Self::Style, Self::Copy];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Suppress => "suppress",
            Self::Markdown => "markdown",
            Self::Style => "style",
            Self::Copy => "copy",
        }
    }

    /// Claim `relative` (source-relative) if this pipe handles it.
    pub fn attempt(
        self,
        config: &SiteConfig,
        relative: &Path,
    ) -> Result<Option<SiteFile>, PipeError> {
        let paths = config.paths();
        match self {
            Self::Suppress => suppress::attempt(paths, relative),
            Self::Markdown => markdown::attempt(config, relative),
            Self::Style => style::attempt(paths, relative),
            Self::Copy => copy::attempt(paths, relative),
        }
    }
}

/// Target-relative output path for a source-relative path.
///
/// `.md` → `.html`, `.less`/`.css` → `.css`, anything else unchanged.
pub fn target_path(relative: &Path) -> PathBuf {
    paths::rewrite(relative, markdown::EXTENSION, &markdown::SOURCE_EXTENSIONS)
        .or_else(|| paths::rewrite(relative, style::EXTENSION, &style::SOURCE_EXTENSIONS))
        .unwrap_or_else(|| relative.to_path_buf())
}

// ============================================================================
// Site Files
// ============================================================================

/// Deferred render operation of a claimed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Render {
    /// Delete the stale target, write nothing
    Remove,
    /// Wrap the rendered body in a layout
    Page { body: String },
    /// Write a processed stylesheet
    Style { css: String },
    /// Copy the source bytes verbatim
    Copy,
}

/// A claimed source file and its pending output.
#[derive(Debug, Clone)]
pub struct SiteFile {
    /// Absolute source path
    pub source: PathBuf,
    /// Output path relative to the target root
    pub path: PathBuf,
    pub pipe: Pipe,
    pub model: Model,
    pub render: Render,
}

/// Site-wide inputs of the render step.
pub struct SiteModel<'a> {
    pub globals: &'a Model,
    pub pages: &'a [Value],
    pub layouts: &'a Layouts,
    pub minify: bool,
}

impl SiteFile {
    pub fn new(pipe: Pipe, source: PathBuf, path: PathBuf, model: Model) -> Self {
        Self {
            source,
            path,
            pipe,
            model,
            render: Render::Copy,
        }
    }

    pub fn with_render(mut self, render: Render) -> Self {
        self.render = render;
        self
    }

    /// Render into `target`, the absolute output path.
    pub fn render(&self, target: &Path, site: &SiteModel<'_>) -> Result<(), PipeError> {
        match &self.render {
            Render::Remove => remove_stale(target),
            Render::Page { body } => {
                let html = self.render_page(body, site)?;
                let html = minify_html(html.as_bytes(), site.minify);
                write(target, &html)
            }
            Render::Style { css } => write(target, css.as_bytes()),
            Render::Copy => {
                ensure_parent(target)?;
                fs::copy(&self.source, target)
                    .map(|_| ())
                    .map_err(|err| PipeError::Write(target.to_path_buf(), err))
            }
        }
    }

    fn render_page(&self, body: &str, site: &SiteModel<'_>) -> Result<String, PipeError> {
        let mut model = model::combine(site.globals, &self.model, site.pages);

        let (content, unresolved) = model::interpolate(body, &model);
        if !unresolved.is_empty() {
            let names: Vec<_> = unresolved.iter().map(ToString::to_string).collect();
            log!("warn"; "{}: {}", paths::slashed(&self.path), names.join(", "));
        }
        model.insert("content".into(), Value::String(content));

        let layout = self.model.get("layout").and_then(Value::as_str);
        Ok(site.layouts.render(layout, &model)?)
    }
}

fn ensure_parent(target: &Path) -> Result<(), PipeError> {
    match target.parent() {
        Some(parent) => fs::create_dir_all(parent)
            .map_err(|err| PipeError::Write(parent.to_path_buf(), err)),
        None => Ok(()),
    }
}

fn write(target: &Path, content: &[u8]) -> Result<(), PipeError> {
    ensure_parent(target)?;
    fs::write(target, content).map_err(|err| PipeError::Write(target.to_path_buf(), err))
}

fn remove_stale(target: &Path) -> Result<(), PipeError> {
    if !target.is_file() {
        return Ok(());
    }
    fs::remove_file(target).map_err(|err| PipeError::Write(target.to_path_buf(), err))?;
    log!("suppress"; "removed {}", target.display());
    Ok(())
}

/// Read a claimed source file as UTF-8 text.
fn read_text(paths: PathResolver<'_>, relative: &Path) -> Result<(PathBuf, String), PipeError> {
    let source = paths.to_source(relative)?;
    let text = fs::read_to_string(&source).map_err(|err| PipeError::Read(source.clone(), err))?;
    Ok((source, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_order() {
        assert_eq!(
            Pipe::ORDER.map(Pipe::name),
            ["suppress", "markdown", "style", "copy"]
        );
    }

    #[test]
    fn test_target_path() {
        assert_eq!(target_path(Path::new("a/b.md")), PathBuf::from("a/b.html"));
        assert_eq!(target_path(Path::new("s/site.less")), PathBuf::from("s/site.css"));
        assert_eq!(target_path(Path::new("s/site.css")), PathBuf::from("s/site.css"));
        assert_eq!(target_path(Path::new("img/logo.png")), PathBuf::from("img/logo.png"));
        assert_eq!(target_path(Path::new("LICENSE")), PathBuf::from("LICENSE"));
    }

    #[test]
    fn test_fatal_errors() {
        let write = PipeError::Write(PathBuf::from("x"), io::Error::other("disk full"));
        let parse = PipeError::FrontMatter("bad".into());

        assert!(write.is_fatal());
        assert!(!parse.is_fatal());
    }
}
