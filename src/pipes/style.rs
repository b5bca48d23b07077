//! Stylesheets: `.less` and `.css` sources minified into `.css`.
//!
//! `.less` sources are read as plain CSS; LESS-only syntax fails the file.

use super::{Pipe, PipeError, Render, SiteFile};
use crate::config::{PathResolver, paths};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use std::path::Path;

pub const EXTENSION: &str = ".css";
pub const SOURCE_EXTENSIONS: [&str; 2] = [".less", ".css"];

pub(super) fn attempt(
    paths: PathResolver<'_>,
    relative: &Path,
) -> Result<Option<SiteFile>, PipeError> {
    let Some(path) = paths::rewrite(relative, EXTENSION, &SOURCE_EXTENSIONS) else {
        return Ok(None);
    };

    let (source, text) = super::read_text(paths, relative)?;
    let css = minify_css(&text, &paths::slashed(relative))?;

    let file = SiteFile::new(Pipe::Style, source, path, Default::default());
    Ok(Some(file.with_render(Render::Style { css })))
}

/// Parse and minify a stylesheet.
pub fn minify_css(text: &str, filename: &str) -> Result<String, PipeError> {
    let options = ParserOptions {
        filename: filename.to_owned(),
        ..ParserOptions::default()
    };
    let stylesheet =
        StyleSheet::parse(text, options).map_err(|err| PipeError::Style(err.to_string()))?;

    stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map(|output| output.code)
        .map_err(|err| PipeError::Style(err.to_string()))
}
