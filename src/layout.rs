//! Handlebars layouts.
//!
//! Every file next to (or below) the default layout that shares its
//! extension is a template. Templates double as partials, so
//! `{{> partials/nav}}` works without separate registration.
//!
//! ```text
//! docs/_theme/
//!   ├── default.hbs        ← [site] layout, template "default"
//!   ├── wide.hbs           ← front matter `layout: wide`
//!   └── partials/nav.hbs   ← {{> partials/nav}}
//! ```

use crate::config::paths::slashed;
use crate::model::Model;
use handlebars::Handlebars;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to read template `{0}`")]
    Io(PathBuf, #[source] io::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("template `{0}`: {1}")]
    Template(String, String),

    #[error("unknown layout `{0}`")]
    Unknown(String),

    #[error("layout `{0}`: {1}")]
    Render(String, String),
}

/// Registered templates and the default layout name.
pub struct Layouts {
    registry: Handlebars<'static>,
    default: String,
    extension: String,
}

impl Layouts {
    /// Register every template sharing the extension of `layout`.
    pub fn load(layout: &Path) -> Result<Self, LayoutError> {
        let dir = layout.parent().unwrap_or(Path::new(""));
        let extension = extension_of(layout);
        let mut registry = Handlebars::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || extension_of(path) != extension {
                continue;
            }

            let name = template_name(dir, path);
            let text = fs::read_to_string(path)
                .map_err(|err| LayoutError::Io(path.to_path_buf(), err))?;
            registry
                .register_template_string(&name, text)
                .map_err(|err| LayoutError::Template(name.clone(), err.to_string()))?;
        }

        Ok(Self {
            registry,
            default: template_name(dir, layout),
            extension,
        })
    }

    /// Single anonymous layout, for rendering without a layout directory.
    #[cfg(test)]
    pub fn inline(template: &str) -> Result<Self, LayoutError> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string("default", template)
            .map_err(|err| LayoutError::Template("default".into(), err.to_string()))?;
        Ok(Self {
            registry,
            default: "default".into(),
            extension: "hbs".into(),
        })
    }

    /// `path` is a template of the layout at `layout`.
    pub fn is_template(layout: &Path, path: &Path) -> bool {
        let dir = layout.parent().unwrap_or(Path::new(""));
        path.starts_with(dir) && extension_of(path) == extension_of(layout)
    }

    /// Render `model` with the named layout, or the default one.
    ///
    /// Names are relative to the layout directory; the extension is optional.
    pub fn render(&self, name: Option<&str>, model: &Model) -> Result<String, LayoutError> {
        let name = match name {
            Some(name) => name
                .strip_suffix(&format!(".{}", self.extension))
                .unwrap_or(name),
            None => &self.default,
        };

        if !self.registry.has_template(name) {
            return Err(LayoutError::Unknown(name.to_owned()));
        }

        self.registry
            .render(name, model)
            .map_err(|err| LayoutError::Render(name.to_owned(), err.to_string()))
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Slashed path relative to `dir`, without extension.
fn template_name(dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(dir).unwrap_or(path);
    slashed(&relative.with_extension(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn model(value: serde_json::Value) -> Model {
        value.as_object().cloned().unwrap()
    }

    fn theme() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let theme = dir.path().join("_theme");
        fs::create_dir_all(theme.join("partials")).unwrap();
        fs::write(
            theme.join("default.hbs"),
            "<title>{{title}}</title>{{> partials/nav}}<main>{{{content}}}</main>",
        )
        .unwrap();
        fs::write(theme.join("wide.hbs"), "<div class=\"wide\">{{{content}}}</div>").unwrap();
        fs::write(
            theme.join("partials/nav.hbs"),
            "<nav>{{#each pages}}<a href=\"{{../root}}/{{this.path}}\">{{this.title}}</a>{{/each}}</nav>",
        )
        .unwrap();
        fs::write(theme.join("notes.txt"), "{{broken").unwrap();
        let layout = theme.join("default.hbs");
        (dir, layout)
    }

    #[test]
    fn test_render_default_with_partial() {
        let (_dir, layout) = theme();
        let layouts = Layouts::load(&layout).unwrap();
        let html = layouts
            .render(
                None,
                &model(json!({
                    "title": "A & B",
                    "root": "..",
                    "content": "<p>x</p>",
                    "pages": [{"path": "a.html", "title": "A"}]
                })),
            )
            .unwrap();

        assert_eq!(
            html,
            "<title>A &amp; B</title><nav><a href=\"../a.html\">A</a></nav><main><p>x</p></main>"
        );
    }

    #[test]
    fn test_render_named_layout() {
        let (_dir, layout) = theme();
        let layouts = Layouts::load(&layout).unwrap();
        let m = model(json!({"content": "<p>x</p>"}));

        let expected = "<div class=\"wide\"><p>x</p></div>";
        assert_eq!(layouts.render(Some("wide"), &m).unwrap(), expected);
        assert_eq!(layouts.render(Some("wide.hbs"), &m).unwrap(), expected);
        assert!(matches!(
            layouts.render(Some("missing"), &m),
            Err(LayoutError::Unknown(_))
        ));
    }

    #[test]
    fn test_invalid_template() {
        let (_dir, layout) = theme();
        fs::write(layout.with_file_name("bad.hbs"), "{{#if title}}open").unwrap();

        assert!(matches!(
            Layouts::load(&layout),
            Err(LayoutError::Template(name, _)) if name == "bad"
        ));
    }

    #[test]
    fn test_is_template() {
        let layout = Path::new("/docs/_theme/default.hbs");

        assert!(Layouts::is_template(layout, Path::new("/docs/_theme/wide.hbs")));
        assert!(Layouts::is_template(layout, Path::new("/docs/_theme/p/nav.hbs")));
        assert!(!Layouts::is_template(layout, Path::new("/docs/_theme/quire.css")));
        assert!(!Layouts::is_template(layout, Path::new("/docs/page.hbs")));
    }
}
