//! Page models: computed fields, merge precedence and typed lookup.
//!
//! Precedence, low to high:
//!
//! ```text
//! [vars] globals  <  front matter  <  computed (root, base, path, date*)
//! ```
//!
//! `date` is the one computed field that front matter may override.

use crate::config::paths::slashed;
use crate::pipes::SiteFile;
use regex::{Captures, Regex};
use serde_json::Value;
use std::{path::Path, sync::LazyLock};
use thiserror::Error;

/// Ordered string → value mapping shared by front matter and templates.
pub type Model = serde_json::Map<String, Value>;

/// `${dotted.path}` references, optionally escaped with a leading backslash.
static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\?\$\{([.\w]+)\}").expect("valid expression pattern"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("`{0}` is not defined")]
    NotFound(String),

    #[error("`{0}` is not a scalar value")]
    NotScalar(String),
}

// ============================================================================
// Composer
// ============================================================================

/// Adds the computed fields to page models.
#[derive(Debug, Clone)]
pub struct Composer {
    today: String,
}

impl Composer {
    /// Composer stamping pages with today's local date.
    pub fn new() -> Self {
        Self::with_date(chrono::Local::now().date_naive().format("%Y-%m-%d").to_string())
    }

    pub fn with_date(today: impl Into<String>) -> Self {
        Self {
            today: today.into(),
        }
    }

    /// Merge `root`, `base`, `path` and the default `date` into a file model.
    pub fn extend(&self, mut file: SiteFile) -> SiteFile {
        let (root, base) = root_and_base(&file.path);

        file.model.insert("root".into(), Value::String(root));
        file.model.insert("base".into(), Value::String(base));
        file.model
            .insert("path".into(), Value::String(slashed(&file.path)));
        file.model
            .entry("date")
            .or_insert_with(|| Value::String(self.today.clone()));

        file
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

/// Relative path back to the root, and the containing directory.
///
/// `a/b/c.html` → (`../..`, `a/b`); `c.html` → (`.`, `.`)
fn root_and_base(path: &Path) -> (String, String) {
    let dir = path.parent().unwrap_or(Path::new(""));
    let depth = dir.components().count();

    if depth == 0 {
        (".".into(), ".".into())
    } else {
        (vec![".."; depth].join("/"), slashed(dir))
    }
}

/// Combined render model: globals, then the page model, then the page list.
pub fn combine(globals: &Model, page: &Model, pages: &[Value]) -> Model {
    let mut model = globals.clone();
    model.extend(page.iter().map(|(k, v)| (k.clone(), v.clone())));
    model.insert("pages".into(), Value::Array(pages.to_vec()));
    model
}

// ============================================================================
// Lookup
// ============================================================================

/// Resolve a dotted path through nested maps and lists.
///
/// List elements are addressed by index: `authors.0.name`.
pub fn lookup<'m>(model: &'m Model, path: &str) -> Result<&'m Value, LookupError> {
    let not_found = || LookupError::NotFound(path.to_owned());
    let mut segments = path.split('.');

    let first = segments.next().ok_or_else(not_found)?;
    let mut value = model.get(first).ok_or_else(not_found)?;

    for segment in segments {
        value = match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(not_found)?;
    }

    Ok(value)
}

/// Render a value as text; lists of scalars are joined with `, `.
pub fn scalar(value: &Value, path: &str) -> Result<String, LookupError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Array(_) | Value::Object(_) => {
                    Err(LookupError::NotScalar(path.to_owned()))
                }
                _ => scalar(item, path),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(", ")),
        Value::Object(_) => Err(LookupError::NotScalar(path.to_owned())),
    }
}

/// Expand `${dotted.path}` references in rendered HTML.
///
/// Values are HTML-escaped; `\${...}` yields the literal reference.
/// Unresolved references are kept verbatim and reported.
pub fn interpolate(text: &str, model: &Model) -> (String, Vec<LookupError>) {
    let mut unresolved = Vec::new();

    let expanded = EXPRESSION.replace_all(text, |caps: &Captures<'_>| {
        let whole = &caps[0];
        if let Some(literal) = whole.strip_prefix('\\') {
            return literal.to_owned();
        }

        let path = &caps[1];
        match lookup(model, path).and_then(|value| scalar(value, path)) {
            Ok(text) => handlebars::html_escape(&text),
            Err(err) => {
                unresolved.push(err);
                whole.to_owned()
            }
        }
    });

    (expanded.into_owned(), unresolved)
}
