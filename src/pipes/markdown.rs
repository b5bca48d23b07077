//! Markdown pages: front matter, heading anchors and link rewriting.
//!
//! # Link Rewriting
//!
//! | Link                 | plain                  | smart            |
//! |----------------------|------------------------|------------------|
//! | `link.md`            | `link.html`            | `link`           |
//! | `path/link.md#hash`  | `path/link.html#hash`  | `path/link#hash` |
//! | `index.md`           | `index.html`           | `.`              |
//! | `path/index.md#hash` | `path/index.html#hash` | `path#hash`      |
//!
//! Links with a scheme are never rewritten.

use super::{Pipe, PipeError, Render, SiteFile};
use crate::config::{LinkMode, SiteConfig, options, paths};
use crate::model::Model;
use crate::utils::{slug::Slugger, xml::is_external_link};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use serde_json::{Value, json};
use std::{path::Path, sync::LazyLock};

pub const EXTENSION: &str = ".html";
pub const SOURCE_EXTENSIONS: [&str; 1] = [".md"];

/// `dir/name.md#hash` links to Markdown documents.
static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<dir>(?:.*/)?)(?P<name>[^/#]*)\.md(?P<hash>#[^/#]*)?$")
        .expect("valid markdown link pattern")
});

pub(super) fn attempt(
    config: &SiteConfig,
    relative: &Path,
) -> Result<Option<SiteFile>, PipeError> {
    let Some(path) = paths::rewrite(relative, EXTENSION, &SOURCE_EXTENSIONS) else {
        return Ok(None);
    };

    let (source, text) = super::read_text(config.paths(), relative)?;
    let options = MarkdownOptions::from_config(config)?;

    let (mut model, body) = split_front_matter(&text)?;
    let page = render_markdown(body, &options);

    if !model.contains_key("title")
        && let Some(h1) = page.headings.iter().find(|h| h.level == 1)
    {
        model.insert("title".into(), Value::String(h1.text.clone()));
    }
    model.insert(
        "headings".into(),
        Value::Array(page.headings.iter().map(Heading::to_value).collect()),
    );

    let file = SiteFile::new(Pipe::Markdown, source, path, model);
    Ok(Some(file.with_render(Render::Page { body: page.html })))
}

// ============================================================================
// Options
// ============================================================================

/// Rendering switches read from `[options]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownOptions {
    pub links: LinkMode,
    pub external_blank: bool,
}

impl MarkdownOptions {
    pub fn from_config(config: &SiteConfig) -> Result<Self, PipeError> {
        Ok(Self {
            links: config.options.link_mode()?,
            external_blank: config.options.flag(options::EXTERNAL_BLANK),
        })
    }
}

fn parser_options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_FOOTNOTES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    opts.insert(Options::ENABLE_DEFINITION_LIST);
    opts.insert(Options::ENABLE_GFM);
    opts
}

// ============================================================================
// Front Matter
// ============================================================================

/// Split a leading `---` fenced YAML block from the document body.
///
/// The block must be a mapping; an empty block yields an empty model.
pub fn split_front_matter(text: &str) -> Result<(Model, &str), PipeError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(rest) = text
        .strip_prefix("---")
        .and_then(|rest| rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')))
    else {
        return Ok((Model::new(), text));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let fence = line.trim_end_matches(['\r', '\n']);
        if fence == "---" || fence == "..." {
            let model = parse_front_matter(&rest[..offset])?;
            return Ok((model, &rest[offset + line.len()..]));
        }
        offset += line.len();
    }

    Err(PipeError::FrontMatter("unterminated `---` block".into()))
}

fn parse_front_matter(yaml: &str) -> Result<Model, PipeError> {
    if yaml.trim().is_empty() {
        return Ok(Model::new());
    }
    match serde_yml::from_str::<Value>(yaml) {
        Ok(Value::Object(model)) => Ok(model),
        Ok(Value::Null) => Ok(Model::new()),
        Ok(_) => Err(PipeError::FrontMatter("expected a mapping".into())),
        Err(err) => Err(PipeError::FrontMatter(err.to_string())),
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// A document heading with its anchor id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub id: String,
    pub text: String,
}

impl Heading {
    fn to_value(&self) -> Value {
        json!({ "level": self.level, "id": self.id, "text": self.text })
    }
}

/// Rendered Markdown body.
#[derive(Debug)]
pub struct Rendered {
    pub html: String,
    pub headings: Vec<Heading>,
}

/// Render a Markdown body to HTML.
pub fn render_markdown(text: &str, options: &MarkdownOptions) -> Rendered {
    let mut events: Vec<Event<'_>> = Parser::new_ext(text, parser_options()).collect();
    let headings = assign_heading_ids(&mut events);

    let mut html = String::with_capacity(text.len() * 3 / 2);
    pulldown_cmark::html::push_html(
        &mut html,
        events.into_iter().map(|event| rewrite_event(event, options)),
    );

    Rendered { html, headings }
}

/// Give every heading a unique id; explicit `{#id}` attributes win.
fn assign_heading_ids(events: &mut [Event<'_>]) -> Vec<Heading> {
    let mut slugger = Slugger::default();
    let mut headings = Vec::new();

    let mut i = 0;
    while i < events.len() {
        if matches!(events[i], Event::Start(Tag::Heading { .. })) {
            let end = events[i..]
                .iter()
                .position(|e| matches!(e, Event::End(TagEnd::Heading(_))))
                .map_or(events.len(), |offset| i + offset);
            let text = plain_text(&events[i + 1..end]);

            if let Event::Start(Tag::Heading { level, id, .. }) = &mut events[i] {
                let unique = match id.take() {
                    Some(explicit) => slugger.claim(explicit.to_string()),
                    None => slugger.slug(&text),
                };
                *id = Some(CowStr::from(unique.clone()));
                headings.push(Heading {
                    level: *level as u8,
                    id: unique,
                    text,
                });
            }
            i = end;
        }
        i += 1;
    }

    headings
}

fn plain_text(events: &[Event<'_>]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Text(text) | Event::Code(text) => Some(text.as_ref()),
            _ => None,
        })
        .collect()
}

fn rewrite_event<'a>(event: Event<'a>, options: &MarkdownOptions) -> Event<'a> {
    let Event::Start(Tag::Link {
        link_type,
        dest_url,
        title,
        id,
    }) = event
    else {
        return event;
    };

    let dest_url = rewrite_link(&dest_url, options.links).map_or(dest_url, CowStr::from);

    if options.external_blank && is_web_link(&dest_url) {
        let title = if title.is_empty() {
            String::new()
        } else {
            format!(r#" title="{}""#, handlebars::html_escape(&title))
        };
        let href = handlebars::html_escape(&dest_url);
        return Event::InlineHtml(format!(r#"<a href="{href}"{title} target="_blank">"#).into());
    }

    Event::Start(Tag::Link {
        link_type,
        dest_url,
        title,
        id,
    })
}

fn is_web_link(link: &str) -> bool {
    link.starts_with("http://") || link.starts_with("https://")
}

/// Rewrite a relative link to a Markdown document into its rendered form.
///
/// Returns `None` for links that do not target `.md` documents.
pub fn rewrite_link(link: &str, mode: LinkMode) -> Option<String> {
    if is_external_link(link) {
        return None;
    }

    let caps = MARKDOWN_LINK.captures(link)?;
    let dir = &caps["dir"];
    let name = &caps["name"];
    let hash = caps.name("hash").map_or("", |m| m.as_str());

    Some(match mode {
        LinkMode::Plain => format!("{dir}{name}.html{hash}"),
        LinkMode::Smart => {
            let path = if name == "index" {
                match dir.strip_suffix('/') {
                    Some(parent) if !parent.is_empty() => parent.to_owned(),
                    _ => dir.to_owned(),
                }
            } else {
                format!("{dir}{name}")
            };
            if path.is_empty() && hash.is_empty() {
                ".".to_owned()
            } else {
                path + hash
            }
        }
    })
}
