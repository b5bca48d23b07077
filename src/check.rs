//! Link integrity checking over the rendered target tree.
//!
//! # Flow
//!
//! ```text
//! target/ ──► walk ──► produced: {"a.html", "a.html#usage", "logo.png", ...}
//!                 └──► records:  {(document, reference), ...}
//!
//! reference ──► normalize ──► Internal("guide/setup.html#install")
//!                         └─► External("https://...")
//!
//! Internal not in produced (nor any variant) ──► broken
//! ```

use crate::{
    config::{SiteConfig, paths::slashed},
    log,
    site::collect_all_files,
    utils::xml::{HtmlRefs, is_external_link, scan_html},
};
use anyhow::Result;
use std::{
    collections::BTreeSet,
    fs,
    path::Path,
    time::{Duration, Instant},
};

/// One edge of the link graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinkRecord {
    /// Target-relative document path
    pub document: String,
    /// Reference as written in the document
    pub reference: String,
}

/// Outcome of a link check.
#[derive(Debug, Default)]
pub struct LinkReport {
    /// Number of files scanned
    pub files: usize,
    /// Every link collected from HTML documents
    pub links: BTreeSet<LinkRecord>,
    /// Internal references resolving to nothing, sorted
    pub broken: Vec<LinkRecord>,
    /// Scheme-qualified references, not validated unless requested
    pub external: BTreeSet<String>,
}

/// Normalized form of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Target-relative path, with a fragment for HTML documents
    Internal(String),
    External(String),
}

/// Check the configured target tree.
pub fn check_site(config: &SiteConfig) -> Result<LinkReport> {
    let external = config.check.external.then(|| config.check.timeout());
    check_links(config.paths().target(), external)
}

/// Check every HTML document under `target`.
///
/// With `external` set, http(s) references are HEAD-checked with that
/// timeout; network failures count as valid.
pub fn check_links(target: &Path, external: Option<Duration>) -> Result<LinkReport> {
    let started = Instant::now();
    let files = collect_all_files(target)?;
    let mut produced = BTreeSet::new();
    let mut report = LinkReport {
        files: files.len(),
        ..Default::default()
    };

    for file in &files {
        let Ok(relative) = file.strip_prefix(target) else {
            continue;
        };
        let document = slashed(relative);

        if is_document(&document) {
            let content = fs::read(file)?;
            let mut refs = HtmlRefs::default();
            if let Err(err) = scan_html(&content, &mut refs) {
                log!("warn"; "{document}: {err}, keeping references read so far");
            }

            for anchor in refs.anchors {
                produced.insert(format!("{document}#{anchor}"));
            }
            for reference in refs.links {
                report.links.insert(LinkRecord {
                    document: document.clone(),
                    reference,
                });
            }
        }

        produced.insert(document);
    }

    let mut broken = BTreeSet::new();
    for record in &report.links {
        match normalize(&record.document, &record.reference) {
            Reference::External(url) => {
                report.external.insert(url);
            }
            Reference::Internal(path) => {
                if !variants(&path).iter().any(|v| produced.contains(v)) {
                    broken.insert(record.clone());
                }
            }
        }
    }

    if let Some(timeout) = external {
        broken.extend(check_external(&report, timeout));
    }

    report.broken = broken.into_iter().collect();

    for record in &report.broken {
        log!("check"; "{} ~> {}", record.document, record.reference);
    }
    log!(
        "check";
        "{} broken of {} links in {} files ({} external) in {:.2} s",
        report.broken.len(),
        report.links.len(),
        report.files,
        report.external.len(),
        started.elapsed().as_secs_f64()
    );

    Ok(report)
}

// ============================================================================
// Normalization
// ============================================================================

/// Normalize `reference` as found in `document`.
///
/// ```ignore
/// normalize("a/b.html", "//x.org")      // → External("http://x.org")
/// normalize("a/b.html", "#top")         // → Internal("a/b.html#top")
/// normalize("a/b.html", "../c/?q=1")    // → Internal("c/index.html")
/// normalize("a/b.html", "/img/x.png#y") // → Internal("img/x.png")
/// ```
pub fn normalize(document: &str, reference: &str) -> Reference {
    let reference = reference.trim();

    if reference.starts_with("//") {
        return Reference::External(format!("http:{reference}"));
    }
    if is_external_link(reference) {
        return Reference::External(reference.to_owned());
    }

    let (path, fragment) = match reference.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (reference, None),
    };
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    let path = urlencoding::decode(path).map_or_else(|_| path.to_owned(), |p| p.into_owned());

    let resolved = if path.is_empty() {
        document.to_owned()
    } else {
        let mut path = path;
        if path.ends_with('/') {
            path.push_str("index.html");
        } else if path == "." || path == ".." || path.ends_with("/.") || path.ends_with("/..") {
            path.push_str("/index.html");
        }

        match path.strip_prefix('/') {
            Some(absolute) => resolve("", absolute),
            None => resolve(parent(document), &path),
        }
    };

    match fragment {
        Some(fragment) if !fragment.is_empty() && may_be_document(&resolved) => {
            Reference::Internal(format!("{resolved}#{fragment}"))
        }
        _ => Reference::Internal(resolved),
    }
}

/// Paths a normalized reference may be produced under.
///
/// `guide.md` → `guide.html`; `guide` → `guide.html`, `guide/index.html`
fn variants(reference: &str) -> Vec<String> {
    let (path, fragment) = match reference.split_once('#') {
        Some((path, fragment)) => (path, format!("#{fragment}")),
        None => (reference, String::new()),
    };

    let mut variants = vec![reference.to_owned()];
    let name = path.rsplit('/').next().unwrap_or(path);

    if let Some(stem) = path.strip_suffix(".md") {
        variants.push(format!("{stem}.html{fragment}"));
    } else if !name.is_empty() && !name.contains('.') {
        variants.push(format!("{path}.html{fragment}"));
        variants.push(format!("{path}/index.html{fragment}"));
    }

    variants
}

/// Resolve slashed `path` against directory `base`, lexically.
///
/// Segments escaping the root are kept, so they never match a produced path.
fn resolve(base: &str, path: &str) -> String {
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    let mut escaped = 0;

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    escaped += 1;
                }
            }
            segment => segments.push(segment),
        }
    }

    let mut resolved = "../".repeat(escaped);
    resolved.push_str(&segments.join("/"));
    resolved
}

fn parent(document: &str) -> &str {
    document.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// HTML pages, Markdown sources and extensionless pretty URLs carry anchors.
fn may_be_document(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    is_document(path) || path.ends_with(".md") || !name.contains('.')
}

fn is_document(path: &str) -> bool {
    let path = path.split_once('#').map_or(path, |(path, _)| path);
    path.ends_with(".html") || path.ends_with(".htm")
}

// ============================================================================
// External Links
// ============================================================================

/// HEAD-check http(s) references; returns the records found missing.
///
/// Only 404 and 410 count as broken. Anything else, including network
/// failures, is assumed valid.
fn check_external(report: &LinkReport, timeout: Duration) -> Vec<LinkRecord> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into();

    let missing: BTreeSet<&str> = report
        .external
        .iter()
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .filter(|url| !head_ok(&agent, url))
        .map(String::as_str)
        .collect();

    report
        .links
        .iter()
        .filter(|record| match normalize(&record.document, &record.reference) {
            Reference::External(url) => missing.contains(url.as_str()),
            Reference::Internal(_) => false,
        })
        .cloned()
        .collect()
}

fn head_ok(agent: &ureq::Agent, url: &str) -> bool {
    if let Err(err) = url::Url::parse(url) {
        log!("check"; "malformed url {url}: {err}");
        return false;
    }

    match agent.head(url).call() {
        Ok(response) => !matches!(response.status().as_u16(), 404 | 410),
        Err(err) => {
            log!("check"; "{url}: {err}, assumed valid");
            true
        }
    }
}
