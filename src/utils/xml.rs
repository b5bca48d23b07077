//! HTML scanning utilities.
//!
//! Provides XML reader creation and anchor/link extraction for generated pages.

use anyhow::Result;
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::borrow::Cow;
use std::str;

// ============================================================================
// XML Reader Creation
// ============================================================================

/// Create a configured XML reader from content bytes
#[inline]
pub fn create_xml_reader(content: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);
    reader.config_mut().enable_all_checks(false);
    reader
}

// ============================================================================
// Reference Extraction
// ============================================================================

/// Anchors and references found in one HTML document.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HtmlRefs {
    /// `id` attributes and `<a name>` values
    pub anchors: Vec<String>,
    /// `href` and `src` attribute values, in document order
    pub links: Vec<String>,
}

/// Collect anchors and link references from HTML content into `refs`.
///
/// On a parse error, `refs` keeps everything read before it.
pub fn scan_html(content: &[u8], refs: &mut HtmlRefs) -> Result<()> {
    let mut reader = create_xml_reader(content);

    loop {
        match reader.read_event() {
            Ok(Event::Start(elem) | Event::Empty(elem)) => collect_refs(&elem, refs),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => anyhow::bail!(
                "XML parse error at position {}: {:?}",
                reader.error_position(),
                e
            ),
        }
    }

    Ok(())
}

fn collect_refs(elem: &BytesStart<'_>, refs: &mut HtmlRefs) {
    let is_anchor = elem.name().as_ref() == b"a";

    for attr in elem.html_attributes().flatten() {
        let value = attribute_text(&attr.value);
        match attr.key.as_ref() {
            b"id" => refs.anchors.push(value.into_owned()),
            b"name" if is_anchor => refs.anchors.push(value.into_owned()),
            b"href" | b"src" => refs.links.push(value.into_owned()),
            _ => {}
        }
    }
}

/// Decode and unescape an attribute value, keeping the raw text on failure.
fn attribute_text(raw: &[u8]) -> Cow<'_, str> {
    let text = String::from_utf8_lossy(raw);
    match quick_xml::escape::unescape(&text) {
        Ok(unescaped) => Cow::Owned(unescaped.into_owned()),
        Err(_) => text,
    }
}

/// Check if a link is external (has a scheme like http:, mailto:, etc.)
#[inline]
pub fn is_external_link(link: &str) -> bool {
    link.find(':').is_some_and(|pos| {
        pos > 0
            && link[..pos]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_external_link_http() {
        assert!(is_external_link("https://example.com"));
        assert!(is_external_link("http://example.com/path"));
    }

    #[test]
    fn test_is_external_link_mailto() {
        assert!(is_external_link("mailto:user@example.com"));
    }

    #[test]
    fn test_is_external_link_relative_path() {
        assert!(!is_external_link("../guide.html"));
        assert!(!is_external_link("guide/setup.html"));
        assert!(!is_external_link("a/b:c.html"));
    }

    #[test]
    fn test_is_external_link_anchor() {
        assert!(!is_external_link("#section"));
        assert!(!is_external_link(":colon"));
    }

    #[test]
    fn test_scan_html_collects_refs() {
        let html = br#"<html><head><link rel="stylesheet" href="s.css"/></head>
<body><h2 id="usage">Usage</h2><a name="old"></a>
<a href="guide.html?x=1&amp;y=2#top">guide</a><img src="logo.png"><input disabled></body></html>"#;
        let mut refs = HtmlRefs::default();
        scan_html(html, &mut refs).unwrap();

        assert_eq!(refs.anchors, vec!["usage", "old"]);
        assert_eq!(
            refs.links,
            vec!["s.css", "guide.html?x=1&y=2#top", "logo.png"]
        );
    }

    #[test]
    fn test_scan_html_ignores_name_on_other_elements() {
        let mut refs = HtmlRefs::default();
        scan_html(br#"<meta name="viewport" content="x"><p id="a">x</p>"#, &mut refs).unwrap();

        assert_eq!(refs.anchors, vec!["a"]);
        assert!(refs.links.is_empty());
    }

    #[test]
    fn test_scan_html_keeps_refs_before_error() {
        let mut refs = HtmlRefs::default();
        let result = scan_html(br#"<p id="a"><a href="b.html">b</a></p><div id="c""#, &mut refs);

        assert!(result.is_err());
        assert_eq!(refs.anchors, vec!["a"]);
        assert_eq!(refs.links, vec!["b.html"]);
    }
}
