//! Heading anchor slugs.
//!
//! Converts heading text to URL-safe fragment ids.

use rustc_hash::FxHashMap;

// ============================================================================
// Slugification
// ============================================================================

/// Convert text to a lowercase ASCII slug.
///
/// Non-ASCII characters are transliterated; runs of anything that is not
/// alphanumeric collapse to a single dash.
///
/// ```ignore
/// slugify("Getting Started!")  // → "getting-started"
/// slugify("Über Größe")        // → "uber-grosse"
/// ```
pub fn slugify(text: &str) -> String {
    let ascii = deunicode::deunicode(text);
    let mut slug = String::with_capacity(ascii.len());

    for word in ascii
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.extend(word.chars().map(|c| c.to_ascii_lowercase()));
    }

    slug
}

// ============================================================================
// Unique Ids
// ============================================================================

/// Hands out unique ids within one document.
///
/// Repeated slugs get `-1`, `-2`, ... suffixes.
#[derive(Debug, Default)]
pub struct Slugger {
    seen: FxHashMap<String, usize>,
}

impl Slugger {
    /// Unique id for heading text.
    pub fn slug(&mut self, text: &str) -> String {
        let base = match slugify(text) {
            s if s.is_empty() => "section".to_owned(),
            s => s,
        };
        self.claim(base)
    }

    /// Reserve an explicit id, suffixing it if already taken.
    pub fn claim(&mut self, id: String) -> String {
        match self.seen.get_mut(&id) {
            None => {
                self.seen.insert(id.clone(), 0);
                id
            }
            Some(count) => {
                *count += 1;
                let unique = format!("{id}-{count}");
                self.seen.insert(unique.clone(), 0);
                unique
            }
        }
    }
}
