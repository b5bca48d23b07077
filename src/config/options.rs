//! `[options]` section: named pipeline options.
//!
//! The table is opaque to the configuration layer; individual pipes read
//! the keys they understand through typed accessors.

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Option key selecting the Markdown link rewriting mode.
pub const LINKS: &str = "links";

/// Option key enabling `target="_blank"` on absolute http(s) links.
pub const EXTERNAL_BLANK: &str = "external-blank";

/// How relative `.md` links are rewritten in rendered pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// `path/link.md#hash` → `path/link.html#hash`
    #[default]
    Plain,
    /// `path/link.md` → `path/link`, `path/index.md` → `path`
    Smart,
}

/// `[options]` section in quire.toml.
///
/// # Example
/// ```toml
/// [options]
/// links = "smart"
/// external-blank = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipeOptions(BTreeMap<String, toml::Value>);

impl PipeOptions {
    /// Raw option value.
    pub fn get(&self, name: &str) -> Option<&toml::Value> {
        self.0.get(name)
    }

    /// Boolean option, `false` if absent or not a boolean.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name)
            .and_then(toml::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set(&mut self, name: &str, value: toml::Value) {
        self.0.insert(name.to_owned(), value);
    }

    /// Link rewriting mode for the Markdown pipe.
    pub fn link_mode(&self) -> Result<LinkMode, ConfigError> {
        match self.get(LINKS) {
            None => Ok(LinkMode::Plain),
            Some(value) => match value.as_str() {
                Some("plain") => Ok(LinkMode::Plain),
                Some("smart") => Ok(LinkMode::Smart),
                _ => Err(ConfigError::Validation(format!(
                    "[options.{LINKS}] must be \"plain\" or \"smart\", found {value}"
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use super::*;

    #[test]
    fn test_link_mode() {
        let config: SiteConfig = toml::from_str("[options]\nlinks = \"smart\"").unwrap();
        assert_eq!(config.options.link_mode().unwrap(), LinkMode::Smart);

        let config: SiteConfig = toml::from_str("").unwrap();
        assert_eq!(config.options.link_mode().unwrap(), LinkMode::Plain);
    }

    #[test]
    fn test_link_mode_invalid() {
        let config: SiteConfig = toml::from_str("[options]\nlinks = 3").unwrap();
        assert!(matches!(
            config.options.link_mode(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_options_are_kept() {
        let config: SiteConfig =
            toml::from_str("[options]\nexternal-blank = true\ncustom = \"x\"").unwrap();

        assert!(config.options.flag(EXTERNAL_BLANK));
        assert_eq!(config.options.get("custom").and_then(toml::Value::as_str), Some("x"));
        assert!(!config.options.flag("missing"));
    }
}
