//! `[site]` section configuration.
//!
//! Source/target roots and the page layout.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[site]` section in quire.toml.
///
/// # Example
/// ```toml
/// [site]
/// source = "src/docs"
/// target = "target/docs"
/// layout = "theme/page.hbs"   # relative to `source`; empty = bundled theme
/// summary = true              # write README.md from src/docs/index.md
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteSection {
    /// Source folder, relative to the project root.
    #[serde(default = "defaults::site::source")]
    #[educe(Default = defaults::site::source())]
    pub source: PathBuf,

    /// Target folder, relative to the project root.
    /// Equal to `source` for in-place generation.
    #[serde(default = "defaults::site::target")]
    #[educe(Default = defaults::site::target())]
    pub target: PathBuf,

    /// Layout template, relative to `source`.
    #[serde(default = "defaults::site::layout")]
    #[educe(Default = defaults::site::layout())]
    pub layout: PathBuf,

    /// Generate a root-level copy of the source index document.
    #[serde(default)]
    pub summary: bool,

    /// Minify rendered pages.
    #[serde(default)]
    pub minify: bool,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use std::path::Path;

    #[test]
    fn test_site_section() {
        let config = r#"
            [site]
            source = "src/docs"
            target = "out"
            layout = "assets/page.hbs"
            summary = true
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.site.source, Path::new("src/docs"));
        assert_eq!(config.site.target, Path::new("out"));
        assert_eq!(config.site.layout, Path::new("assets/page.hbs"));
        assert!(config.site.summary);
        assert!(!config.site.minify);
    }

    #[test]
    fn test_site_section_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();

        assert_eq!(config.site.source, Path::new("docs"));
        assert_eq!(config.site.target, Path::new("site"));
        assert!(config.site.layout.as_os_str().is_empty());
        assert!(!config.site.summary);
    }

    #[test]
    fn test_unknown_field_rejection() {
        let result: Result<SiteConfig, _> = toml::from_str("[site]\nsauce = \"x\"");
        assert!(result.is_err());
    }
}
