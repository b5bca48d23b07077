//! Site configuration management for `quire.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                          |
//! |-------------|--------------------------------------------------|
//! | `[site]`    | Source/target roots, layout, summary, minify     |
//! | `[options]` | Named pipeline options (link rewriting, ...)     |
//! | `[vars]`    | Global template variables                        |
//! | `[check]`   | Link checker (external HEAD checks, timeout)     |
//! | `[serve]`   | Development server (port, interface, watch)      |
//!
//! # Example
//!
//! ```toml
//! [site]
//! source = "src/docs"
//! target = "target/docs"
//!
//! [options]
//! links = "smart"
//!
//! [vars]
//! project = { name = "Quire", version = "0.3" }
//!
//! [serve]
//! port = 2020
//! ```
//!
//! The loaded configuration is immutable: it is built once in `main`,
//! normalized against the project root and then shared by reference.

mod check;
pub mod defaults;
mod error;
pub mod options;
pub mod paths;
mod serve;
mod site;

pub use error::ConfigError;
pub use options::{LinkMode, PipeOptions};
pub use paths::{PathError, PathResolver};

use check::CheckConfig;
use serve::ServeConfig;
use site::SiteSection;

use crate::cli::{Cli, Commands};
use crate::theme;
use anyhow::Result;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing quire.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Absolute project root (set after loading)
    #[serde(skip)]
    pub root: PathBuf,

    /// Source/target layout
    #[serde(default)]
    pub site: SiteSection,

    /// Opaque pipeline options
    #[serde(default)]
    pub options: PipeOptions,

    /// Global template variables
    #[serde(default)]
    pub vars: toml::Table,

    /// Link checker settings
    #[serde(default)]
    pub check: CheckConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        Self::update_option(&mut self.site.source, cli.source.as_ref());
        Self::update_option(&mut self.site.target, cli.target.as_ref());
        Self::update_option(&mut self.site.layout, cli.layout.as_ref());

        let build_args = match &cli.command {
            Commands::Build { build_args }
            | Commands::Watch { build_args }
            | Commands::Serve { build_args, .. } => Some(build_args),
            _ => None,
        };

        if let Some(args) = build_args {
            Self::update_option(&mut self.site.summary, args.summary.as_ref());
            Self::update_option(&mut self.site.minify, args.minify.as_ref());
            if let Some(links) = &args.links {
                self.options
                    .set(options::LINKS, toml::Value::String(links.clone()));
            }
        }

        match &cli.command {
            Commands::Serve {
                interface,
                port,
                watch,
                ..
            } => {
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.watch, watch.as_ref());
            }
            Commands::Check { external, .. } => {
                Self::update_option(&mut self.check.external, external.as_ref());
            }
            _ => {}
        }

        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        self.config_path = Self::normalize_path(&root.join(&cli.config));
        self.update_path_with_root(root);
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Normalize the root and both site roots to absolute paths.
    pub fn update_path_with_root(&mut self, root: &Path) {
        self.root = Self::normalize_path(root);
        self.site.source = Self::normalize_path(&self.root.join(&self.site.source));
        self.site.target = Self::normalize_path(&self.root.join(&self.site.target));
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            };
            paths::normalize(&absolute)
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Path resolver over the normalized source and target roots.
    pub fn paths(&self) -> PathResolver<'_> {
        PathResolver::new(&self.site.source, &self.site.target)
    }

    /// No explicit layout: render with the bundled theme.
    pub fn uses_bundled_layout(&self) -> bool {
        self.site.layout.as_os_str().is_empty()
    }

    /// Absolute path of the default layout file.
    pub fn layout_path(&self) -> PathBuf {
        let layout = if self.uses_bundled_layout() {
            Path::new(theme::LAYOUT)
        } else {
            self.site.layout.as_path()
        };
        paths::normalize(&self.site.source.join(layout))
    }

    /// Source index document and its root-level copy, if summaries are enabled.
    pub fn root_summary(&self) -> Option<(PathBuf, PathBuf)> {
        self.site.summary.then(|| {
            (
                self.site.source.join("index.md"),
                self.root.join(defaults::site::summary_name()),
            )
        })
    }

    /// Global template variables as a JSON object.
    pub fn globals(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(&self.vars) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Validate source/target roots and pipeline options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let source = &self.site.source;
        let target = &self.site.target;

        if !source.is_dir() {
            return Err(ConfigError::MissingSource(source.clone()));
        }

        if target.exists() && !target.is_dir() {
            return Err(ConfigError::Validation(format!(
                "target `{}` is not a folder",
                target.display()
            )));
        }

        if source != target && (target.starts_with(source) || source.starts_with(target)) {
            return Err(ConfigError::Overlapping(source.clone(), target.clone()));
        }

        self.options.link_mode()?;

        Ok(())
    }

    /// Validate the layout file: inside the source root, existing, with an extension.
    pub fn validate_layout(&self) -> Result<(), ConfigError> {
        let layout = self.layout_path();

        if layout.extension().is_none_or(|ext| ext.is_empty()) {
            return Err(ConfigError::LayoutExtension(layout));
        }

        if !layout.starts_with(&self.site.source) || !layout.is_file() {
            return Err(ConfigError::MissingLayout(layout));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &Path, toml: &str) -> SiteConfig {
        let mut config = SiteConfig::from_str(toml).unwrap();
        config.update_path_with_root(dir);
        config
    }

    #[test]
    fn test_paths_are_absolute() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        let config = config_in(dir.path(), "");

        assert!(config.site.source.is_absolute());
        assert!(config.site.target.is_absolute());
        assert!(config.site.source.ends_with("docs"));
        assert!(config.site.target.ends_with("site"));
    }

    #[test]
    fn test_validate_missing_source() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path(), "");

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSource(_))
        ));
    }

    #[test]
    fn test_validate_overlapping_roots() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs/out")).unwrap();

        let nested = config_in(dir.path(), "[site]\ntarget = \"docs/out\"");
        assert!(matches!(
            nested.validate(),
            Err(ConfigError::Overlapping(..))
        ));

        let parent = config_in(dir.path(), "[site]\nsource = \"docs/out\"\ntarget = \"docs\"");
        assert!(matches!(
            parent.validate(),
            Err(ConfigError::Overlapping(..))
        ));
    }

    #[test]
    fn test_validate_in_place_is_allowed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        let config = config_in(dir.path(), "[site]\ntarget = \"docs\"");

        assert!(config.validate().is_ok());
        assert!(config.paths().in_place());
    }

    #[test]
    fn test_validate_layout() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs/theme")).unwrap();
        fs::write(dir.path().join("docs/theme/page.hbs"), "{{{content}}}").unwrap();
        fs::write(dir.path().join("docs/theme/page"), "").unwrap();

        let ok = config_in(dir.path(), "[site]\nlayout = \"theme/page.hbs\"");
        assert!(ok.validate_layout().is_ok());

        let missing = config_in(dir.path(), "[site]\nlayout = \"theme/none.hbs\"");
        assert!(matches!(
            missing.validate_layout(),
            Err(ConfigError::MissingLayout(_))
        ));

        let outside = config_in(dir.path(), "[site]\nlayout = \"../quire.hbs\"");
        assert!(matches!(
            outside.validate_layout(),
            Err(ConfigError::MissingLayout(_))
        ));

        let bare = config_in(dir.path(), "[site]\nlayout = \"theme/page\"");
        assert!(matches!(
            bare.validate_layout(),
            Err(ConfigError::LayoutExtension(_))
        ));
    }

    #[test]
    fn test_bundled_layout_path() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path(), "");

        assert!(config.uses_bundled_layout());
        assert!(config.layout_path().ends_with(theme::LAYOUT));
    }

    #[test]
    fn test_globals_nested() {
        let config = SiteConfig::from_str(
            "[vars]\nproject = { name = \"Quire\", tags = [\"a\", \"b\"] }",
        )
        .unwrap();
        let globals = config.globals();

        assert_eq!(globals["project"]["name"], "Quire");
        assert_eq!(globals["project"]["tags"][1], "b");
    }

    #[test]
    fn test_root_summary() {
        let dir = TempDir::new().unwrap();
        let off = config_in(dir.path(), "");
        assert!(off.root_summary().is_none());

        let on = config_in(dir.path(), "[site]\nsummary = true");
        let (source, target) = on.root_summary().unwrap();
        assert!(source.ends_with("docs/index.md"));
        assert!(target.ends_with("README.md"));
    }
}
