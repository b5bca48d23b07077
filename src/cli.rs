//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quire static site generator CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (default: quire.toml)
    #[arg(short = 'C', long, default_value = "quire.toml")]
    pub config: PathBuf,

    /// Source directory path (relative to project root)
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Target directory path (relative to project root)
    #[arg(short, long)]
    pub target: Option<PathBuf>,

    /// Layout template path (relative to source directory)
    #[arg(short, long)]
    pub layout: Option<PathBuf>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Shared build arguments for Build, Watch and Serve commands
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Write a root-level README.md from the source index document
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub summary: Option<bool>,

    /// Minify the rendered pages
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub minify: Option<bool>,

    /// Link rewriting mode for markdown links: `plain` or `smart`
    #[arg(long)]
    pub links: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Cleans the target directory and renders the whole source tree
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Builds the site, then keeps the target in sync with source changes
    Watch {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Serve the site. Rebuild and reload on change automatically
    Serve {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// The port you should provide
        #[arg(short, long)]
        port: Option<u16>,

        /// enable watch
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },

    /// Scans the target directory and reports dangling links
    Check {
        /// HEAD-check external http(s) links
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        external: Option<bool>,

        /// Exit with an error when broken links are found
        #[arg(long)]
        strict: bool,
    },

    /// Removes the target directory
    Clean,
}
