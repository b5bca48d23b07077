//! Utility modules for the static site generator.

pub mod minify;
pub mod slug;
pub mod xml;
