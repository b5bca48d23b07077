//! `[check]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[check]` section in quire.toml - link checker settings.
///
/// # Example
/// ```toml
/// [check]
/// external = true   # HEAD-check http(s) links (slow, best effort)
/// timeout = 2500    # per-request timeout in milliseconds
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CheckConfig {
    /// Verify external links with HTTP HEAD requests.
    #[serde(default)]
    pub external: bool,

    /// Timeout for a single HEAD request, in milliseconds.
    #[serde(default = "defaults::check::timeout")]
    #[educe(Default = defaults::check::timeout())]
    pub timeout: u64,
}

impl CheckConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}
