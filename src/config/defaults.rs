//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

// ============================================================================
// [site] Section Defaults
// ============================================================================

pub mod site {
    use std::path::PathBuf;

    pub fn source() -> PathBuf {
        "docs".into()
    }

    pub fn target() -> PathBuf {
        "site".into()
    }

    /// Empty means the bundled theme layout.
    pub fn layout() -> PathBuf {
        "".into()
    }

    /// Name of the root summary written next to the config file.
    pub fn summary_name() -> &'static str {
        "README.md"
    }
}

// ============================================================================
// [check] Section Defaults
// ============================================================================

pub mod check {
    /// HEAD request timeout in milliseconds.
    pub fn timeout() -> u64 {
        2500
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        2020
    }
}
