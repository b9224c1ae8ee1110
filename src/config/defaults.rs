//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        9001
    }

    /// Whole-request deadline in seconds.
    pub fn timeout() -> u64 {
        30
    }
}

// ============================================================================
// [render] Section Defaults
// ============================================================================

pub mod render {
    pub fn template() -> String {
        "template.html".into()
    }

    pub fn max_include_depth() -> usize {
        5
    }

    pub fn time_zone() -> String {
        "Local".into()
    }
}
