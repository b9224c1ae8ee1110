//! `[render]` section configuration.
//!
//! Settings consumed by the template composer and the directive pipeline.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[render]` section in zin.toml.
///
/// # Example
/// ```toml
/// [render]
/// show_errors = true         # Inline error annotations for failing directives
/// template = "template.html" # Ancestor wrapper file name
/// max_include_depth = 5
/// time_zone = "Europe/Berlin"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    /// Render failing directives as visible annotations instead of removing them.
    /// A site's `.env` `SHOW_ERRORS=ON` enables this per site.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub show_errors: bool,

    /// File name of ancestor template wrappers.
    #[serde(default = "defaults::render::template")]
    #[educe(Default = defaults::render::template())]
    pub template: String,

    /// Levels of nested `<zin-include>` expansion, counting the page itself.
    #[serde(default = "defaults::render::max_include_depth")]
    #[educe(Default = defaults::render::max_include_depth())]
    pub max_include_depth: usize,

    /// `Local` or an IANA zone name; `.env` `TIME_ZONE` takes precedence.
    #[serde(default = "defaults::render::time_zone")]
    #[educe(Default = defaults::render::time_zone())]
    pub time_zone: String,
}
