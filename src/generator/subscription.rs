use serde::{Deserialize, Serialize};

use crate::parser::ParseOptions;

// ============================================================================
// Subscription Types
// ============================================================================

/// One subscription source in the generator config
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Subscription {
    /// Name/identifier, also the label used for name prefixing
    pub name: String,

    /// HTTP(S) URL or local file path
    pub url: String,

    /// Newline separated filter rules; any `keep:` rule switches to whitelist mode
    #[serde(default)]
    pub exclude: Option<String>,

    /// Prefix node names with `<name> - `
    #[serde(default)]
    pub prepend_label: bool,
}

impl Subscription {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            exclude: self.exclude.clone(),
            prepend_label: self.prepend_label,
        }
    }
}
