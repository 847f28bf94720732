//! Route configuration types for sing-box.
//!
//! Rules route matched connections to an outbound; rule sets are remote
//! binary (`.srs`) files referenced by tag.

use serde::{Deserialize, Serialize};

use crate::config::util::{is_false, string_or_vec};

// ============================================================================
// Route Configuration
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RouteRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_set: Vec<RuleSet>,

    /// Default outbound tag (first outbound used if empty)
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "final")]
    pub final_outbound: Option<String>,

    /// Bind outbound connections to the default NIC
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_detect_interface: bool,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(mut self, rule: RouteRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rule_set(mut self, rule_set: RuleSet) -> Self {
        self.rule_set.push(rule_set);
        self
    }

    pub fn with_final(mut self, outbound: impl Into<String>) -> Self {
        self.final_outbound = Some(outbound.into());
        self
    }

    pub fn with_auto_detect_interface(mut self) -> Self {
        self.auto_detect_interface = true;
        self
    }
}

// ============================================================================
// Route Rules
// ============================================================================

/// A route rule: match conditions plus an action
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RouteRule {
    /// Match sniffed protocol
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub protocol: Vec<String>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub domain_suffix: Vec<String>,

    /// Match non-public IP
    #[serde(default, skip_serializing_if = "is_false")]
    pub ip_is_private: bool,

    /// Match the Clash API mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clash_mode: Option<String>,

    /// Match rule set tags
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub rule_set: Vec<String>,

    #[serde(default)]
    pub action: RuleAction,

    /// Target outbound tag, required by the `route` action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound: Option<String>,
}

impl RouteRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn match_protocol(mut self, protocols: Vec<String>) -> Self {
        self.protocol = protocols;
        self
    }

    pub fn match_rule_set(mut self, tags: Vec<String>) -> Self {
        self.rule_set = tags;
        self
    }

    pub fn match_private_ip(mut self) -> Self {
        self.ip_is_private = true;
        self
    }

    pub fn match_clash_mode(mut self, mode: impl Into<String>) -> Self {
        self.clash_mode = Some(mode.into());
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }

    /// Routes to `outbound`
    pub fn with_outbound(mut self, outbound: impl Into<String>) -> Self {
        self.action = RuleAction::Route;
        self.outbound = Some(outbound.into());
        self
    }
}

/// Rule actions used by generated documents
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RuleAction {
    #[default]
    Route,
    Sniff,
    HijackDns,
    Reject,
}

// ============================================================================
// Rule Sets
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleSet {
    Remote(RemoteRuleSet),
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RemoteRuleSet {
    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<RuleSetFormat>,

    pub url: String,

    /// Outbound tag used for downloading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_detour: Option<String>,

    /// Default: 1d
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval: Option<String>,
}

impl RemoteRuleSet {
    /// A binary rule set fetched through `detour`
    pub fn binary(tag: impl Into<String>, url: impl Into<String>, detour: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            format: Some(RuleSetFormat::Binary),
            url: url.into(),
            download_detour: Some(detour.into()),
            update_interval: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleSetFormat {
    Source,
    Binary,
}
