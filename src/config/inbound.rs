use serde::{Deserialize, Serialize};

use crate::config::shared::ListenFields;
use crate::config::util::is_false;

/// Local entry points of a generated document
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    /// SOCKS4/4a/5 and HTTP on one port
    Mixed(MixedInbound),
    Tun(TunInbound),
}

impl Inbound {
    pub fn tag(&self) -> &str {
        match self {
            Inbound::Mixed(i) => &i.tag,
            Inbound::Tun(i) => &i.tag,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MixedInbound {
    pub tag: String,

    #[serde(flatten)]
    pub listen: ListenFields,

    #[serde(default, skip_serializing_if = "is_false")]
    pub set_system_proxy: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TunInbound {
    pub tag: String,

    /// IPv4 and IPv6 prefixes of the tun interface
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_route: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub strict_route: bool,

    /// system, gvisor or mixed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl TunInbound {
    /// Auto-routed tun with the private ranges sing-box documents suggest
    pub fn auto_route(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            address: vec!["172.19.0.1/30".to_string(), "fdfe:dcba:9876::1/126".to_string()],
            auto_route: true,
            strict_route: true,
            stack: Some("mixed".to_string()),
        }
    }
}
