use serde::{Deserialize, Serialize};

use crate::config::shared::DomainStrategy;
use crate::config::util::string_or_vec;

/// DNS configuration for sing-box
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Dns {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<DnsServer>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<DnsRule>,

    /// Default DNS server tag. The first server will be used if empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#final: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DomainStrategy>,
}

/// DNS server, typed by transport
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DnsServer {
    /// System resolver
    Local(LocalDnsServer),
    Udp(RemoteDnsServer),
    Tls(RemoteDnsServer),
    Https(RemoteDnsServer),
}

impl DnsServer {
    pub fn tag(&self) -> &str {
        match self {
            DnsServer::Local(s) => &s.tag,
            DnsServer::Udp(s) | DnsServer::Tls(s) | DnsServer::Https(s) => &s.tag,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LocalDnsServer {
    pub tag: String,
}

/// A DNS server reached over the network
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RemoteDnsServer {
    pub tag: String,

    /// IP address or domain of the server
    pub server: String,

    /// Tag of the outbound used to reach the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detour: Option<String>,
}

impl RemoteDnsServer {
    pub fn new(tag: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            server: server.into(),
            ..Default::default()
        }
    }

    pub fn with_detour(mut self, detour: impl Into<String>) -> Self {
        self.detour = Some(detour.into());
        self
    }
}

/// Routes matching queries to a server
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DnsRule {
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub rule_set: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clash_mode: Option<String>,

    /// Always `route` in generated documents
    #[serde(default = "default_dns_action")]
    pub action: String,

    pub server: String,
}

fn default_dns_action() -> String {
    "route".to_string()
}

impl DnsRule {
    pub fn rule_set(tags: Vec<String>, server: impl Into<String>) -> Self {
        Self {
            rule_set: tags,
            clash_mode: None,
            action: default_dns_action(),
            server: server.into(),
        }
    }

    pub fn clash_mode(mode: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            rule_set: Vec::new(),
            clash_mode: Some(mode.into()),
            action: default_dns_action(),
            server: server.into(),
        }
    }
}
