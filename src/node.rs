//! Normalized node model
//!
//! Every subscription format is decoded into [`Node`], the protocol-agnostic
//! record that the processor filters and the emitters render. Protocol
//! specific secrets live in [`Credential`], a closed tagged union with an
//! explicit unknown variant for schemes no codec understands.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::parser::protocols::shadowsocks::Sip002Plugin;

/// Display name used when neither a fragment nor a host is available
pub const UNNAMED_NODE: &str = "Unnamed Node";

/// Free-form protocol parameters that have no dedicated field
pub type Extras = BTreeMap<String, serde_json::Value>;

// ============================================================================
// Node
// ============================================================================

/// Opaque node identifier, generated once per decoded node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single proxy node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Never serialized; a deserialized node always gets a fresh id
    #[serde(skip)]
    pub id: NodeId,

    pub name: String,

    #[serde(flatten)]
    pub credential: Credential,

    #[serde(default)]
    pub endpoint: Endpoint,

    #[serde(default)]
    pub transport: Transport,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: Extras,

    /// Structured proxy map this node was built from, if any
    #[serde(skip)]
    pub origin: Option<serde_yaml::Mapping>,
}

impl Node {
    pub fn new(name: impl Into<String>, endpoint: Endpoint, credential: Credential) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.into(),
            credential,
            endpoint,
            transport: Transport::default(),
            extras: Extras::new(),
            origin: None,
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_extras(mut self, extras: Extras) -> Self {
        self.extras = extras;
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.credential.protocol()
    }

    pub fn tls(&self) -> Option<&TlsOpts> {
        self.transport.tls.as_ref().filter(|tls| tls.enabled)
    }

    /// Compares everything except id, display name and origin
    pub fn equivalent(&self, other: &Node) -> bool {
        self.credential == other.credential
            && self.endpoint == other.endpoint
            && self.transport == other.transport
            && self.extras == other.extras
    }

    /// Returns a string extra, if present
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extras.get(key).and_then(|v| v.as_str())
    }
}

/// Resolves a display name: explicit name, then host, then the placeholder
pub fn display_name(explicit: Option<String>, host: &str) -> String {
    match explicit {
        Some(name) if !name.trim().is_empty() => name,
        _ if !host.is_empty() => host.to_string(),
        _ => UNNAMED_NODE.to_string(),
    }
}

// ============================================================================
// Protocol
// ============================================================================

/// Protocol tag of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    #[serde(rename = "ss")]
    Shadowsocks,
    #[serde(rename = "ssr")]
    ShadowsocksR,
    Hysteria,
    Hysteria2,
    Tuic,
    AnyTls,
    Socks5,
    Unknown,
}

impl Protocol {
    pub const ALL: [Protocol; 10] = [
        Protocol::Vmess,
        Protocol::Vless,
        Protocol::Trojan,
        Protocol::Shadowsocks,
        Protocol::ShadowsocksR,
        Protocol::Hysteria,
        Protocol::Hysteria2,
        Protocol::Tuic,
        Protocol::AnyTls,
        Protocol::Socks5,
    ];

    /// Canonical short tag, as used by share URIs and Clash `type`
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "ss",
            Protocol::ShadowsocksR => "ssr",
            Protocol::Hysteria => "hysteria",
            Protocol::Hysteria2 => "hysteria2",
            Protocol::Tuic => "tuic",
            Protocol::AnyTls => "anytls",
            Protocol::Socks5 => "socks5",
            Protocol::Unknown => "unknown",
        }
    }

    /// Maps a URI scheme to a protocol, accepting common aliases
    pub fn from_scheme(scheme: &str) -> Protocol {
        match scheme.to_ascii_lowercase().as_str() {
            "vmess" => Protocol::Vmess,
            "vless" => Protocol::Vless,
            "trojan" => Protocol::Trojan,
            "ss" | "shadowsocks" => Protocol::Shadowsocks,
            "ssr" | "shadowsocksr" => Protocol::ShadowsocksR,
            "hysteria" | "hy" => Protocol::Hysteria,
            "hysteria2" | "hy2" => Protocol::Hysteria2,
            "tuic" => Protocol::Tuic,
            "anytls" => Protocol::AnyTls,
            "socks5" | "socks" => Protocol::Socks5,
            _ => Protocol::Unknown,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Protocol::from_scheme(s.trim()) {
            Protocol::Unknown if !s.trim().eq_ignore_ascii_case("unknown") => {
                Err(format!("unknown protocol: {}", s))
            }
            protocol => Ok(protocol),
        }
    }
}

// ============================================================================
// Endpoint & Credentials
// ============================================================================

/// Server address; `host` never carries IPv6 brackets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn authority(&self) -> String {
        if self.is_ipv6() {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Protocol-dependent credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum Credential {
    Vmess(VmessCredential),
    Vless(VlessCredential),
    Trojan(TrojanCredential),
    #[serde(rename = "ss")]
    Shadowsocks(ShadowsocksCredential),
    #[serde(rename = "ssr")]
    ShadowsocksR(ShadowsocksRCredential),
    Hysteria(HysteriaCredential),
    Hysteria2(Hysteria2Credential),
    Tuic(TuicCredential),
    AnyTls(AnyTlsCredential),
    Socks5(Socks5Credential),
    Unknown(UnknownCredential),
}

impl Credential {
    pub fn protocol(&self) -> Protocol {
        match self {
            Credential::Vmess(_) => Protocol::Vmess,
            Credential::Vless(_) => Protocol::Vless,
            Credential::Trojan(_) => Protocol::Trojan,
            Credential::Shadowsocks(_) => Protocol::Shadowsocks,
            Credential::ShadowsocksR(_) => Protocol::ShadowsocksR,
            Credential::Hysteria(_) => Protocol::Hysteria,
            Credential::Hysteria2(_) => Protocol::Hysteria2,
            Credential::Tuic(_) => Protocol::Tuic,
            Credential::AnyTls(_) => Protocol::AnyTls,
            Credential::Socks5(_) => Protocol::Socks5,
            Credential::Unknown(_) => Protocol::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmessCredential {
    pub uuid: String,
    #[serde(default)]
    pub alter_id: u32,
    #[serde(default = "default_vmess_cipher")]
    pub cipher: String,
}

fn default_vmess_cipher() -> String {
    "auto".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlessCredential {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrojanCredential {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowsocksCredential {
    pub cipher: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<Sip002Plugin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowsocksRCredential {
    pub cipher: String,
    pub password: String,
    /// Named `ssr_protocol` on the wire, `protocol` is the node tag
    #[serde(rename = "ssr_protocol")]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_param: Option<String>,
    pub obfs: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs_param: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HysteriaCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Obfuscation password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_mbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_mbps: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hysteria2Credential {
    pub password: String,
    /// Obfuscation type, e.g. `salamander`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_mbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_mbps: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuicCredential {
    pub uuid: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congestion_control: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_relay_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnyTlsCredential {
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Socks5Credential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Passthrough for schemes without a codec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownCredential {
    pub scheme: String,
    pub raw: String,
}

// ============================================================================
// Transport
// ============================================================================

/// Stream transport beneath the proxy protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    Ws,
    Grpc,
    H2,
    Quic,
    Kcp,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Ws => "ws",
            Network::Grpc => "grpc",
            Network::H2 => "h2",
            Network::Quic => "quic",
            Network::Kcp => "kcp",
        }
    }

    /// Parses the network names used across share links and Clash configs
    pub fn parse(s: &str) -> Option<Network> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "tcp" | "raw" => Some(Network::Tcp),
            "ws" | "websocket" => Some(Network::Ws),
            "grpc" | "gun" => Some(Network::Grpc),
            "h2" | "http" => Some(Network::H2),
            "quic" => Some(Network::Quic),
            "kcp" | "mkcp" => Some(Network::Kcp),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    #[serde(default)]
    pub network: Network,

    /// ws/h2 request path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// ws/h2 Host header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Header obfuscation type (tcp http, kcp/quic header)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsOpts>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOpts {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reality: Option<RealityOpts>,
}

impl TlsOpts {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn is_reality(&self) -> bool {
        self.reality.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealityOpts {
    pub public_key: String,
    #[serde(default)]
    pub short_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spider_x: Option<String>,
}

/// Splits a comma separated ALPN list, dropping empty entries
pub fn split_alpn(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
