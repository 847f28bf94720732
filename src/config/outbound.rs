use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::shared::OutboundTlsConfig;
use crate::config::util::{is_false, is_zero_u32};

// ============================================================================
// Outbound Enum
// ============================================================================

/// Outbounds that a generated document can contain
///
/// Proxy variants mirror the node protocols; the rest is the fixed
/// scaffolding every document carries.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    Direct(DirectOutbound),
    Block(BlockOutbound),
    Dns(DnsOutbound),
    Selector(SelectorOutbound),
    #[serde(rename = "urltest")]
    UrlTest(UrlTestOutbound),
    Socks(SocksOutbound),
    Shadowsocks(ShadowsocksOutbound),
    #[serde(rename = "shadowsocksr")]
    ShadowsocksR(ShadowsocksROutbound),
    #[serde(rename = "vmess")]
    VMess(VMessOutbound),
    #[serde(rename = "vless")]
    VLess(VLessOutbound),
    Trojan(TrojanOutbound),
    Hysteria(HysteriaOutbound),
    Hysteria2(Hysteria2Outbound),
    Tuic(TuicOutbound),
    #[serde(rename = "anytls")]
    AnyTls(AnyTlsOutbound),
}

impl Outbound {
    pub fn tag(&self) -> &str {
        match self {
            Outbound::Direct(o) => &o.tag,
            Outbound::Block(o) => &o.tag,
            Outbound::Dns(o) => &o.tag,
            Outbound::Selector(o) => &o.tag,
            Outbound::UrlTest(o) => &o.tag,
            Outbound::Socks(o) => &o.tag,
            Outbound::Shadowsocks(o) => &o.tag,
            Outbound::ShadowsocksR(o) => &o.tag,
            Outbound::VMess(o) => &o.tag,
            Outbound::VLess(o) => &o.tag,
            Outbound::Trojan(o) => &o.tag,
            Outbound::Hysteria(o) => &o.tag,
            Outbound::Hysteria2(o) => &o.tag,
            Outbound::Tuic(o) => &o.tag,
            Outbound::AnyTls(o) => &o.tag,
        }
    }

    pub fn direct(tag: impl Into<String>) -> Self {
        Outbound::Direct(DirectOutbound { tag: tag.into() })
    }

    pub fn block(tag: impl Into<String>) -> Self {
        Outbound::Block(BlockOutbound { tag: tag.into() })
    }

    pub fn dns(tag: impl Into<String>) -> Self {
        Outbound::Dns(DnsOutbound { tag: tag.into() })
    }
}

// ============================================================================
// V2Ray Transport
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum V2RayTransport {
    Http(HttpTransport),
    #[serde(rename = "ws")]
    WebSocket(WebSocketTransport),
    Quic(QuicTransport),
    #[serde(rename = "grpc")]
    Grpc(GrpcTransport),
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct HttpTransport {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct WebSocketTransport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Extra headers, typically just `Host`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub max_early_data: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_data_header_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct QuicTransport {}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GrpcTransport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

// ============================================================================
// Scaffolding Outbounds
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DirectOutbound {
    pub tag: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct BlockOutbound {
    pub tag: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DnsOutbound {
    pub tag: String,
}

/// Manual selection between outbounds
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SelectorOutbound {
    pub tag: String,

    pub outbounds: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub interrupt_exist_connections: bool,
}

/// Latency-based automatic selection
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UrlTestOutbound {
    pub tag: String,

    pub outbounds: Vec<String>,

    /// Default: https://www.gstatic.com/generate_204
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Default: 3m
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Milliseconds, default 50
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub tolerance: u32,
}

// ============================================================================
// Proxy Outbounds
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SocksOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,

    /// 4, 4a or 5 (default: 5)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ShadowsocksOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub method: String,
    pub password: String,

    /// SIP003 plugin name: obfs-local or v2ray-plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    /// SIP003 plugin options, without the plugin name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_opts: Option<String>,
}

/// Legacy ShadowsocksR client, only present in older sing-box builds
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ShadowsocksROutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub method: String,
    pub password: String,
    pub obfs: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs_param: Option<String>,

    pub protocol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_param: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct VMessOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub uuid: String,

    /// auto, none, zero, aes-128-gcm, chacha20-poly1305
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,

    /// 0 selects AEAD
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub alter_id: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTlsConfig>,

    /// packetaddr or xudp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_encoding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<V2RayTransport>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct VLessOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub uuid: String,

    /// Only `xtls-rprx-vision` is meaningful
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTlsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_encoding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<V2RayTransport>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TrojanOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTlsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<V2RayTransport>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct HysteriaOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_mbps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_mbps: Option<u32>,

    /// Obfuscation password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_str: Option<String>,

    /// Required by sing-box
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTlsConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Hysteria2Outbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_mbps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_mbps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfs: Option<Hysteria2Obfs>,

    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTlsConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Hysteria2Obfs {
    /// Only `salamander`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub obfs_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TuicOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub uuid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// cubic, new_reno or bbr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congestion_control: Option<String>,

    /// native or quic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_relay_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTlsConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AnyTlsOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_session_timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTlsConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffolding_outbounds() {
        let json = serde_json::to_string(&Outbound::direct("direct")).unwrap();
        assert_eq!(json, r#"{"type":"direct","tag":"direct"}"#);
        assert_eq!(Outbound::block("block").tag(), "block");
    }

    #[test]
    fn test_urltest_serialization() {
        let outbound = Outbound::UrlTest(UrlTestOutbound {
            tag: "auto".to_string(),
            outbounds: vec!["a".to_string(), "b".to_string()],
            interval: Some("3m".to_string()),
            ..Default::default()
        });
        let json = serde_json::to_value(&outbound).unwrap();
        assert_eq!(json["type"], "urltest");
        assert_eq!(json["outbounds"][1], "b");
        assert!(json.get("tolerance").is_none());
        assert!(json.get("url").is_none());
    }

    #[test]
    fn test_vless_with_ws_transport() {
        let outbound = Outbound::VLess(VLessOutbound {
            tag: "v".to_string(),
            server: "a.com".to_string(),
            server_port: 443,
            uuid: "1111".to_string(),
            transport: Some(V2RayTransport::WebSocket(WebSocketTransport {
                path: Some("/ws".to_string()),
                headers: HashMap::from([("Host".to_string(), "h.com".to_string())]),
                ..Default::default()
            })),
            ..Default::default()
        });
        let json = serde_json::to_value(&outbound).unwrap();
        assert_eq!(json["type"], "vless");
        assert_eq!(json["transport"]["type"], "ws");
        assert_eq!(json["transport"]["headers"]["Host"], "h.com");
        assert!(json.get("flow").is_none());
    }

    #[test]
    fn test_shadowsocksr_tag() {
        let outbound = Outbound::ShadowsocksR(ShadowsocksROutbound {
            tag: "r".to_string(),
            protocol: "origin".to_string(),
            obfs: "plain".to_string(),
            ..Default::default()
        });
        let json = serde_json::to_value(&outbound).unwrap();
        assert_eq!(json["type"], "shadowsocksr");
        assert_eq!(json["protocol"], "origin");
    }

    #[test]
    fn test_deserialize_hysteria2() {
        let json = r#"{"type":"hysteria2","tag":"h","server":"a.com","server_port":443,"password":"pw","obfs":{"type":"salamander","password":"o"}}"#;
        let outbound: Outbound = serde_json::from_str(json).unwrap();
        if let Outbound::Hysteria2(h) = outbound {
            assert_eq!(h.password, "pw");
            assert_eq!(h.obfs.unwrap().obfs_type.as_deref(), Some("salamander"));
        } else {
            panic!("Expected Hysteria2 outbound");
        }
    }
}
