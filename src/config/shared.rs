//! Field structures embedded in several sing-box objects.

use serde::{Deserialize, Serialize};

use crate::config::util::is_false;

/// Domain resolution strategy for DNS servers and outbounds
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DomainStrategy {
    PreferIpv4,
    PreferIpv6,
    Ipv4Only,
    Ipv6Only,
}

/// Listen fields of an inbound
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ListenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
}

impl ListenFields {
    pub fn loopback(port: u16) -> Self {
        Self {
            listen: Some("127.0.0.1".to_string()),
            listen_port: Some(port),
        }
    }
}

/// Client-side TLS of a proxy outbound
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct OutboundTlsConfig {
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    /// Server name for verification and SNI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Accept any server certificate
    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utls: Option<UtlsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reality: Option<OutboundRealityConfig>,
}

/// uTLS ClientHello fingerprinting
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct UtlsConfig {
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    /// chrome, firefox, edge, safari, 360, qq, ios, android, random, randomized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct OutboundRealityConfig {
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Hex string, 0-8 digits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_default_serializes_empty() {
        let json = serde_json::to_string(&OutboundTlsConfig::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_tls_with_reality() {
        let tls = OutboundTlsConfig {
            enabled: true,
            server_name: Some("s.com".to_string()),
            utls: Some(UtlsConfig {
                enabled: true,
                fingerprint: Some("chrome".to_string()),
            }),
            reality: Some(OutboundRealityConfig {
                enabled: true,
                public_key: Some("KEY".to_string()),
                short_id: Some("ab12".to_string()),
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&tls).unwrap();
        assert_eq!(json["server_name"], "s.com");
        assert_eq!(json["utls"]["fingerprint"], "chrome");
        assert_eq!(json["reality"]["public_key"], "KEY");
        assert!(json.get("insecure").is_none());
    }

    #[test]
    fn test_listen_fields_loopback() {
        let json = serde_json::to_string(&ListenFields::loopback(7890)).unwrap();
        assert_eq!(json, r#"{"listen":"127.0.0.1","listen_port":7890}"#);
    }
}
