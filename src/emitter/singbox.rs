//! sing-box JSON emitter
//!
//! Builds a [`SingBoxConfig`] tree: proxy outbounds, selector/urltest groups
//! mirroring the shared policy, fixed `direct`/`block`/`dns` outbounds, DNS
//! servers and rules, and remote binary rule sets.

use std::collections::HashMap;

use tracing::debug;

use crate::config::SingBoxConfig;
use crate::config::dns::{Dns, DnsRule, DnsServer, LocalDnsServer, RemoteDnsServer};
use crate::config::experimental::Experimental;
use crate::config::inbound::{Inbound, MixedInbound, TunInbound};
use crate::config::log::{Log, LogLevel};
use crate::config::outbound::{
    AnyTlsOutbound, GrpcTransport, HttpTransport, Hysteria2Obfs, Hysteria2Outbound,
    HysteriaOutbound, Outbound, QuicTransport, SelectorOutbound, ShadowsocksOutbound,
    ShadowsocksROutbound, SocksOutbound, TrojanOutbound, TuicOutbound, UrlTestOutbound,
    V2RayTransport, VLessOutbound, VMessOutbound, WebSocketTransport,
};
use crate::config::route::{RemoteRuleSet, Route, RouteRule, RuleAction, RuleSet};
use crate::config::shared::{
    DomainStrategy, ListenFields, OutboundRealityConfig, OutboundTlsConfig, UtlsConfig,
};
use crate::node::{Credential, Network, Node, TlsOpts, Transport};

use super::policy::{self, GroupKind, Policy, PolicyGroup};
use super::{EmitError, Emitter};

const DNS_OUT_TAG: &str = "dns-out";
const DNS_LOCAL: &str = "local";
const DNS_REMOTE: &str = "remote";
const MIXED_PORT: u16 = 2080;

/// Header carrying WebSocket early data, as Xray sends it
const EARLY_DATA_HEADER: &str = "Sec-WebSocket-Protocol";

/// uTLS fingerprint used when a Reality node names none
const DEFAULT_FINGERPRINT: &str = "chrome";

pub struct SingBoxEmitter;

impl Emitter for SingBoxEmitter {
    fn emit(&self, nodes: &[Node], _label: &str) -> Result<String, EmitError> {
        Ok(build_config(nodes).to_json_pretty()?)
    }
}

/// Composes the whole document
pub fn build_config(nodes: &[Node]) -> SingBoxConfig {
    let mut names = policy::name_registry();
    let mut proxies = Vec::with_capacity(nodes.len());

    for node in nodes {
        let tag = names.claim(&node.name);
        match to_outbound(node, &tag) {
            Some(outbound) => proxies.push(outbound),
            None => debug!("Skipping {} node '{}' for sing-box", node.protocol(), node.name),
        }
    }

    let proxy_tags: Vec<String> = proxies.iter().map(|o| o.tag().to_string()).collect();
    let policy = Policy::build(&proxy_tags);

    SingBoxConfig::builder()
        .log(Log::with_level(LogLevel::Info))
        .dns(dns())
        .inbound(Inbound::Tun(TunInbound::auto_route("tun-in")))
        .inbound(Inbound::Mixed(MixedInbound {
            tag: "mixed-in".to_string(),
            listen: ListenFields::loopback(MIXED_PORT),
            set_system_proxy: false,
        }))
        .outbounds(policy.groups.iter().map(group_outbound))
        .outbounds(proxies)
        .outbound(Outbound::direct(policy::DIRECT))
        .outbound(Outbound::block(policy::REJECT))
        .outbound(Outbound::dns(DNS_OUT_TAG))
        .route(route(&policy))
        .experimental(Experimental::with_dashboard())
        .build()
}

// ============================================================================
// Scaffolding
// ============================================================================

fn group_outbound(group: &PolicyGroup) -> Outbound {
    match group.kind {
        GroupKind::Select => Outbound::Selector(SelectorOutbound {
            tag: group.name.clone(),
            outbounds: group.members.clone(),
            default: group.members.first().cloned(),
            interrupt_exist_connections: true,
        }),
        GroupKind::UrlTest => Outbound::UrlTest(UrlTestOutbound {
            tag: group.name.clone(),
            outbounds: group.members.clone(),
            url: Some(policy::TEST_URL.to_string()),
            interval: Some(format!("{}s", policy::TEST_INTERVAL_SECS)),
            tolerance: policy::TEST_TOLERANCE_MS,
        }),
    }
}

fn dns() -> Dns {
    Dns {
        servers: vec![
            DnsServer::Https(
                RemoteDnsServer::new(DNS_REMOTE, "1.1.1.1").with_detour(policy::PROXY_GROUP),
            ),
            DnsServer::Local(LocalDnsServer {
                tag: DNS_LOCAL.to_string(),
            }),
        ],
        rules: vec![
            DnsRule::clash_mode("Direct", DNS_LOCAL),
            DnsRule::clash_mode("Global", DNS_REMOTE),
            DnsRule::rule_set(vec!["geosite-cn".to_string()], DNS_LOCAL),
        ],
        r#final: Some(DNS_REMOTE.to_string()),
        strategy: Some(DomainStrategy::PreferIpv4),
    }
}

fn route(policy: &Policy) -> Route {
    let mut route = Route::new()
        .with_auto_detect_interface()
        .with_final(policy.final_target.clone())
        .add_rule(RouteRule::new().with_action(RuleAction::Sniff))
        .add_rule(
            RouteRule::new()
                .match_protocol(vec!["dns".to_string()])
                .with_action(RuleAction::HijackDns),
        )
        .add_rule(RouteRule::new().match_private_ip().with_outbound(policy::DIRECT))
        .add_rule(RouteRule::new().match_clash_mode("Direct").with_outbound(policy::DIRECT))
        .add_rule(
            RouteRule::new()
                .match_clash_mode("Global")
                .with_outbound(policy::PROXY_GROUP),
        );

    for rule in &policy.rules {
        let mut tags = vec![rule.source.geosite_tag()];
        tags.extend(rule.source.geoip_tag());
        route = route.add_rule(RouteRule::new().match_rule_set(tags).with_outbound(rule.target.clone()));
    }

    for source in policy.sources() {
        route = route.add_rule_set(RuleSet::Remote(RemoteRuleSet::binary(
            source.geosite_tag(),
            source.singbox_geosite_url(),
            policy::PROXY_GROUP,
        )));
        if let (Some(tag), Some(url)) = (source.geoip_tag(), source.singbox_geoip_url()) {
            route = route.add_rule_set(RuleSet::Remote(RemoteRuleSet::binary(
                tag,
                url,
                policy::PROXY_GROUP,
            )));
        }
    }

    route
}

// ============================================================================
// Node Conversion
// ============================================================================

/// Maps a node to its outbound; `None` when sing-box has no equivalent
pub fn to_outbound(node: &Node, tag: &str) -> Option<Outbound> {
    let tag = tag.to_string();
    let server = node.endpoint.host.clone();
    let server_port = node.endpoint.port;

    let outbound = match &node.credential {
        Credential::Shadowsocks(c) => {
            let (plugin, plugin_opts) = match &c.plugin {
                Some(p) if p.is_obfs() || p.is_v2ray() => {
                    (Some(p.name.clone()), Some(p.opts_string()).filter(|o| !o.is_empty()))
                }
                Some(p) => {
                    debug!("sing-box does not support the {} plugin", p.name);
                    return None;
                }
                None => (None, None),
            };
            Outbound::Shadowsocks(ShadowsocksOutbound {
                tag,
                server,
                server_port,
                method: c.cipher.clone(),
                password: c.password.clone(),
                plugin,
                plugin_opts,
            })
        }
        Credential::ShadowsocksR(c) => Outbound::ShadowsocksR(ShadowsocksROutbound {
            tag,
            server,
            server_port,
            method: c.cipher.clone(),
            password: c.password.clone(),
            obfs: c.obfs.clone(),
            obfs_param: c.obfs_param.clone(),
            protocol: c.protocol.clone(),
            protocol_param: c.protocol_param.clone(),
        }),
        Credential::Vmess(c) => Outbound::VMess(VMessOutbound {
            tag,
            server,
            server_port,
            uuid: c.uuid.clone(),
            security: Some(c.cipher.clone()),
            alter_id: c.alter_id,
            tls: node.tls().map(tls_config),
            packet_encoding: packet_encoding(node),
            transport: transport(&node.transport)?,
        }),
        Credential::Vless(c) => Outbound::VLess(VLessOutbound {
            tag,
            server,
            server_port,
            uuid: c.uuid.clone(),
            flow: c.flow.clone().filter(|f| !f.is_empty()),
            tls: node.tls().map(tls_config),
            packet_encoding: packet_encoding(node),
            transport: transport(&node.transport)?,
        }),
        Credential::Trojan(c) => Outbound::Trojan(TrojanOutbound {
            tag,
            server,
            server_port,
            password: c.password.clone(),
            tls: Some(forced_tls(node)),
            transport: transport(&node.transport)?,
        }),
        Credential::Hysteria(c) => Outbound::Hysteria(HysteriaOutbound {
            tag,
            server,
            server_port,
            up_mbps: c.up_mbps,
            down_mbps: c.down_mbps,
            obfs: c.obfs.clone(),
            auth_str: c.auth.clone(),
            tls: Some(forced_tls(node)),
        }),
        Credential::Hysteria2(c) => Outbound::Hysteria2(Hysteria2Outbound {
            tag,
            server,
            server_port,
            up_mbps: c.up_mbps,
            down_mbps: c.down_mbps,
            obfs: c.obfs.as_ref().map(|kind| Hysteria2Obfs {
                obfs_type: Some(kind.clone()),
                password: c.obfs_password.clone(),
            }),
            password: c.password.clone(),
            tls: Some(forced_tls(node)),
        }),
        Credential::Tuic(c) => Outbound::Tuic(TuicOutbound {
            tag,
            server,
            server_port,
            uuid: c.uuid.clone(),
            password: Some(c.password.clone()).filter(|p| !p.is_empty()),
            congestion_control: c.congestion_control.clone(),
            udp_relay_mode: c.udp_relay_mode.clone(),
            tls: Some(forced_tls(node)),
        }),
        Credential::AnyTls(c) => Outbound::AnyTls(AnyTlsOutbound {
            tag,
            server,
            server_port,
            password: c.password.clone(),
            idle_session_timeout: node.extra_str("idle_timeout").map(duration_secs),
            tls: Some(forced_tls(node)),
        }),
        Credential::Socks5(c) => Outbound::Socks(SocksOutbound {
            tag,
            server,
            server_port,
            version: Some("5".to_string()),
            username: c.username.clone(),
            password: c.password.clone(),
        }),
        Credential::Unknown(_) => return None,
    };

    Some(outbound)
}

/// `30` becomes `30s`; values with a unit pass through
fn duration_secs(raw: &str) -> String {
    if raw.chars().all(|c| c.is_ascii_digit()) {
        format!("{}s", raw)
    } else {
        raw.to_string()
    }
}

fn packet_encoding(node: &Node) -> Option<String> {
    node.extra_str("packetEncoding")
        .or_else(|| node.extra_str("packet-encoding"))
        .map(str::to_string)
}

fn tls_config(tls: &TlsOpts) -> OutboundTlsConfig {
    let fingerprint = tls
        .fingerprint
        .clone()
        .or_else(|| tls.reality.as_ref().map(|_| DEFAULT_FINGERPRINT.to_string()));

    OutboundTlsConfig {
        enabled: true,
        server_name: tls.sni.clone(),
        insecure: tls.insecure,
        alpn: tls.alpn.clone(),
        utls: fingerprint.map(|fp| UtlsConfig {
            enabled: true,
            fingerprint: Some(fp),
        }),
        reality: tls.reality.as_ref().map(|r| OutboundRealityConfig {
            enabled: true,
            public_key: Some(r.public_key.clone()),
            short_id: Some(r.short_id.clone()).filter(|s| !s.is_empty()),
        }),
    }
}

/// TLS for protocols that cannot run without it (QUIC based, trojan, anytls)
fn forced_tls(node: &Node) -> OutboundTlsConfig {
    match node.tls() {
        Some(tls) => tls_config(tls),
        None => tls_config(&TlsOpts::enabled()),
    }
}

/// `Some(None)` is plain TCP; `None` means the network has no sing-box transport
fn transport(transport: &Transport) -> Option<Option<V2RayTransport>> {
    let mapped = match transport.network {
        Network::Tcp => None,
        Network::Ws => {
            let (path, max_early_data) = split_early_data(transport.path.as_deref());
            let headers = transport
                .host
                .iter()
                .map(|h| ("Host".to_string(), h.clone()))
                .collect::<HashMap<_, _>>();
            Some(V2RayTransport::WebSocket(WebSocketTransport {
                path,
                headers,
                max_early_data,
                early_data_header_name: (max_early_data > 0).then(|| EARLY_DATA_HEADER.to_string()),
            }))
        }
        Network::Grpc => Some(V2RayTransport::Grpc(GrpcTransport {
            service_name: transport.service_name.clone(),
        })),
        Network::H2 => Some(V2RayTransport::Http(HttpTransport {
            host: transport.host.iter().cloned().collect(),
            path: transport.path.clone(),
        })),
        Network::Quic => Some(V2RayTransport::Quic(QuicTransport::default())),
        Network::Kcp => return None,
    };
    Some(mapped)
}

/// Splits `/path?ed=2048` into the path and the early data size
fn split_early_data(path: Option<&str>) -> (Option<String>, u32) {
    let Some(path) = path else {
        return (None, 0);
    };
    if let Some((base, query)) = path.split_once('?') {
        for pair in query.split('&') {
            if let Some(size) = pair.strip_prefix("ed=").and_then(|v| v.parse().ok()) {
                return (Some(base.to_string()), size);
            }
        }
    }
    (Some(path.to_string()), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Endpoint, ShadowsocksRCredential};
    use crate::parser::decode_uri;
    use crate::parser::protocols::shadowsocks::Sip002Plugin;

    fn outbound(uri: &str) -> Option<serde_json::Value> {
        let node = decode_uri(uri).unwrap();
        to_outbound(&node, &node.name).map(|o| serde_json::to_value(o).unwrap())
    }

    #[test]
    fn test_protocol_tags() {
        let ss = outbound("ss://YWVzLTI1Ni1nY206cA@c.com:8388#SS").unwrap();
        assert_eq!(ss["type"], "shadowsocks");
        assert_eq!(ss["method"], "aes-256-gcm");

        let socks = outbound("socks5://u:p@d.com:1080#S").unwrap();
        assert_eq!(socks["type"], "socks");
        assert_eq!(socks["version"], "5");

        assert!(outbound("wireguard://k@e.com:51820#W").is_none());
    }

    #[test]
    fn test_shadowsocksr_outbound() {
        let ssr = Node::new(
            "R",
            Endpoint::new("a.com", 443),
            Credential::ShadowsocksR(ShadowsocksRCredential {
                cipher: "aes-256-cfb".to_string(),
                password: "pw".to_string(),
                protocol: "auth_aes128_md5".to_string(),
                protocol_param: None,
                obfs: "tls1.2_ticket_auth".to_string(),
                obfs_param: Some("b.com".to_string()),
            }),
        );
        let json = serde_json::to_value(to_outbound(&ssr, "R").unwrap()).unwrap();
        assert_eq!(json["type"], "shadowsocksr");
        assert_eq!(json["protocol"], "auth_aes128_md5");
        assert_eq!(json["obfs_param"], "b.com");
    }

    #[test]
    fn test_vless_reality() {
        let json = outbound(
            "vless://1111@a.com:443?encryption=none&security=reality&pbk=KEY&sid=ab12&sni=s.com&fp=chrome&flow=xtls-rprx-vision#R",
        )
        .unwrap();
        assert_eq!(json["type"], "vless");
        assert_eq!(json["flow"], "xtls-rprx-vision");
        assert_eq!(json["tls"]["server_name"], "s.com");
        assert_eq!(json["tls"]["reality"]["public_key"], "KEY");
        assert_eq!(json["tls"]["reality"]["short_id"], "ab12");
        assert_eq!(json["tls"]["utls"]["fingerprint"], "chrome");
    }

    #[test]
    fn test_ws_transport_with_early_data() {
        let json = outbound("vless://1111@a.com:443?type=ws&path=%2Fws%3Fed%3D2048&host=h.com&security=tls#W").unwrap();
        assert_eq!(json["transport"]["type"], "ws");
        assert_eq!(json["transport"]["path"], "/ws");
        assert_eq!(json["transport"]["max_early_data"], 2048);
        assert_eq!(json["transport"]["early_data_header_name"], EARLY_DATA_HEADER);
        assert_eq!(json["transport"]["headers"]["Host"], "h.com");
    }

    #[test]
    fn test_trojan_defaults_to_tls() {
        let json = outbound("trojan://pw@a.com:443#T").unwrap();
        assert_eq!(json["tls"]["enabled"], true);
    }

    #[test]
    fn test_hysteria2_obfs() {
        let json = outbound("hysteria2://pw@a.com:443?obfs=salamander&obfs-password=o&sni=s.com#H").unwrap();
        assert_eq!(json["type"], "hysteria2");
        assert_eq!(json["obfs"]["type"], "salamander");
        assert_eq!(json["obfs"]["password"], "o");
        assert_eq!(json["tls"]["enabled"], true);
    }

    #[test]
    fn test_unsupported_plugin_is_skipped() {
        let mut node = decode_uri("ss://YWVzLTI1Ni1nY206cA@c.com:8388#SS").unwrap();
        if let Credential::Shadowsocks(c) = &mut node.credential {
            c.plugin = Some(Sip002Plugin::new("kcptun"));
        }
        assert!(to_outbound(&node, "SS").is_none());
    }

    #[test]
    fn test_document_structure() {
        let nodes = vec![
            decode_uri("trojan://pw@a.com:443#HK").unwrap(),
            decode_uri("trojan://pw@b.com:443#HK").unwrap(),
        ];
        let json: serde_json::Value =
            serde_json::from_str(&SingBoxEmitter.emit(&nodes, "t").unwrap()).unwrap();

        for key in ["log", "dns", "route", "inbounds", "outbounds", "experimental"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }

        let tags: Vec<&str> = json["outbounds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["tag"].as_str().unwrap())
            .collect();
        assert!(tags.contains(&"HK"));
        assert!(tags.contains(&"HK 2"));
        assert!(tags.contains(&policy::DIRECT));
        assert!(tags.contains(&DNS_OUT_TAG));

        // Every selector member names an existing outbound
        for outbound in json["outbounds"].as_array().unwrap() {
            if let Some(members) = outbound["outbounds"].as_array() {
                for member in members {
                    assert!(tags.contains(&member.as_str().unwrap()));
                }
            }
        }

        assert_eq!(json["route"]["final"], policy::FINAL_GROUP);
        assert_eq!(json["route"]["rule_set"][0]["format"], "binary");
    }

    #[test]
    fn test_empty_document() {
        let config = build_config(&[]);
        assert!(config.has_outbound(policy::PROXY_GROUP));
        assert!(!config.has_outbound(policy::AUTO_GROUP));
    }

    #[test]
    fn test_split_early_data() {
        assert_eq!(split_early_data(Some("/p?ed=1024")), (Some("/p".to_string()), 1024));
        assert_eq!(split_early_data(Some("/p")), (Some("/p".to_string()), 0));
        assert_eq!(split_early_data(None), (None, 0));
    }
}
