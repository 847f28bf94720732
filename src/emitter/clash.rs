//! Clash-Meta (mihomo) YAML emitter

use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::node::Node;
use crate::parser::node_to_structured;
use crate::parser::structured::{is_aliased_key, resolve_aliases};

use super::policy::{self, GroupKind, Policy, PolicyGroup, RuleSource};
use super::{EmitError, Emitter};

const MIXED_PORT: u16 = 7890;
const SOCKS_PORT: u16 = 7891;

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClashDocument {
    port: u16,
    socks_port: u16,
    allow_lan: bool,
    mode: &'static str,
    log_level: &'static str,
    dns: ClashDns,
    proxies: Vec<Mapping>,
    proxy_groups: Vec<ClashGroup>,
    rule_providers: BTreeMap<String, RuleProvider>,
    rules: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClashDns {
    enable: bool,
    ipv6: bool,
    enhanced_mode: &'static str,
    fake_ip_range: &'static str,
    default_nameserver: Vec<&'static str>,
    nameserver: Vec<&'static str>,
    proxy_server_nameserver: Vec<&'static str>,
}

impl Default for ClashDns {
    fn default() -> Self {
        Self {
            enable: true,
            ipv6: false,
            enhanced_mode: "fake-ip",
            fake_ip_range: "198.18.0.1/16",
            default_nameserver: vec!["223.5.5.5", "119.29.29.29"],
            nameserver: vec!["https://doh.pub/dns-query", "https://dns.alidns.com/dns-query"],
            proxy_server_nameserver: vec!["https://doh.pub/dns-query"],
        }
    }
}

#[derive(Debug, Serialize)]
struct ClashGroup {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    proxies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tolerance: Option<u32>,
}

impl From<&PolicyGroup> for ClashGroup {
    fn from(group: &PolicyGroup) -> Self {
        let test = group.kind == GroupKind::UrlTest;
        Self {
            name: group.name.clone(),
            kind: match group.kind {
                GroupKind::Select => "select",
                GroupKind::UrlTest => "url-test",
            },
            proxies: group.members.clone(),
            url: test.then_some(policy::TEST_URL),
            interval: test.then_some(policy::TEST_INTERVAL_SECS),
            tolerance: test.then_some(policy::TEST_TOLERANCE_MS),
        }
    }
}

#[derive(Debug, Serialize)]
struct RuleProvider {
    #[serde(rename = "type")]
    kind: &'static str,
    behavior: &'static str,
    format: &'static str,
    url: String,
    path: String,
    interval: u32,
}

impl RuleProvider {
    fn mrs(tag: &str, behavior: &'static str, url: String) -> Self {
        Self {
            kind: "http",
            behavior,
            format: "mrs",
            url,
            path: format!("./ruleset/{}.mrs", tag),
            interval: 86400,
        }
    }
}

/// Emits a mihomo configuration
///
/// Nodes decoded from a `proxies:` entry keep the keys of their original
/// map that the codecs do not model; modelled keys, `type` and the name are
/// always written in canonical form.
pub struct ClashEmitter;

impl ClashEmitter {
    fn proxy_map(node: &Node) -> Option<Mapping> {
        let mut map = node_to_structured(node)?;
        if let Some(origin) = &node.origin {
            for (key, value) in resolve_aliases(origin) {
                if map.contains_key(&key) || key.as_str().is_some_and(is_aliased_key) {
                    continue;
                }
                map.insert(key, value);
            }
        }
        Some(map)
    }
}

impl Emitter for ClashEmitter {
    fn emit(&self, nodes: &[Node], _label: &str) -> Result<String, EmitError> {
        let mut names = policy::name_registry();
        let mut proxies = Vec::with_capacity(nodes.len());
        let mut proxy_names = Vec::with_capacity(nodes.len());

        for node in nodes {
            let Some(mut map) = Self::proxy_map(node) else {
                debug!("Skipping {} node '{}' for Clash", node.protocol(), node.name);
                continue;
            };
            let name = names.claim(&node.name);
            map.insert(Value::String("name".to_string()), Value::String(name.clone()));
            proxies.push(map);
            proxy_names.push(name);
        }

        let policy = Policy::build(&proxy_names);

        let mut rule_providers = BTreeMap::new();
        for source in policy.sources() {
            insert_providers(&mut rule_providers, &source);
        }

        let document = ClashDocument {
            port: MIXED_PORT,
            socks_port: SOCKS_PORT,
            allow_lan: false,
            mode: "rule",
            log_level: "info",
            dns: ClashDns::default(),
            proxies,
            proxy_groups: policy.groups.iter().map(ClashGroup::from).collect(),
            rule_providers,
            rules: rules(&policy),
        };

        Ok(serde_yaml::to_string(&document)?)
    }
}

fn insert_providers(providers: &mut BTreeMap<String, RuleProvider>, source: &RuleSource) {
    let tag = source.geosite_tag();
    providers.insert(
        tag.clone(),
        RuleProvider::mrs(&tag, "domain", source.clash_geosite_url()),
    );
    if let (Some(tag), Some(url)) = (source.geoip_tag(), source.clash_geoip_url()) {
        providers.insert(tag.clone(), RuleProvider::mrs(&tag, "ipcidr", url));
    }
}

fn rules(policy: &Policy) -> Vec<String> {
    let mut rules = Vec::new();
    for rule in &policy.rules {
        rules.push(format!("RULE-SET,{},{}", rule.source.geosite_tag(), rule.target));
        if let Some(tag) = rule.source.geoip_tag() {
            rules.push(format!("RULE-SET,{},{},no-resolve", tag, rule.target));
        }
    }
    rules.push(format!("MATCH,{}", policy.final_target));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::policy::{AUTO_GROUP, DIRECT, PROXY_GROUP};
    use crate::parser::{decode_uri, structured::parse_structured};

    fn emit_value(nodes: &[Node]) -> serde_yaml::Value {
        let yaml = ClashEmitter.emit(nodes, "test").unwrap();
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn group_names(doc: &serde_yaml::Value) -> Vec<String> {
        doc["proxy-groups"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|g| g["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_empty_document_falls_back_to_direct() {
        let doc = emit_value(&[]);
        assert!(doc["proxies"].as_sequence().unwrap().is_empty());

        let groups = group_names(&doc);
        assert!(!groups.contains(&AUTO_GROUP.to_string()));
        for group in doc["proxy-groups"].as_sequence().unwrap() {
            let members = group["proxies"].as_sequence().unwrap();
            assert!(!members.is_empty());
            for member in members {
                let member = member.as_str().unwrap();
                assert!(member == DIRECT || groups.iter().any(|g| g == member));
            }
        }
        let rules = doc["rules"].as_sequence().unwrap();
        assert!(rules.last().unwrap().as_str().unwrap().starts_with("MATCH,"));
    }

    #[test]
    fn test_top_level_keys() {
        let doc = emit_value(&[]);
        for key in ["port", "socks-port", "dns", "proxies", "proxy-groups", "rule-providers", "rules"] {
            assert!(doc.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(doc["rule-providers"]["geosite-telegram"]["format"], "mrs");
        assert_eq!(doc["rule-providers"]["geoip-cn"]["behavior"], "ipcidr");
    }

    #[test]
    fn test_proxies_and_duplicate_names() {
        let nodes = vec![
            decode_uri("vless://1111@a.com:443?security=reality&pbk=KEY&sid=ab12&sni=s.com#HK").unwrap(),
            decode_uri("trojan://pw@b.com:443#HK").unwrap(),
            decode_uri("wireguard://key@c.com:51820#WG").unwrap(),
        ];
        let doc = emit_value(&nodes);
        let proxies = doc["proxies"].as_sequence().unwrap();
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0]["name"], "HK");
        assert_eq!(proxies[0]["reality-opts"]["public-key"], "KEY");
        assert_eq!(proxies[1]["name"], "HK 2");
        assert_eq!(proxies[1]["type"], "trojan");

        let main = &doc["proxy-groups"][0];
        assert_eq!(main["name"], PROXY_GROUP);
        let members: Vec<&str> = main["proxies"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|m| m.as_str().unwrap())
            .collect();
        assert_eq!(members, vec![AUTO_GROUP, "HK", "HK 2", DIRECT]);
        assert_eq!(doc["proxy-groups"][1]["type"], "url-test");
    }

    #[test]
    fn test_origin_map_is_reused() {
        let content = "proxies:\n  - {name: t, type: trojan, server: a.com, port: 443, password: pw, custom-key: kept}\n";
        let mut nodes = parse_structured(content).unwrap();
        nodes[0].name = "S - t".to_string();

        let doc = emit_value(&nodes);
        let proxy = &doc["proxies"][0];
        assert_eq!(proxy["name"], "S - t");
        assert_eq!(proxy["custom-key"], "kept");
    }

    #[test]
    fn test_origin_synonyms_are_canonical() {
        let content = "\
proxies:
  - {name: v, type: vmess, server: a.com, port: 443, id: 8b1a9953-c461-4ed3-8d3a-5b9f1c2f9d11, aid: 0, cipher: auto, tls: true, servername: s.com}
  - {name: h, type: hy2, server: b.com, port: 443, password: pw, skipCertVerify: true}
";
        let nodes = parse_structured(content).unwrap();
        assert_eq!(nodes.len(), 2);

        let doc = emit_value(&nodes);
        let vmess = &doc["proxies"][0];
        assert_eq!(vmess["uuid"], "8b1a9953-c461-4ed3-8d3a-5b9f1c2f9d11");
        assert!(vmess.get("id").is_none());
        assert!(vmess.get("aid").is_none());
        assert_eq!(vmess["servername"], "s.com");

        let hy2 = &doc["proxies"][1];
        assert_eq!(hy2["type"], "hysteria2");
        assert!(hy2.get("skipCertVerify").is_none());
        assert_eq!(hy2["skip-cert-verify"], true);
    }

    #[test]
    fn test_emit_does_not_mutate_nodes() {
        let nodes = vec![
            decode_uri("trojan://pw@b.com:443#X").unwrap(),
            decode_uri("trojan://pw@c.com:443#X").unwrap(),
        ];
        ClashEmitter.emit(&nodes, "test").unwrap();
        assert_eq!(nodes[1].name, "X");
    }
}
