//! Structured (Clash-style) configuration documents
//!
//! A structured document carries a `proxies:` list of field maps and/or a
//! `nodes:` list of already-normalized entries. Proxy maps go through an
//! explicit alias-resolution step into [`StructuredProxy`] before they reach
//! the per-protocol codecs, so the codecs only ever see canonical keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::node::{
    Endpoint, Extras, Network, Node, RealityOpts, TlsOpts, Transport, display_name, split_alpn,
};

use super::error::{ParseError, ParseResult};
use super::protocols::{decode_uri, node_from_structured, unbracket};

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct StructuredDocument {
    #[serde(default)]
    proxies: Option<Vec<Value>>,
    #[serde(default)]
    nodes: Option<Vec<Value>>,
}

/// Parses a structured document into nodes
///
/// Entries that fail to decode are logged and skipped.
pub fn parse_structured(content: &str) -> ParseResult<Vec<Node>> {
    let doc: StructuredDocument = serde_yaml::from_str(content)?;
    let proxies = doc.proxies.unwrap_or_default();
    let entries = doc.nodes.unwrap_or_default();

    if proxies.is_empty() && entries.is_empty() {
        return Err(ParseError::Unsupported(
            "structured document has no proxies or nodes".to_string(),
        ));
    }

    debug!(
        "Structured document with {} proxies and {} node entries",
        proxies.len(),
        entries.len()
    );

    let mut nodes = Vec::new();
    for entry in proxies {
        match proxy_entry(entry) {
            Ok(Some(node)) => nodes.push(node),
            Ok(None) => {}
            Err(e) => debug!("Skipping proxy entry: {}", e),
        }
    }
    for entry in entries {
        match node_entry(entry) {
            Ok(node) => nodes.push(node),
            Err(e) => debug!("Skipping node entry: {}", e),
        }
    }

    Ok(nodes)
}

fn proxy_entry(entry: Value) -> ParseResult<Option<Node>> {
    match entry {
        Value::Mapping(map) => {
            let proxy = StructuredProxy::from_mapping(map)?;
            let node = node_from_structured(&proxy);
            if node.is_none() {
                debug!(
                    "Structured proxy '{}' of type '{}' was not converted",
                    proxy.display_name(),
                    proxy.kind
                );
            }
            Ok(node)
        }
        Value::String(uri) => decode_uri(&uri).map(Some),
        other => Err(ParseError::Unsupported(format!(
            "proxy entry is not a map: {:?}",
            other
        ))),
    }
}

/// A `nodes:` entry: a share URI, a map with a `url` key, or a serialized node
fn node_entry(entry: Value) -> ParseResult<Node> {
    match entry {
        Value::String(uri) => decode_uri(&uri),
        Value::Mapping(map) => {
            if let Some(Value::String(url)) = map.get("url") {
                return decode_uri(url);
            }
            let node: Node = serde_yaml::from_value(Value::Mapping(map))?;
            Ok(node)
        }
        other => Err(ParseError::Unsupported(format!(
            "node entry is neither a URI nor a map: {:?}",
            other
        ))),
    }
}

// ============================================================================
// Alias Resolution
// ============================================================================

/// Field-name synonyms seen in the wild, mapped to their canonical key
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("id", "uuid"),
    ("servername", "sni"),
    ("server-name", "sni"),
    ("peer", "sni"),
    ("skipCertVerify", "skip-cert-verify"),
    ("skip_cert_verify", "skip-cert-verify"),
    ("allow-insecure", "skip-cert-verify"),
    ("allowInsecure", "skip-cert-verify"),
    ("insecure", "skip-cert-verify"),
    ("alter-id", "alterId"),
    ("alter_id", "alterId"),
    ("aid", "alterId"),
    ("method", "cipher"),
    ("fp", "client-fingerprint"),
    ("protocolparam", "protocol-param"),
    ("protocol_param", "protocol-param"),
    ("obfsparam", "obfs-param"),
    ("obfs_param", "obfs-param"),
    ("obfs_password", "obfs-password"),
    ("obfsPassword", "obfs-password"),
    ("auth_str", "auth-str"),
    ("auth", "auth-str"),
    ("congestion_control", "congestion-controller"),
    ("congestion-control", "congestion-controller"),
    ("udp_relay_mode", "udp-relay-mode"),
    ("user", "username"),
];

/// Whether `key` is one of the aliased fields, under any spelling
pub fn is_aliased_key(key: &str) -> bool {
    FIELD_ALIASES
        .iter()
        .any(|(alias, canonical)| *alias == key || *canonical == key)
}

/// Rewrites alias keys to their canonical names
///
/// When both an alias and its canonical key are present the canonical value
/// wins and the alias is dropped.
pub fn resolve_aliases(raw: &Mapping) -> Mapping {
    let mut resolved = Mapping::with_capacity(raw.len());

    for (key, value) in raw {
        let canonical = key
            .as_str()
            .and_then(|k| FIELD_ALIASES.iter().find(|(alias, _)| *alias == k))
            .map(|(_, canonical)| *canonical);

        match canonical {
            Some(canonical) => {
                if raw.contains_key(canonical) || resolved.contains_key(canonical) {
                    trace!("Dropping alias {:?} shadowed by '{}'", key, canonical);
                    continue;
                }
                resolved.insert(Value::String(canonical.to_string()), value.clone());
            }
            None => {
                resolved.insert(key.clone(), value.clone());
            }
        }
    }

    resolved
}

// ============================================================================
// Structured Proxy
// ============================================================================

/// Alias-resolved, strongly typed view of one structured proxy map
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StructuredProxy {
    #[serde(deserialize_with = "deserialize_option_string")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub server: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,

    #[serde(deserialize_with = "deserialize_option_string")]
    pub uuid: Option<String>,
    #[serde(deserialize_with = "deserialize_option_string")]
    pub password: Option<String>,
    #[serde(deserialize_with = "deserialize_option_string")]
    pub username: Option<String>,
    pub cipher: Option<String>,
    #[serde(rename = "alterId", deserialize_with = "deserialize_option_u32")]
    pub alter_id: Option<u32>,
    pub flow: Option<String>,

    pub network: Option<String>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub tls: bool,
    pub sni: Option<String>,
    #[serde(rename = "skip-cert-verify", deserialize_with = "deserialize_flag")]
    pub skip_cert_verify: bool,
    #[serde(deserialize_with = "deserialize_string_list")]
    pub alpn: Vec<String>,
    #[serde(rename = "client-fingerprint")]
    pub client_fingerprint: Option<String>,

    #[serde(rename = "ws-opts")]
    pub ws_opts: Option<WsOpts>,
    #[serde(rename = "ws-path")]
    pub ws_path: Option<String>,
    #[serde(rename = "ws-headers")]
    pub ws_headers: Option<BTreeMap<String, String>>,
    #[serde(rename = "grpc-opts")]
    pub grpc_opts: Option<GrpcOpts>,
    #[serde(rename = "h2-opts")]
    pub h2_opts: Option<H2Opts>,
    #[serde(rename = "reality-opts")]
    pub reality_opts: Option<RealityMap>,

    pub plugin: Option<String>,
    #[serde(rename = "plugin-opts")]
    pub plugin_opts: Option<Mapping>,

    pub protocol: Option<String>,
    #[serde(rename = "protocol-param", deserialize_with = "deserialize_option_string")]
    pub protocol_param: Option<String>,
    pub obfs: Option<String>,
    #[serde(rename = "obfs-param", deserialize_with = "deserialize_option_string")]
    pub obfs_param: Option<String>,
    #[serde(rename = "obfs-password", deserialize_with = "deserialize_option_string")]
    pub obfs_password: Option<String>,

    #[serde(rename = "auth-str", deserialize_with = "deserialize_option_string")]
    pub auth_str: Option<String>,
    #[serde(deserialize_with = "deserialize_mbps")]
    pub up: Option<u32>,
    #[serde(deserialize_with = "deserialize_mbps")]
    pub down: Option<u32>,

    #[serde(rename = "congestion-controller")]
    pub congestion_controller: Option<String>,
    #[serde(rename = "udp-relay-mode")]
    pub udp_relay_mode: Option<String>,

    /// Keys no field claims; carried into node extras
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,

    /// The map as it appeared in the document
    #[serde(skip)]
    pub raw: Mapping,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WsOpts {
    pub path: Option<String>,
    #[serde(deserialize_with = "deserialize_headers")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GrpcOpts {
    #[serde(rename = "grpc-service-name")]
    pub grpc_service_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct H2Opts {
    #[serde(deserialize_with = "deserialize_string_list")]
    pub host: Vec<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RealityMap {
    #[serde(rename = "public-key", deserialize_with = "deserialize_option_string")]
    pub public_key: Option<String>,
    #[serde(rename = "short-id", deserialize_with = "deserialize_option_string")]
    pub short_id: Option<String>,
    #[serde(rename = "spider-x", deserialize_with = "deserialize_option_string")]
    pub spider_x: Option<String>,
}

impl StructuredProxy {
    /// Resolves aliases and deserializes the typed view
    pub fn from_mapping(raw: Mapping) -> ParseResult<Self> {
        let resolved = resolve_aliases(&raw);
        let mut proxy: StructuredProxy = serde_yaml::from_value(Value::Mapping(resolved))?;
        proxy.raw = raw;
        Ok(proxy)
    }

    pub fn display_name(&self) -> String {
        display_name(self.name.clone(), unbracket(&self.server))
    }

    /// Server endpoint; absent when host or port is missing
    pub fn endpoint(&self) -> Option<Endpoint> {
        let host = unbracket(self.server.trim());
        if host.is_empty() || self.port == 0 {
            debug!("Structured proxy '{}' has no usable server", self.kind);
            return None;
        }
        Some(Endpoint::new(host, self.port))
    }

    /// Transport from `network` and the matching `*-opts` map
    pub fn transport(&self) -> Transport {
        let network = self
            .network
            .as_deref()
            .and_then(Network::parse)
            .unwrap_or_default();

        let mut transport = Transport {
            network,
            ..Default::default()
        };

        match network {
            Network::Ws => {
                let opts = self.ws_opts.clone().unwrap_or_default();
                transport.path = opts.path.or_else(|| self.ws_path.clone());
                transport.host = header_host(&opts.headers)
                    .or_else(|| self.ws_headers.as_ref().and_then(header_host));
            }
            Network::Grpc => {
                transport.service_name = self
                    .grpc_opts
                    .as_ref()
                    .and_then(|o| o.grpc_service_name.clone());
            }
            Network::H2 => {
                if let Some(opts) = &self.h2_opts {
                    transport.path = opts.path.clone();
                    transport.host = opts.host.first().cloned();
                }
            }
            Network::Tcp | Network::Quic | Network::Kcp => {}
        }

        transport
    }

    /// TLS options; `always_on` for protocols that cannot run without TLS
    pub fn tls_opts(&self, always_on: bool) -> Option<TlsOpts> {
        let reality = self.reality_opts.as_ref().map(|r| RealityOpts {
            public_key: r.public_key.clone().unwrap_or_default(),
            short_id: r.short_id.clone().unwrap_or_default(),
            spider_x: r.spider_x.clone(),
        });

        if !(always_on || self.tls || reality.is_some()) {
            return None;
        }

        Some(TlsOpts {
            enabled: true,
            sni: self.sni.clone().filter(|s| !s.is_empty()),
            alpn: self.alpn.clone(),
            fingerprint: self.client_fingerprint.clone().filter(|s| !s.is_empty()),
            insecure: self.skip_cert_verify,
            reality,
        })
    }

    /// Unclaimed keys as node extras
    pub fn extras(&self) -> Extras {
        self.unknown
            .iter()
            .filter_map(|(key, value)| {
                serde_json::to_value(value)
                    .ok()
                    .map(|json| (key.clone(), json))
            })
            .collect()
    }
}

fn header_host(headers: &BTreeMap<String, String>) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("host"))
        .map(|(_, v)| v.clone())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Proxy Map Builder
// ============================================================================

/// Builds a Clash-style proxy map with keys in a stable order
#[derive(Debug, Default)]
pub struct ProxyMap {
    map: Mapping,
}

impl ProxyMap {
    /// Starts a map with `name`, `type`, `server` and `port`
    pub fn new(node: &Node, kind: &str) -> Self {
        let mut map = Self::default();
        map.insert("name", node.name.as_str())
            .insert("type", kind)
            .insert("server", node.endpoint.host.as_str())
            .insert("port", node.endpoint.port);
        map
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.map.insert(Value::String(key.to_string()), value.into());
        self
    }

    pub fn insert_opt<V: Into<Value>>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.insert(key, value);
        }
        self
    }

    /// Writes `key: true` only when `enabled`
    pub fn insert_flag(&mut self, key: &str, enabled: bool) -> &mut Self {
        if enabled {
            self.insert(key, true);
        }
        self
    }

    /// Writes SNI (under `sni_key`), ALPN, fingerprint, insecure and Reality keys
    pub fn insert_tls(&mut self, tls: Option<&TlsOpts>, sni_key: &str) -> &mut Self {
        let Some(tls) = tls else {
            return self;
        };

        self.insert_opt(sni_key, tls.sni.as_deref());
        if !tls.alpn.is_empty() {
            self.insert("alpn", tls.alpn.clone());
        }
        self.insert_opt("client-fingerprint", tls.fingerprint.as_deref());
        self.insert_flag("skip-cert-verify", tls.insecure);

        if let Some(reality) = &tls.reality {
            let mut opts = Mapping::new();
            opts.insert("public-key".into(), reality.public_key.as_str().into());
            if !reality.short_id.is_empty() {
                opts.insert("short-id".into(), reality.short_id.as_str().into());
            }
            if let Some(spider_x) = &reality.spider_x {
                opts.insert("spider-x".into(), spider_x.as_str().into());
            }
            self.insert("reality-opts", opts);
        }
        self
    }

    /// Writes `network` and the matching `*-opts` map
    pub fn insert_transport(&mut self, transport: &Transport) -> &mut Self {
        if transport.network == Network::Tcp {
            return self;
        }
        self.insert("network", transport.network.as_str());

        match transport.network {
            Network::Ws => {
                let mut opts = Mapping::new();
                if let Some(path) = &transport.path {
                    opts.insert("path".into(), path.as_str().into());
                }
                if let Some(host) = &transport.host {
                    let mut headers = Mapping::new();
                    headers.insert("Host".into(), host.as_str().into());
                    opts.insert("headers".into(), headers.into());
                }
                if !opts.is_empty() {
                    self.insert("ws-opts", opts);
                }
            }
            Network::Grpc => {
                if let Some(service_name) = &transport.service_name {
                    let mut opts = Mapping::new();
                    opts.insert("grpc-service-name".into(), service_name.as_str().into());
                    self.insert("grpc-opts", opts);
                }
            }
            Network::H2 => {
                let mut opts = Mapping::new();
                if let Some(host) = &transport.host {
                    opts.insert("host".into(), vec![host.as_str()].into());
                }
                if let Some(path) = &transport.path {
                    opts.insert("path".into(), path.as_str().into());
                }
                if !opts.is_empty() {
                    self.insert("h2-opts", opts);
                }
            }
            Network::Tcp | Network::Quic | Network::Kcp => {}
        }
        self
    }

    /// Carries extras over without overwriting keys already written
    pub fn insert_extras(&mut self, extras: &Extras) -> &mut Self {
        for (key, value) in extras {
            if self.map.contains_key(key.as_str()) {
                continue;
            }
            if let Ok(value) = serde_yaml::to_value(value) {
                self.map.insert(Value::String(key.clone()), value);
            }
        }
        self
    }

    pub fn build(self) -> Mapping {
        self.map
    }
}

// ============================================================================
// Deserialization Helpers
// ============================================================================

/// Port as a number or a numeric string
pub fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        String(String),
    }

    match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => Ok(n),
        PortValue::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Optional u32 as a number, numeric string, empty string or null
pub fn deserialize_option_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum U32Value {
        Number(u32),
        String(String),
    }

    match Option::<U32Value>::deserialize(deserializer)? {
        Some(U32Value::Number(n)) => Ok(Some(n)),
        Some(U32Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(U32Value::String(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Bandwidth such as `100`, `"100"` or `"100 Mbps"`
fn deserialize_mbps<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Mbps {
        Number(u32),
        String(String),
    }

    Ok(match Option::<Mbps>::deserialize(deserializer)? {
        Some(Mbps::Number(n)) => Some(n),
        Some(Mbps::String(s)) => super::protocols::parse_leading_u32(&s),
        None => None,
    })
}

/// Scalars YAML may type as numbers or booleans (passwords, short ids)
fn deserialize_option_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        String(String),
        Integer(i64),
        Unsigned(u64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::String(s)) => Some(s),
        Some(Scalar::Integer(n)) => Some(n.to_string()),
        Some(Scalar::Unsigned(n)) => Some(n.to_string()),
        Some(Scalar::Float(n)) => Some(n.to_string()),
        Some(Scalar::Bool(b)) => Some(b.to_string()),
        None => None,
    })
}

/// Booleans written as `true`, `"true"`, `"tls"`, `1`
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(i64),
        String(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Number(n)) => n != 0,
        Some(Flag::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "tls" | "yes"
        ),
        None => false,
    })
}

/// A list of strings or a single comma separated string
fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringList {
        Single(String),
        Multiple(Vec<String>),
    }

    Ok(match Option::<StringList>::deserialize(deserializer)? {
        Some(StringList::Single(s)) => split_alpn(&s),
        Some(StringList::Multiple(v)) => v,
        None => Vec::new(),
    })
}

/// Header maps whose values may be strings or lists of strings
fn deserialize_headers<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HeaderValue {
        Single(String),
        Multiple(Vec<String>),
    }

    let raw = Option::<BTreeMap<String, HeaderValue>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            HeaderValue::Single(s) => Some((k, s)),
            HeaderValue::Multiple(v) => v.into_iter().next().map(|s| (k, s)),
        })
        .collect())
}
