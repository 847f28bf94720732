//! Shadowsocks codec
//!
//! Accepted forms:
//! - SIP002: ss://BASE64URL(method:password)@host:port/?plugin=...#name
//! - SIP002 with plain userinfo: ss://method:password@host:port#name
//! - Legacy: ss://BASE64(method:password@host:port)#name
//!
//! Encoding always produces the first form.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::node::{Credential, Endpoint, Extras, Node, ShadowsocksCredential, display_name};
use crate::parser::base64::{decode_base64_utf8, encode_base64_url};
use crate::parser::error::{ParseError, ParseResult};
use crate::parser::structured::{ProxyMap, StructuredProxy};

use super::{
    ProtocolCodec, QueryBuilder, QueryParams, encode_fragment, parse_host_port, percent_decode,
    split_fragment,
};

// ============================================================================
// SIP002 Plugin
// ============================================================================

/// A SIP002 plugin string: `name;opt=value;flag`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sip002Plugin {
    pub name: String,
    /// Options in order; flags such as `tls` have no value
    #[serde(default)]
    pub opts: Vec<(String, Option<String>)>,
}

impl Sip002Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: normalize_plugin_name(name.into()),
            opts: Vec::new(),
        }
    }

    pub fn with_opt(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.opts.push((key.into(), value));
        self
    }

    fn with_opt_if_some(self, key: &str, value: Option<String>) -> Self {
        match value {
            Some(value) => self.with_opt(key, Some(value)),
            None => self,
        }
    }

    /// Parses `name;k=v;flag`, honouring backslash escapes
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = split_unescaped(raw, ';').into_iter();
        let name = unescape(&segments.next()?);
        if name.trim().is_empty() {
            return None;
        }

        let mut plugin = Self::new(name.trim());
        for segment in segments.filter(|s| !s.is_empty()) {
            let mut kv = split_unescaped(&segment, '=').into_iter();
            let key = unescape(&kv.next().unwrap_or_default());
            let value = kv.next().map(|v| unescape(&v));
            plugin.opts.push((key, value));
        }
        Some(plugin)
    }

    pub fn opt(&self, key: &str) -> Option<&str> {
        self.opts
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.opts.iter().any(|(k, _)| k == key)
    }

    pub fn is_obfs(&self) -> bool {
        self.name == "obfs-local"
    }

    pub fn is_v2ray(&self) -> bool {
        self.name == "v2ray-plugin"
    }

    /// Options without the plugin name, as sing-box `plugin_opts` expects
    pub fn opts_string(&self) -> String {
        self.opts
            .iter()
            .map(|(k, v)| match v {
                Some(v) => format!("{}={}", escape(k), escape(v)),
                None => escape(k),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for Sip002Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&escape(&self.name))?;
        if !self.opts.is_empty() {
            write!(f, ";{}", self.opts_string())?;
        }
        Ok(())
    }
}

/// `simple-obfs` is the retired name of `obfs-local`
fn normalize_plugin_name(name: String) -> String {
    match name.as_str() {
        "simple-obfs" => {
            debug!("Renaming SIP003 plugin simple-obfs to obfs-local");
            "obfs-local".to_string()
        }
        _ => name,
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | ':' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Splits on `sep` unless it is escaped; escapes are kept for [`unescape`]
fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

// ============================================================================
// Shadowsocks Codec
// ============================================================================

/// Builds a canonical SIP002 URI
pub fn sip002_uri(
    endpoint: &Endpoint,
    credential: &ShadowsocksCredential,
    extras: &Extras,
    name: &str,
) -> String {
    let userinfo = encode_base64_url(&format!("{}:{}", credential.cipher, credential.password));

    let mut query = QueryBuilder::new();
    query.push_opt("plugin", credential.plugin.as_ref().map(|p| p.to_string()));
    query.push_extras(extras, &["plugin"]);
    let query = query.build();
    let path = if query.is_empty() { "" } else { "/" };

    format!(
        "ss://{}@{}{}{}{}",
        userinfo,
        endpoint.authority(),
        path,
        query,
        encode_fragment(name)
    )
}

/// Codec for Shadowsocks (ss://) URIs
pub struct ShadowsocksCodec;

impl ProtocolCodec for ShadowsocksCodec {
    type Credential = ShadowsocksCredential;

    const SCHEMES: &'static [&'static str] = &["ss", "shadowsocks"];

    fn decode(uri: &str) -> ParseResult<Node> {
        trace!("Parsing Shadowsocks URI");
        let uri = uri.trim();
        let body = uri
            .split_once("://")
            .map(|(_, body)| body)
            .ok_or_else(|| ParseError::malformed("ss", "missing scheme separator"))?;
        let (main, name) = split_fragment(body);

        let (main, query) = match main.split_once('?') {
            Some((main, query)) => (main, Some(query)),
            None => (main, None),
        };
        let main = main.trim_end_matches('/');

        let (cipher, password, host, port) = match main.rfind('@') {
            Some(at) => {
                trace!("Parsing as SIP002 format");
                let (cipher, password) = parse_userinfo(&main[..at])?;
                let (host, port) = parse_host_port(&main[at + 1..], "ss")?;
                (cipher, password, host, port)
            }
            None => {
                trace!("Parsing as legacy Base64 format");
                parse_legacy(main)?
            }
        };

        if cipher.is_empty() {
            return Err(ParseError::missing("ss", "method"));
        }

        let mut params = query.map(QueryParams::parse).unwrap_or_default();
        let plugin = params
            .take_nonempty("plugin")
            .and_then(|p| Sip002Plugin::parse(&p));

        let name = display_name(name, &host);
        Ok(Node::new(
            name,
            Endpoint::new(host, port),
            Credential::Shadowsocks(ShadowsocksCredential {
                cipher,
                password,
                plugin,
            }),
        )
        .with_extras(params.into_extras()))
    }

    fn encode(node: &Node, credential: &ShadowsocksCredential) -> String {
        sip002_uri(&node.endpoint, credential, &node.extras, &node.name)
    }

    fn from_structured(proxy: &StructuredProxy) -> Option<Node> {
        let endpoint = proxy.endpoint()?;
        let cipher = proxy.cipher.clone().filter(|c| !c.is_empty())?;
        let password = proxy.password.clone().unwrap_or_default();

        let plugin = proxy
            .plugin
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|name| plugin_from_structured(name, proxy.plugin_opts.as_ref()));

        Some(
            Node::new(
                proxy.display_name(),
                endpoint,
                Credential::Shadowsocks(ShadowsocksCredential {
                    cipher,
                    password,
                    plugin,
                }),
            )
            .with_extras(proxy.extras()),
        )
    }

    fn to_structured(node: &Node, credential: &ShadowsocksCredential) -> Mapping {
        let mut map = ProxyMap::new(node, "ss");
        map.insert("cipher", credential.cipher.as_str())
            .insert("password", credential.password.as_str());

        if let Some(plugin) = &credential.plugin {
            let (name, opts) = plugin_to_structured(plugin);
            map.insert("plugin", name).insert("plugin-opts", opts);
        }

        map.insert_extras(&node.extras);
        map.build()
    }
}

/// Userinfo is either Base64 of `method:password` or the plain pair
fn parse_userinfo(userinfo: &str) -> ParseResult<(String, String)> {
    let userinfo = percent_decode(userinfo);

    if let Ok(decoded) = decode_base64_utf8(&userinfo)
        && let Some((method, password)) = decoded.split_once(':')
    {
        return Ok((method.to_string(), password.to_string()));
    }

    userinfo
        .split_once(':')
        .map(|(method, password)| (method.to_string(), password.to_string()))
        .ok_or_else(|| ParseError::malformed("ss", "userinfo is not method:password"))
}

/// Legacy body: BASE64(method:password@host:port)
fn parse_legacy(main: &str) -> ParseResult<(String, String, String, u16)> {
    let decoded = decode_base64_utf8(main)?;
    let (userinfo, hostport) = decoded
        .rsplit_once('@')
        .ok_or_else(|| ParseError::malformed("ss", "legacy body has no '@'"))?;
    let (method, password) = userinfo
        .split_once(':')
        .ok_or_else(|| ParseError::malformed("ss", "userinfo is not method:password"))?;
    let (host, port) = parse_host_port(hostport.trim(), "ss")?;
    Ok((method.to_string(), password.to_string(), host, port))
}

/// Maps Clash `plugin`/`plugin-opts` to a SIP002 plugin
fn plugin_from_structured(name: &str, opts: Option<&Mapping>) -> Sip002Plugin {
    let get = |key: &str| {
        opts.and_then(|o| o.get(key))
            .and_then(scalar_string)
    };

    match name {
        "obfs" | "obfs-local" | "simple-obfs" => Sip002Plugin::new("obfs-local")
            .with_opt_if_some("obfs", get("mode"))
            .with_opt_if_some("obfs-host", get("host")),
        "v2ray-plugin" => {
            let mut plugin = Sip002Plugin::new("v2ray-plugin");
            if let Some(mode) = get("mode").filter(|m| m != "websocket") {
                plugin = plugin.with_opt("mode", Some(mode));
            }
            if opts
                .and_then(|o| o.get("tls"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                plugin = plugin.with_opt("tls", None);
            }
            plugin
                .with_opt_if_some("host", get("host"))
                .with_opt_if_some("path", get("path"))
        }
        other => {
            let mut plugin = Sip002Plugin::new(other);
            for (key, value) in opts.into_iter().flatten() {
                let Some(key) = key.as_str() else { continue };
                match value {
                    Value::Bool(true) => plugin.opts.push((key.to_string(), None)),
                    Value::Bool(false) => {}
                    other => {
                        if let Some(value) = scalar_string(other) {
                            plugin.opts.push((key.to_string(), Some(value)));
                        }
                    }
                }
            }
            plugin
        }
    }
}

/// Maps a SIP002 plugin to Clash `plugin`/`plugin-opts`
fn plugin_to_structured(plugin: &Sip002Plugin) -> (String, Mapping) {
    let mut opts = Mapping::new();

    let name = if plugin.is_obfs() {
        if let Some(mode) = plugin.opt("obfs") {
            opts.insert("mode".into(), mode.into());
        }
        if let Some(host) = plugin.opt("obfs-host") {
            opts.insert("host".into(), host.into());
        }
        "obfs".to_string()
    } else if plugin.is_v2ray() {
        opts.insert(
            "mode".into(),
            plugin.opt("mode").unwrap_or("websocket").into(),
        );
        if plugin.has_flag("tls") {
            opts.insert("tls".into(), true.into());
        }
        if let Some(host) = plugin.opt("host") {
            opts.insert("host".into(), host.into());
        }
        if let Some(path) = plugin.opt("path") {
            opts.insert("path".into(), path.into());
        }
        plugin.name.clone()
    } else {
        for (key, value) in &plugin.opts {
            let value = match value {
                Some(v) => Value::from(v.as_str()),
                None => Value::Bool(true),
            };
            opts.insert(key.as_str().into(), value);
        }
        plugin.name.clone()
    };

    (name, opts)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
