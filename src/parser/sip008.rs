//! SIP008 online configuration (JSON server lists)
//!
//! Accepts `{"servers": [...]}` or a bare array. Each server is rendered as a
//! canonical `ss://` URI and decoded by the Shadowsocks codec, so SIP008
//! nodes come out exactly like their share-link counterparts.

use serde::Deserialize;
use tracing::debug;

use crate::node::{Endpoint, Extras, Node, ShadowsocksCredential};

use super::error::{ParseError, ParseResult};
use super::protocols::shadowsocks::{Sip002Plugin, sip002_uri};
use super::protocols::{ProtocolCodec, ShadowsocksCodec};
use super::structured::deserialize_port;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Sip008Document {
    Wrapped { servers: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

/// One SIP008 server entry
#[derive(Debug, Deserialize)]
pub struct Sip008Server {
    pub server: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub server_port: u16,
    pub method: String,
    pub password: String,
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub plugin_opts: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl Sip008Server {
    /// Canonical SIP002 URI for this server
    pub fn to_uri(&self) -> String {
        let plugin = self
            .plugin
            .as_deref()
            .filter(|p| !p.is_empty())
            .and_then(|name| match self.plugin_opts.as_deref() {
                Some(opts) if !opts.is_empty() => Sip002Plugin::parse(&format!("{};{}", name, opts)),
                _ => Sip002Plugin::parse(name),
            });

        let credential = ShadowsocksCredential {
            cipher: self.method.clone(),
            password: self.password.clone(),
            plugin,
        };
        let endpoint = Endpoint::new(self.server.trim(), self.server_port);
        sip002_uri(
            &endpoint,
            &credential,
            &Extras::new(),
            self.remarks.as_deref().unwrap_or_default(),
        )
    }
}

/// Parses a SIP008 document into Shadowsocks nodes
///
/// Entries lacking `server`, `server_port`, `method` or `password` are skipped.
pub fn parse_sip008(content: &str) -> ParseResult<Vec<Node>> {
    let entries = match serde_json::from_str::<Sip008Document>(content)? {
        Sip008Document::Wrapped { servers } => servers,
        Sip008Document::Bare(servers) => servers,
    };
    if entries.is_empty() {
        return Err(ParseError::Unsupported("SIP008 document has no servers".to_string()));
    }

    let mut nodes = Vec::new();
    for entry in entries {
        let server: Sip008Server = match serde_json::from_value(entry) {
            Ok(server) => server,
            Err(e) => {
                debug!("Skipping SIP008 entry: {}", e);
                continue;
            }
        };
        match ShadowsocksCodec::decode(&server.to_uri()) {
            Ok(node) => nodes.push(node),
            Err(e) => debug!("Skipping SIP008 server {}: {}", server.server, e),
        }
    }

    debug!("Parsed {} nodes from SIP008 document", nodes.len());
    Ok(nodes)
}
