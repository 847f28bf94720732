//! Hysteria (v1) codec
//!
//! Format: hysteria://host:port?auth=&peer=&insecure=&upmbps=&downmbps=&alpn=&obfs=xplus&obfsParam=&protocol=#name

use serde_yaml::Mapping;
use tracing::trace;

use crate::node::{Credential, Endpoint, HysteriaCredential, Node, display_name};
use crate::parser::error::ParseResult;
use crate::parser::structured::{ProxyMap, StructuredProxy};

use super::{
    ProtocolCodec, QueryBuilder, encode_fragment, parse_uri_parts, quic_tls_from_query,
};

/// The only obfuscation scheme Hysteria v1 defines
const OBFS_XPLUS: &str = "xplus";

const HYSTERIA_QUERY_KEYS: &[&str] = &[
    "auth", "upmbps", "downmbps", "up", "down", "obfs", "obfsParam",
];

/// Codec for Hysteria (hysteria://) URIs
pub struct HysteriaCodec;

impl ProtocolCodec for HysteriaCodec {
    type Credential = HysteriaCredential;

    const SCHEMES: &'static [&'static str] = &["hysteria", "hy"];

    fn decode(uri: &str) -> ParseResult<Node> {
        trace!("Parsing Hysteria URI");
        let mut parts = parse_uri_parts(uri, "hysteria")?;
        let params = &mut parts.params;

        let auth = params
            .take_nonempty("auth")
            .or_else(|| Some(parts.username.clone()).filter(|u| !u.is_empty()));

        // Older links put the obfs password straight into `obfs`
        let obfs_type = params.take_nonempty("obfs");
        let obfs = params
            .take_nonempty("obfsParam")
            .or(obfs_type.filter(|t| t != OBFS_XPLUS));

        let credential = HysteriaCredential {
            auth,
            obfs,
            up_mbps: params.take_u32(&["upmbps", "up"]),
            down_mbps: params.take_u32(&["downmbps", "down"]),
        };

        let mut node = Node::new(
            display_name(parts.name.take(), &parts.host),
            Endpoint::new(parts.host.clone(), parts.port),
            Credential::Hysteria(credential),
        );
        node.transport.tls = Some(quic_tls_from_query(params));
        // `protocol` (udp/wechat-video/faketcp) stays in the extras
        Ok(node.with_extras(parts.params.into_extras()))
    }

    fn encode(node: &Node, credential: &HysteriaCredential) -> String {
        let mut query = QueryBuilder::new();
        query.push_opt("auth", credential.auth.as_deref());
        if let Some(tls) = node.tls() {
            query.push_opt("peer", tls.sni.as_deref());
            query.push_flag("insecure", tls.insecure);
            if !tls.alpn.is_empty() {
                query.push("alpn", tls.alpn.join(","));
            }
        }
        query.push_opt("upmbps", credential.up_mbps.map(|v| v.to_string()));
        query.push_opt("downmbps", credential.down_mbps.map(|v| v.to_string()));
        if let Some(obfs) = &credential.obfs {
            query.push("obfs", OBFS_XPLUS).push("obfsParam", obfs);
        }
        query.push_extras(&node.extras, HYSTERIA_QUERY_KEYS);

        format!(
            "{}://{}{}{}",
            Self::SCHEMES[0],
            node.endpoint.authority(),
            query.build(),
            encode_fragment(&node.name)
        )
    }

    fn from_structured(proxy: &StructuredProxy) -> Option<Node> {
        let endpoint = proxy.endpoint()?;

        let credential = HysteriaCredential {
            auth: proxy.auth_str.clone().filter(|a| !a.is_empty()),
            obfs: proxy.obfs.clone().filter(|o| !o.is_empty()),
            up_mbps: proxy.up,
            down_mbps: proxy.down,
        };

        let mut extras = proxy.extras();
        if let Some(protocol) = proxy.protocol.clone() {
            extras.insert("protocol".to_string(), serde_json::Value::String(protocol));
        }

        let mut node = Node::new(proxy.display_name(), endpoint, Credential::Hysteria(credential));
        node.transport.tls = proxy.tls_opts(true);
        Some(node.with_extras(extras))
    }

    fn to_structured(node: &Node, credential: &HysteriaCredential) -> Mapping {
        let mut map = ProxyMap::new(node, "hysteria");
        map.insert_opt("auth-str", credential.auth.as_deref())
            .insert_opt("obfs", credential.obfs.as_deref())
            .insert_opt("up", credential.up_mbps)
            .insert_opt("down", credential.down_mbps)
            .insert_tls(node.tls(), "sni")
            .insert_extras(&node.extras);
        map.build()
    }
}
