//! Hysteria2 codec
//!
//! Format: hysteria2://password@host:port?sni=&obfs=salamander&obfs-password=&insecure=1#name
//! (`hy2://` is accepted as an alias)

use serde_yaml::Mapping;
use tracing::trace;

use crate::node::{Credential, Endpoint, Hysteria2Credential, Node, display_name};
use crate::parser::error::ParseResult;
use crate::parser::structured::{ProxyMap, StructuredProxy};

use super::{
    ProtocolCodec, QUIC_TLS_QUERY_KEYS, QueryBuilder, encode_fragment, parse_uri_parts,
    push_quic_tls_query, quic_tls_from_query,
};

/// Codec for Hysteria2 (hysteria2:// and hy2://) URIs
pub struct Hysteria2Codec;

impl ProtocolCodec for Hysteria2Codec {
    type Credential = Hysteria2Credential;

    const SCHEMES: &'static [&'static str] = &["hysteria2", "hy2"];

    fn decode(uri: &str) -> ParseResult<Node> {
        trace!("Parsing Hysteria2 URI");
        let mut parts = parse_uri_parts(uri, "hysteria2")?;

        // `user:pass` userinfo is the userpass auth form; keep it whole
        let password = match parts.password.take() {
            Some(pass) => format!("{}:{}", parts.username, pass),
            None => std::mem::take(&mut parts.username),
        };

        let params = &mut parts.params;
        let credential = Hysteria2Credential {
            password,
            obfs: params.take_nonempty("obfs"),
            obfs_password: params.take_any(&["obfs-password", "obfs_password"]),
            up_mbps: params.take_u32(&["up", "upmbps"]),
            down_mbps: params.take_u32(&["down", "downmbps"]),
        };
        let tls = quic_tls_from_query(params);

        let mut node = Node::new(
            display_name(parts.name.take(), &parts.host),
            Endpoint::new(parts.host.clone(), parts.port),
            Credential::Hysteria2(credential),
        );
        node.transport.tls = Some(tls);
        Ok(node.with_extras(parts.params.into_extras()))
    }

    fn encode(node: &Node, credential: &Hysteria2Credential) -> String {
        let mut query = QueryBuilder::new();
        push_quic_tls_query(&mut query, node.tls());
        query.push_opt("obfs", credential.obfs.as_deref());
        query.push_opt("obfs-password", credential.obfs_password.as_deref());
        query.push_opt("up", credential.up_mbps.map(|v| v.to_string()));
        query.push_opt("down", credential.down_mbps.map(|v| v.to_string()));
        query.push_extras(&node.extras, QUIC_TLS_QUERY_KEYS);

        let userinfo = if credential.password.is_empty() {
            String::new()
        } else {
            format!("{}@", urlencoding::encode(&credential.password))
        };

        format!(
            "{}://{}{}{}{}",
            Self::SCHEMES[0],
            userinfo,
            node.endpoint.authority(),
            query.build(),
            encode_fragment(&node.name)
        )
    }

    fn from_structured(proxy: &StructuredProxy) -> Option<Node> {
        let endpoint = proxy.endpoint()?;

        let credential = Hysteria2Credential {
            password: proxy.password.clone().unwrap_or_default(),
            obfs: proxy.obfs.clone().filter(|o| !o.is_empty()),
            obfs_password: proxy.obfs_password.clone().filter(|o| !o.is_empty()),
            up_mbps: proxy.up,
            down_mbps: proxy.down,
        };

        let mut node = Node::new(proxy.display_name(), endpoint, Credential::Hysteria2(credential));
        node.transport.tls = proxy.tls_opts(true);
        Some(node.with_extras(proxy.extras()))
    }

    fn to_structured(node: &Node, credential: &Hysteria2Credential) -> Mapping {
        let mut map = ProxyMap::new(node, "hysteria2");
        map.insert("password", credential.password.as_str())
            .insert_opt("obfs", credential.obfs.as_deref())
            .insert_opt("obfs-password", credential.obfs_password.as_deref())
            .insert_opt("up", credential.up_mbps)
            .insert_opt("down", credential.down_mbps)
            .insert_tls(node.tls(), "sni")
            .insert_extras(&node.extras);
        map.build()
    }
}
