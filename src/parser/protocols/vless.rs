//! VLESS codec
//!
//! Format: vless://uuid@host:port?params#name
//!
//! Security is `none`, `tls` or `reality`. A Reality public key always
//! selects Reality, even when the link also says `security=tls`.

use serde_yaml::Mapping;
use tracing::trace;

use crate::node::{Credential, Endpoint, Node, VlessCredential, display_name};
use crate::parser::error::{ParseError, ParseResult};
use crate::parser::structured::{ProxyMap, StructuredProxy};

use super::{
    ProtocolCodec, QueryBuilder, V2RAY_QUERY_KEYS, encode_fragment, parse_uri_parts,
    push_tls_query, push_transport_query, tls_from_query, transport_from_query,
};

/// Codec for VLESS (vless://) URIs
pub struct VlessCodec;

impl ProtocolCodec for VlessCodec {
    type Credential = VlessCredential;

    const SCHEMES: &'static [&'static str] = &["vless"];

    fn decode(uri: &str) -> ParseResult<Node> {
        trace!("Parsing VLESS URI");
        let mut parts = parse_uri_parts(uri, "vless")?;

        if parts.username.is_empty() {
            return Err(ParseError::missing("vless", "uuid"));
        }

        // VLESS has no payload encryption; the parameter is always `none`
        parts.params.take("encryption");
        let flow = parts.params.take_nonempty("flow");

        let mut transport = transport_from_query(&mut parts.params);
        transport.tls = tls_from_query(&mut parts.params, "none");

        let name = display_name(parts.name, &parts.host);
        Ok(Node::new(
            name,
            Endpoint::new(parts.host, parts.port),
            Credential::Vless(VlessCredential {
                uuid: parts.username,
                flow,
            }),
        )
        .with_transport(transport)
        .with_extras(parts.params.into_extras()))
    }

    fn encode(node: &Node, credential: &VlessCredential) -> String {
        let mut query = QueryBuilder::new();
        query.push("encryption", "none");
        push_tls_query(&mut query, node.tls());
        query.push_opt("flow", credential.flow.as_deref());
        push_transport_query(&mut query, &node.transport);
        query.push_extras(&node.extras, V2RAY_QUERY_KEYS);

        format!(
            "{}://{}@{}{}{}",
            Self::SCHEMES[0],
            urlencoding::encode(&credential.uuid),
            node.endpoint.authority(),
            query.build(),
            encode_fragment(&node.name)
        )
    }

    fn from_structured(proxy: &StructuredProxy) -> Option<Node> {
        let endpoint = proxy.endpoint()?;
        let uuid = proxy.uuid.clone().filter(|u| !u.is_empty())?;

        let mut transport = proxy.transport();
        transport.tls = proxy.tls_opts(false);

        Some(
            Node::new(
                proxy.display_name(),
                endpoint,
                Credential::Vless(VlessCredential {
                    uuid,
                    flow: proxy.flow.clone().filter(|f| !f.is_empty()),
                }),
            )
            .with_transport(transport)
            .with_extras(proxy.extras()),
        )
    }

    fn to_structured(node: &Node, credential: &VlessCredential) -> Mapping {
        let mut map = ProxyMap::new(node, "vless");
        map.insert("uuid", credential.uuid.as_str())
            .insert_opt("flow", credential.flow.as_deref())
            .insert_flag("tls", node.tls().is_some())
            .insert_tls(node.tls(), "servername")
            .insert_transport(&node.transport)
            .insert_extras(&node.extras);
        map.build()
    }
}
