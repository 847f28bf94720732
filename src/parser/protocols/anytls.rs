//! AnyTLS codec
//!
//! Format: anytls://password@host[:port]/?sni=&insecure=1&alpn=#name
//! The port defaults to 443.

use serde_yaml::Mapping;
use tracing::trace;

use crate::node::{AnyTlsCredential, Credential, Endpoint, Node, display_name};
use crate::parser::error::{ParseError, ParseResult};
use crate::parser::structured::{ProxyMap, StructuredProxy};

use super::{
    ProtocolCodec, QUIC_TLS_QUERY_KEYS, QueryBuilder, encode_fragment, parse_uri_parts_with_port,
    push_quic_tls_query, quic_tls_from_query,
};

const DEFAULT_PORT: u16 = 443;

/// Codec for AnyTLS (anytls://) URIs
pub struct AnyTlsCodec;

impl ProtocolCodec for AnyTlsCodec {
    type Credential = AnyTlsCredential;

    const SCHEMES: &'static [&'static str] = &["anytls"];

    fn decode(uri: &str) -> ParseResult<Node> {
        trace!("Parsing AnyTLS URI");
        let mut parts = parse_uri_parts_with_port(uri, "anytls", Some(DEFAULT_PORT))?;

        let password = match parts.password.take() {
            Some(rest) => format!("{}:{}", parts.username, rest),
            None => std::mem::take(&mut parts.username),
        };
        if password.is_empty() {
            return Err(ParseError::missing("anytls", "password"));
        }

        // TLS is mandatory; idle_* session knobs stay in the extras
        let tls = quic_tls_from_query(&mut parts.params);

        let mut node = Node::new(
            display_name(parts.name, &parts.host),
            Endpoint::new(parts.host, parts.port),
            Credential::AnyTls(AnyTlsCredential { password }),
        );
        node.transport.tls = Some(tls);
        Ok(node.with_extras(parts.params.into_extras()))
    }

    fn encode(node: &Node, credential: &AnyTlsCredential) -> String {
        let mut query = QueryBuilder::new();
        push_quic_tls_query(&mut query, node.tls());
        query.push_extras(&node.extras, QUIC_TLS_QUERY_KEYS);

        format!(
            "{}://{}@{}/{}{}",
            Self::SCHEMES[0],
            urlencoding::encode(&credential.password),
            node.endpoint.authority(),
            query.build(),
            encode_fragment(&node.name)
        )
    }

    fn from_structured(proxy: &StructuredProxy) -> Option<Node> {
        let endpoint = proxy.endpoint()?;
        let password = proxy.password.clone().filter(|p| !p.is_empty())?;

        let mut node = Node::new(
            proxy.display_name(),
            endpoint,
            Credential::AnyTls(AnyTlsCredential { password }),
        );
        node.transport.tls = proxy.tls_opts(true);
        Some(node.with_extras(proxy.extras()))
    }

    fn to_structured(node: &Node, credential: &AnyTlsCredential) -> Mapping {
        let mut map = ProxyMap::new(node, "anytls");
        map.insert("password", credential.password.as_str())
            .insert_tls(node.tls(), "sni")
            .insert_extras(&node.extras);
        map.build()
    }
}
