//! Trojan codec
//!
//! Format: trojan://password@host:port?params#name

use serde_yaml::Mapping;
use tracing::trace;

use crate::node::{Credential, Endpoint, Node, TrojanCredential, display_name};
use crate::parser::error::{ParseError, ParseResult};
use crate::parser::structured::{ProxyMap, StructuredProxy};

use super::{
    ProtocolCodec, QueryBuilder, V2RAY_QUERY_KEYS, encode_fragment, parse_uri_parts,
    push_tls_query, push_transport_query, tls_from_query, transport_from_query,
};

/// Codec for Trojan (trojan://) URIs
pub struct TrojanCodec;

impl ProtocolCodec for TrojanCodec {
    type Credential = TrojanCredential;

    const SCHEMES: &'static [&'static str] = &["trojan"];

    fn decode(uri: &str) -> ParseResult<Node> {
        trace!("Parsing Trojan URI");
        let mut parts = parse_uri_parts(uri, "trojan")?;

        // A password containing ':' is split by the URL parser
        let password = match parts.password.take() {
            Some(rest) => format!("{}:{}", parts.username, rest),
            None => std::mem::take(&mut parts.username),
        };
        if password.is_empty() {
            return Err(ParseError::missing("trojan", "password"));
        }

        let mut transport = transport_from_query(&mut parts.params);
        // Trojan runs over TLS unless told otherwise
        transport.tls = tls_from_query(&mut parts.params, "tls");

        let name = display_name(parts.name, &parts.host);
        Ok(Node::new(
            name,
            Endpoint::new(parts.host, parts.port),
            Credential::Trojan(TrojanCredential { password }),
        )
        .with_transport(transport)
        .with_extras(parts.params.into_extras()))
    }

    fn encode(node: &Node, credential: &TrojanCredential) -> String {
        let mut query = QueryBuilder::new();
        push_tls_query(&mut query, node.tls());
        push_transport_query(&mut query, &node.transport);
        query.push_extras(&node.extras, V2RAY_QUERY_KEYS);

        format!(
            "{}://{}@{}{}{}",
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

        let mut transport = proxy.transport();
        transport.tls = proxy.tls_opts(true);

        Some(
            Node::new(
                proxy.display_name(),
                endpoint,
                Credential::Trojan(TrojanCredential { password }),
            )
            .with_transport(transport)
            .with_extras(proxy.extras()),
        )
    }

    fn to_structured(node: &Node, credential: &TrojanCredential) -> Mapping {
        let mut map = ProxyMap::new(node, "trojan");
        map.insert("password", credential.password.as_str())
            .insert_tls(node.tls(), "sni")
            .insert_transport(&node.transport)
            .insert_extras(&node.extras);
        map.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Network;

    fn decode_trojan(uri: &str) -> (Node, TrojanCredential) {
        let node = TrojanCodec::decode(uri).unwrap();
        if let Credential::Trojan(c) = &node.credential {
            let c = c.clone();
            (node, c)
        } else {
            panic!("Expected Trojan credential");
        }
    }

    #[test]
    fn test_trojan_basic() {
        let (node, cred) = decode_trojan("trojan://password@example.com:443?sni=example.com#test-node");
        assert_eq!(node.name, "test-node");
        assert_eq!(node.endpoint, Endpoint::new("example.com", 443));
        assert_eq!(cred.password, "password");
        let tls = node.tls().unwrap();
        assert_eq!(tls.sni.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_trojan_with_websocket() {
        let (node, _) = decode_trojan(
            "trojan://password@example.com:443?type=ws&path=/ws&host=ws.example.com#ws-node",
        );
        assert_eq!(node.transport.network, Network::Ws);
        assert_eq!(node.transport.path.as_deref(), Some("/ws"));
        assert_eq!(node.transport.host.as_deref(), Some("ws.example.com"));
    }

    #[test]
    fn test_trojan_with_grpc() {
        let (node, _) = decode_trojan(
            "trojan://password@example.com:443?type=grpc&serviceName=myservice#grpc-node",
        );
        assert_eq!(node.transport.network, Network::Grpc);
        assert_eq!(node.transport.service_name.as_deref(), Some("myservice"));
    }

    #[test]
    fn test_trojan_no_tls() {
        let (node, _) = decode_trojan("trojan://password@example.com:8080?security=none#no-tls");
        assert!(node.tls().is_none());
    }

    #[test]
    fn test_trojan_default_tls_enabled() {
        let (node, _) = decode_trojan("trojan://password@example.com:443#default-tls");
        assert!(node.tls().is_some());
    }

    #[test]
    fn test_trojan_name_falls_back_to_host() {
        let (node, _) = decode_trojan("trojan://password@example.com:443");
        assert_eq!(node.name, "example.com");
    }

    #[test]
    fn test_trojan_url_encoded_password_and_name() {
        let (node, cred) =
            decode_trojan("trojan://pass%40word%21@example.com:443#%F0%9F%87%BA%F0%9F%87%B8%20US");
        assert_eq!(cred.password, "pass@word!");
        assert_eq!(node.name, "🇺🇸 US");
    }

    #[test]
    fn test_trojan_ipv6_host() {
        let (node, _) = decode_trojan("trojan://password@[::1]:443#ipv6-node");
        assert_eq!(node.endpoint.host, "::1");
        assert!(TrojanCodec::encode(&node, &TrojanCredential { password: "password".into() })
            .contains("@[::1]:443"));
    }

    #[test]
    fn test_trojan_errors() {
        assert!(TrojanCodec::decode("trojan://@example.com:443").is_err());
        assert!(TrojanCodec::decode("trojan://password@:443").is_err());
        assert!(TrojanCodec::decode("trojan://password@example.com").is_err());
        assert!(TrojanCodec::decode("trojan://").is_err());
    }

    #[test]
    fn test_trojan_round_trip() {
        let uri = "trojan://p%3Aw@example.com:443?type=ws&path=%2Fws&host=cdn.com&sni=s.com&alpn=h2&fp=chrome&custom=x#R%20T";
        let (node, cred) = decode_trojan(uri);
        assert_eq!(cred.password, "p:w");
        assert_eq!(node.extra_str("custom"), Some("x"));

        let encoded = TrojanCodec::encode(&node, &cred);
        let (back, back_cred) = decode_trojan(&encoded);
        assert!(node.equivalent(&back));
        assert_eq!(back_cred, cred);
        assert_eq!(back.name, "R T");
    }

    #[test]
    fn test_trojan_structured_round_trip() {
        let (node, cred) = decode_trojan("trojan://pw@example.com:443?type=grpc&serviceName=svc&sni=s.com#G");
        let map = TrojanCodec::to_structured(&node, &cred);
        let proxy = StructuredProxy::from_mapping(map).unwrap();
        let back = TrojanCodec::from_structured(&proxy).unwrap();
        assert!(node.equivalent(&back));
        assert_eq!(back.name, "G");
    }
}
