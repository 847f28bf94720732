//! ShadowsocksR codec
//!
//! The whole link is URL-safe Base64:
//! ssr://BASE64(host:port:protocol:method:obfs:BASE64(password)/?obfsparam=&protoparam=&remarks=&group=)
//!
//! Parameter values are Base64 as well.

use serde_yaml::Mapping;
use tracing::trace;

use crate::node::{Credential, Endpoint, Node, ShadowsocksRCredential, display_name};
use crate::parser::base64::{decode_base64_utf8, encode_base64_url};
use crate::parser::error::{ParseError, ParseResult};
use crate::parser::structured::{ProxyMap, StructuredProxy};

use super::{ProtocolCodec, QueryParams};

/// Parameters whose values are Base64-encoded
const ENCODED_PARAMS: &[&str] = &["obfsparam", "protoparam", "remarks", "group"];

/// Codec for ShadowsocksR (ssr://) URIs
pub struct ShadowsocksRCodec;

impl ProtocolCodec for ShadowsocksRCodec {
    type Credential = ShadowsocksRCredential;

    const SCHEMES: &'static [&'static str] = &["ssr"];

    fn decode(uri: &str) -> ParseResult<Node> {
        trace!("Parsing ShadowsocksR URI");
        let body = uri
            .trim()
            .split_once("://")
            .map(|(_, body)| body)
            .ok_or_else(|| ParseError::malformed("ssr", "missing scheme separator"))?;
        let decoded = decode_base64_utf8(body)?;

        let (main, query) = match decoded.split_once('?') {
            Some((main, query)) => (main.trim_end_matches('/'), Some(query)),
            None => (decoded.trim_end_matches('/'), None),
        };

        // Host may be an IPv6 literal, so split from the right
        let mut fields = main.rsplitn(6, ':');
        let password_b64 = fields.next().unwrap_or_default();
        let obfs = fields.next().unwrap_or_default();
        let cipher = fields.next().unwrap_or_default();
        let protocol = fields.next().unwrap_or_default();
        let port = fields
            .next()
            .ok_or_else(|| ParseError::malformed("ssr", "not enough fields"))?;
        let host = fields
            .next()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ParseError::missing("ssr", "host"))?;

        let port = port
            .parse::<u16>()
            .map_err(|_| ParseError::InvalidPort(port.to_string()))?;
        if cipher.is_empty() {
            return Err(ParseError::missing("ssr", "method"));
        }
        let password = decode_base64_utf8(password_b64)?;

        let mut params = query.map(QueryParams::parse).unwrap_or_default();
        let mut take_encoded = |key: &str| {
            params
                .take_nonempty(key)
                .and_then(|v| decode_base64_utf8(&v).ok())
                .filter(|v| !v.is_empty())
        };
        let obfs_param = take_encoded("obfsparam");
        let protocol_param = take_encoded("protoparam");
        let remarks = take_encoded("remarks");
        let group = take_encoded("group");

        let mut extras = params.into_extras();
        if let Some(group) = group {
            extras.insert("group".to_string(), serde_json::Value::String(group));
        }

        let name = display_name(remarks, host);
        Ok(Node::new(
            name,
            Endpoint::new(host, port),
            Credential::ShadowsocksR(ShadowsocksRCredential {
                cipher: cipher.to_string(),
                password,
                protocol: protocol.to_string(),
                protocol_param,
                obfs: obfs.to_string(),
                obfs_param,
            }),
        )
        .with_extras(extras))
    }

    fn encode(node: &Node, credential: &ShadowsocksRCredential) -> String {
        let main = format!(
            "{}:{}:{}:{}:{}:{}",
            node.endpoint.host,
            node.endpoint.port,
            credential.protocol,
            credential.cipher,
            credential.obfs,
            encode_base64_url(&credential.password)
        );

        let mut params = vec![
            format!(
                "obfsparam={}",
                encode_base64_url(credential.obfs_param.as_deref().unwrap_or_default())
            ),
            format!(
                "protoparam={}",
                encode_base64_url(credential.protocol_param.as_deref().unwrap_or_default())
            ),
            format!("remarks={}", encode_base64_url(&node.name)),
        ];
        if let Some(group) = node.extra_str("group") {
            params.push(format!("group={}", encode_base64_url(group)));
        }
        for (key, value) in &node.extras {
            if ENCODED_PARAMS.contains(&key.as_str()) {
                continue;
            }
            if let Some(value) = value.as_str() {
                params.push(format!("{}={}", key, urlencoding::encode(value)));
            }
        }

        let body = format!("{}/?{}", main, params.join("&"));
        format!("{}://{}", Self::SCHEMES[0], encode_base64_url(&body))
    }

    fn from_structured(proxy: &StructuredProxy) -> Option<Node> {
        let endpoint = proxy.endpoint()?;
        let cipher = proxy.cipher.clone().filter(|c| !c.is_empty())?;

        Some(
            Node::new(
                proxy.display_name(),
                endpoint,
                Credential::ShadowsocksR(ShadowsocksRCredential {
                    cipher,
                    password: proxy.password.clone().unwrap_or_default(),
                    protocol: proxy
                        .protocol
                        .clone()
                        .unwrap_or_else(|| "origin".to_string()),
                    protocol_param: proxy.protocol_param.clone().filter(|p| !p.is_empty()),
                    obfs: proxy.obfs.clone().unwrap_or_else(|| "plain".to_string()),
                    obfs_param: proxy.obfs_param.clone().filter(|p| !p.is_empty()),
                }),
            )
            .with_extras(proxy.extras()),
        )
    }

    fn to_structured(node: &Node, credential: &ShadowsocksRCredential) -> Mapping {
        let mut map = ProxyMap::new(node, "ssr");
        map.insert("cipher", credential.cipher.as_str())
            .insert("password", credential.password.as_str())
            .insert("protocol", credential.protocol.as_str())
            .insert_opt("protocol-param", credential.protocol_param.as_deref())
            .insert("obfs", credential.obfs.as_str())
            .insert_opt("obfs-param", credential.obfs_param.as_deref())
            .insert_extras(&node.extras);
        map.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Protocol;

    fn ssr_uri(body: &str) -> String {
        format!("ssr://{}", encode_base64_url(body))
    }

    fn credential(node: &Node) -> ShadowsocksRCredential {
        if let Credential::ShadowsocksR(c) = &node.credential {
            c.clone()
        } else {
            panic!("Expected ShadowsocksR credential");
        }
    }

    #[test]
    fn test_ssr_decode() {
        let body = format!(
            "1.2.3.4:8388:auth_aes128_md5:aes-256-cfb:tls1.2_ticket_auth:{}/?obfsparam={}&remarks={}&group={}",
            encode_base64_url("secret"),
            encode_base64_url("bing.com"),
            encode_base64_url("香港 SSR"),
            encode_base64_url("G1"),
        );
        let node = ShadowsocksRCodec::decode(&ssr_uri(&body)).unwrap();

        assert_eq!(node.protocol(), Protocol::ShadowsocksR);
        assert_eq!(node.name, "香港 SSR");
        assert_eq!(node.endpoint, Endpoint::new("1.2.3.4", 8388));
        let cred = credential(&node);
        assert_eq!(cred.password, "secret");
        assert_eq!(cred.protocol, "auth_aes128_md5");
        assert_eq!(cred.cipher, "aes-256-cfb");
        assert_eq!(cred.obfs, "tls1.2_ticket_auth");
        assert_eq!(cred.obfs_param.as_deref(), Some("bing.com"));
        assert_eq!(cred.protocol_param, None);
        assert_eq!(node.extra_str("group"), Some("G1"));
    }

    #[test]
    fn test_ssr_ipv6_host() {
        let body = format!("2001:db8::1:443:origin:aes-128-ctr:plain:{}", encode_base64_url("pw"));
        let node = ShadowsocksRCodec::decode(&ssr_uri(&body)).unwrap();
        assert_eq!(node.endpoint, Endpoint::new("2001:db8::1", 443));
        assert_eq!(node.name, "2001:db8::1");
    }

    #[test]
    fn test_ssr_round_trip() {
        let body = format!(
            "a.com:443:auth_chain_a:none:http_simple:{}/?protoparam={}&remarks={}",
            encode_base64_url("p:w"),
            encode_base64_url("1:abc"),
            encode_base64_url("R"),
        );
        let node = ShadowsocksRCodec::decode(&ssr_uri(&body)).unwrap();
        let encoded = ShadowsocksRCodec::encode(&node, &credential(&node));
        let back = ShadowsocksRCodec::decode(&encoded).unwrap();
        assert!(node.equivalent(&back));
        assert_eq!(back.name, "R");
    }

    #[test]
    fn test_ssr_errors() {
        assert!(ShadowsocksRCodec::decode("ssr://!!!").is_err());
        assert!(ShadowsocksRCodec::decode(&ssr_uri("a.com:443:origin")).is_err());
        assert!(ShadowsocksRCodec::decode(&ssr_uri("a.com:http:origin:aes-128-ctr:plain:cHc")).is_err());
    }

    #[test]
    fn test_ssr_structured() {
        let map: Mapping = serde_yaml::from_str(
            "name: s\ntype: ssr\nserver: a.com\nport: 443\ncipher: aes-128-ctr\npassword: pw\nprotocol: origin\nobfs: plain\nprotocolparam: x",
        )
        .unwrap();
        let proxy = StructuredProxy::from_mapping(map).unwrap();
        let node = ShadowsocksRCodec::from_structured(&proxy).unwrap();
        assert_eq!(credential(&node).protocol_param.as_deref(), Some("x"));

        let back = ShadowsocksRCodec::to_structured(&node, &credential(&node));
        assert_eq!(
            back.get("protocol-param").and_then(|v| v.as_str()),
            Some("x")
        );
    }
}
