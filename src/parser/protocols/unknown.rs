//! Passthrough for schemes without a codec
//!
//! The raw URI is preserved verbatim so URI-list output can re-emit it. Host
//! and port are recovered on a best-effort basis for naming and dedup.

use serde_yaml::Mapping;
use tracing::trace;
use url::Url;

use crate::node::{Credential, Endpoint, Node, UnknownCredential, display_name};
use crate::parser::detection::uri_scheme;
use crate::parser::error::{ParseError, ParseResult};
use crate::parser::structured::StructuredProxy;

use super::{ProtocolCodec, encode_fragment, split_fragment, unbracket};

/// Codec for any scheme the other codecs do not claim
pub struct UnknownCodec;

impl ProtocolCodec for UnknownCodec {
    type Credential = UnknownCredential;

    const SCHEMES: &'static [&'static str] = &[];

    fn decode(uri: &str) -> ParseResult<Node> {
        let raw = uri.trim();
        let scheme = uri_scheme(raw)
            .ok_or_else(|| ParseError::malformed("", "missing scheme"))?
            .to_ascii_lowercase();
        trace!("Keeping {} URI as passthrough", scheme);

        let (_, name) = split_fragment(raw);
        let endpoint = Url::parse(raw)
            .ok()
            .and_then(|url| {
                let host = url.host_str().map(|h| unbracket(h).to_string())?;
                Some(Endpoint::new(host, url.port().unwrap_or_default()))
            })
            .unwrap_or_default();

        Ok(Node::new(
            display_name(name, &endpoint.host),
            endpoint,
            Credential::Unknown(UnknownCredential {
                scheme,
                raw: raw.to_string(),
            }),
        ))
    }

    /// The raw URI, with its fragment replaced once the node was renamed
    fn encode(node: &Node, credential: &UnknownCredential) -> String {
        let (body, name) = split_fragment(&credential.raw);
        if display_name(name, &node.endpoint.host) == node.name {
            return credential.raw.clone();
        }
        format!("{}{}", body, encode_fragment(&node.name))
    }

    fn from_structured(proxy: &StructuredProxy) -> Option<Node> {
        trace!("No codec for structured type '{}'", proxy.kind);
        None
    }

    /// Unknown nodes never reach structured output; see `node_to_structured`
    fn to_structured(node: &Node, credential: &UnknownCredential) -> Mapping {
        let mut map = Mapping::new();
        map.insert("name".into(), node.name.as_str().into());
        map.insert("type".into(), credential.scheme.as_str().into());
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_keeps_raw_uri() {
        let uri = "wireguard://key@example.com:51820?mtu=1280#wg%20node";
        let node = UnknownCodec::decode(uri).unwrap();
        assert_eq!(node.name, "wg node");
        assert_eq!(node.endpoint, Endpoint::new("example.com", 51820));

        if let Credential::Unknown(c) = &node.credential {
            assert_eq!(c.scheme, "wireguard");
            assert_eq!(UnknownCodec::encode(&node, c), uri);
        } else {
            panic!("Expected unknown credential");
        }
    }

    #[test]
    fn test_unknown_encode_carries_new_name() {
        let mut node = UnknownCodec::decode("wireguard://key@example.com:51820?mtu=1280#wg").unwrap();
        node.name = "Sub - wg".to_string();

        let Credential::Unknown(c) = &node.credential else {
            panic!("Expected unknown credential");
        };
        let uri = UnknownCodec::encode(&node, c);
        assert_eq!(uri, "wireguard://key@example.com:51820?mtu=1280#Sub%20-%20wg");
        assert_eq!(UnknownCodec::decode(&uri).unwrap().name, "Sub - wg");

        let mut bare = UnknownCodec::decode("mystery://opaque-payload").unwrap();
        let Credential::Unknown(c) = bare.credential.clone() else {
            panic!("Expected unknown credential");
        };
        assert_eq!(UnknownCodec::encode(&bare, &c), "mystery://opaque-payload");
        bare.name = "X".to_string();
        assert_eq!(UnknownCodec::encode(&bare, &c), "mystery://opaque-payload#X");
    }

    #[test]
    fn test_unknown_without_authority() {
        let node = UnknownCodec::decode("mystery://opaque-payload").unwrap();
        assert_eq!(node.endpoint.port, 0);
        assert_eq!(node.name, "opaque-payload");
    }

    #[test]
    fn test_unknown_requires_scheme() {
        assert!(UnknownCodec::decode("no scheme here").is_err());
    }
}
