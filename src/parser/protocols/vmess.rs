//! VMess codec
//!
//! VMess links carry no query string. The whole configuration is a JSON
//! object, Base64-encoded as the URI body:
//! vmess://BASE64({ "v": "2", "ps": "name", "add": "host", "port": "443", ... })
//!
//! Keys the codec does not know are kept in the node extras and written back
//! on encode.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Mapping;
use tracing::trace;

use crate::node::{
    Credential, Endpoint, Network, Node, TlsOpts, Transport, VmessCredential, display_name,
    split_alpn,
};
use crate::parser::base64::{decode_base64_utf8, encode_base64};
use crate::parser::error::{ParseError, ParseResult};
use crate::parser::structured::{ProxyMap, StructuredProxy};

use super::{ProtocolCodec, split_fragment};

/// Cipher used when a link leaves `scy` empty
const DEFAULT_CIPHER: &str = "auto";

/// The link JSON; every value is kept as a string, the way v2rayN writes it
#[derive(Debug, Default, Serialize, Deserialize)]
struct VmessJson {
    #[serde(default, deserialize_with = "lenient_string")]
    v: String,
    #[serde(default, deserialize_with = "lenient_string")]
    ps: String,
    /// Older links name the node here; `ps` wins when both are present
    #[serde(default, deserialize_with = "lenient_string", skip_serializing)]
    remark: String,
    #[serde(default, deserialize_with = "lenient_string")]
    add: String,
    #[serde(default, deserialize_with = "lenient_string")]
    port: String,
    #[serde(default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    aid: String,
    #[serde(default, deserialize_with = "lenient_string")]
    scy: String,
    #[serde(default, deserialize_with = "lenient_string")]
    net: String,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    header_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    host: String,
    #[serde(default, deserialize_with = "lenient_string")]
    path: String,
    #[serde(default, deserialize_with = "lenient_string")]
    tls: String,
    #[serde(default, deserialize_with = "lenient_string")]
    sni: String,
    #[serde(default, deserialize_with = "lenient_string")]
    alpn: String,
    #[serde(default, deserialize_with = "lenient_string")]
    fp: String,
    #[serde(
        default,
        rename = "serviceName",
        deserialize_with = "lenient_string",
        skip_serializing_if = "String::is_empty"
    )]
    service_name: String,
    #[serde(
        default,
        rename = "allowInsecure",
        deserialize_with = "lenient_flag",
        skip_serializing_if = "std::ops::Not::not"
    )]
    allow_insecure: bool,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

fn non_empty(s: String) -> Option<String> {
    (!s.trim().is_empty()).then_some(s)
}

/// Codec for VMess (vmess://) URIs
pub struct VmessCodec;

impl ProtocolCodec for VmessCodec {
    type Credential = VmessCredential;

    const SCHEMES: &'static [&'static str] = &["vmess"];

    fn decode(uri: &str) -> ParseResult<Node> {
        trace!("Parsing VMess URI");
        let body = uri
            .trim()
            .get(Self::SCHEMES[0].len() + 3..)
            .ok_or_else(|| ParseError::malformed("vmess", "missing body"))?;
        let (encoded, fragment) = split_fragment(body);

        let decoded = decode_base64_utf8(encoded)?;
        trace!("Decoded VMess JSON: {}", decoded);
        let json: VmessJson = serde_json::from_str(&decoded)?;

        let host = non_empty(json.add).ok_or_else(|| ParseError::missing("vmess", "add"))?;
        let port = json
            .port
            .trim()
            .parse::<u16>()
            .map_err(|_| ParseError::InvalidPort(json.port.clone()))?;
        let uuid = non_empty(json.id).ok_or_else(|| ParseError::missing("vmess", "id"))?;

        let network = Network::parse(&json.net).unwrap_or_else(|| {
            trace!("Unsupported VMess network '{}', using tcp", json.net);
            Network::Tcp
        });

        let tls = matches!(
            json.tls.trim().to_ascii_lowercase().as_str(),
            "tls" | "xtls" | "true" | "1"
        )
        .then(|| TlsOpts {
            enabled: true,
            sni: non_empty(json.sni),
            alpn: split_alpn(&json.alpn),
            fingerprint: non_empty(json.fp),
            insecure: json.allow_insecure,
            reality: None,
        });

        let (path, service_name) = match network {
            Network::Grpc => (None, non_empty(json.service_name).or(non_empty(json.path))),
            _ => (non_empty(json.path), None),
        };

        let transport = Transport {
            network,
            path,
            host: non_empty(json.host),
            service_name,
            header_type: non_empty(json.header_type).filter(|t| t != "none"),
            tls,
        };

        let credential = VmessCredential {
            uuid,
            alter_id: json.aid.trim().parse().unwrap_or(0),
            cipher: non_empty(json.scy).unwrap_or_else(|| DEFAULT_CIPHER.to_string()),
        };

        let name = display_name(
            fragment.or(non_empty(json.ps)).or(non_empty(json.remark)),
            &host,
        );
        Ok(Node::new(name, Endpoint::new(host, port), Credential::Vmess(credential))
            .with_transport(transport)
            .with_extras(json.extra))
    }

    fn encode(node: &Node, credential: &VmessCredential) -> String {
        let tls = node.tls();
        let transport = &node.transport;
        let path = match transport.network {
            Network::Grpc => transport.service_name.clone(),
            _ => transport.path.clone(),
        };

        let json = VmessJson {
            v: "2".to_string(),
            ps: node.name.clone(),
            remark: String::new(),
            add: node.endpoint.host.clone(),
            port: node.endpoint.port.to_string(),
            id: credential.uuid.clone(),
            aid: credential.alter_id.to_string(),
            scy: credential.cipher.clone(),
            net: transport.network.as_str().to_string(),
            header_type: transport
                .header_type
                .clone()
                .unwrap_or_else(|| "none".to_string()),
            host: transport.host.clone().unwrap_or_default(),
            path: path.unwrap_or_default(),
            tls: if tls.is_some() { "tls" } else { "" }.to_string(),
            sni: tls.and_then(|t| t.sni.clone()).unwrap_or_default(),
            alpn: tls.map(|t| t.alpn.join(",")).unwrap_or_default(),
            fp: tls.and_then(|t| t.fingerprint.clone()).unwrap_or_default(),
            service_name: String::new(),
            allow_insecure: tls.is_some_and(|t| t.insecure),
            extra: node.extras.clone(),
        };

        let body = serde_json::to_string(&json).unwrap_or_default();
        format!("{}://{}", Self::SCHEMES[0], encode_base64(&body))
    }

    fn from_structured(proxy: &StructuredProxy) -> Option<Node> {
        let endpoint = proxy.endpoint()?;
        let uuid = proxy.uuid.clone().filter(|u| !u.is_empty())?;

        let mut transport = proxy.transport();
        transport.tls = proxy.tls_opts(false);

        let credential = VmessCredential {
            uuid,
            alter_id: proxy.alter_id.unwrap_or(0),
            cipher: proxy
                .cipher
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CIPHER.to_string()),
        };

        Some(
            Node::new(proxy.display_name(), endpoint, Credential::Vmess(credential))
                .with_transport(transport)
                .with_extras(proxy.extras()),
        )
    }

    fn to_structured(node: &Node, credential: &VmessCredential) -> Mapping {
        let mut map = ProxyMap::new(node, "vmess");
        map.insert("uuid", credential.uuid.as_str())
            .insert("alterId", credential.alter_id)
            .insert("cipher", credential.cipher.as_str())
            .insert_flag("tls", node.tls().is_some())
            .insert_tls(node.tls(), "servername")
            .insert_transport(&node.transport)
            .insert_extras(&node.extras);
        map.build()
    }
}

// ============================================================================
// Deserialization Helpers
// ============================================================================

/// Accepts strings, numbers, booleans and null, always yielding a string
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        Some(serde_json::Value::String(s)) => matches!(s.trim(), "1" | "true"),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    fn encode_vmess_json(json: &str) -> String {
        format!("vmess://{}", STANDARD.encode(json))
    }

    fn credential(node: &Node) -> VmessCredential {
        if let Credential::Vmess(c) = &node.credential {
            c.clone()
        } else {
            panic!("Expected VMess credential");
        }
    }

    #[test]
    fn test_vmess_basic() {
        let uri = encode_vmess_json(
            r#"{"v":"2","ps":"test-node","add":"example.com","port":443,"id":"uuid-1","aid":0,"scy":"auto","net":"tcp","tls":""}"#,
        );
        let node = VmessCodec::decode(&uri).unwrap();

        assert_eq!(node.name, "test-node");
        assert_eq!(node.endpoint, Endpoint::new("example.com", 443));
        let cred = credential(&node);
        assert_eq!(cred.uuid, "uuid-1");
        assert_eq!(cred.alter_id, 0);
        assert_eq!(cred.cipher, "auto");
        assert!(node.tls().is_none());
    }

    #[test]
    fn test_vmess_string_port_and_aid() {
        let uri = encode_vmess_json(
            r#"{"ps":"n","add":"example.com","port":"8080","id":"u","aid":"64"}"#,
        );
        let node = VmessCodec::decode(&uri).unwrap();
        assert_eq!(node.endpoint.port, 8080);
        assert_eq!(credential(&node).alter_id, 64);
    }

    #[test]
    fn test_vmess_ws_tls() {
        let uri = encode_vmess_json(
            r#"{"v":"2","ps":"ws","add":"a.com","port":"443","id":"u","net":"ws","host":"cdn.com","path":"/ray","tls":"tls","sni":"s.com","alpn":"h2,http/1.1","fp":"chrome"}"#,
        );
        let node = VmessCodec::decode(&uri).unwrap();
        assert_eq!(node.transport.network, Network::Ws);
        assert_eq!(node.transport.path.as_deref(), Some("/ray"));
        assert_eq!(node.transport.host.as_deref(), Some("cdn.com"));
        let tls = node.tls().unwrap();
        assert_eq!(tls.sni.as_deref(), Some("s.com"));
        assert_eq!(tls.alpn, vec!["h2", "http/1.1"]);
        assert_eq!(tls.fingerprint.as_deref(), Some("chrome"));
    }

    #[test]
    fn test_vmess_grpc_service_name_from_path() {
        let uri = encode_vmess_json(
            r#"{"ps":"g","add":"a.com","port":443,"id":"u","net":"grpc","path":"svc"}"#,
        );
        let node = VmessCodec::decode(&uri).unwrap();
        assert_eq!(node.transport.service_name.as_deref(), Some("svc"));
        assert_eq!(node.transport.path, None);
    }

    #[test]
    fn test_vmess_name_fallbacks() {
        let uri = encode_vmess_json(r#"{"add":"a.com","port":443,"id":"u"}"#);
        assert_eq!(VmessCodec::decode(&uri).unwrap().name, "a.com");

        let uri = format!("{}#Fragment", encode_vmess_json(r#"{"ps":"ps","add":"a.com","port":443,"id":"u"}"#));
        assert_eq!(VmessCodec::decode(&uri).unwrap().name, "Fragment");
    }

    #[test]
    fn test_vmess_remark_name() {
        let uri = encode_vmess_json(r#"{"ps":"A","remark":"B","add":"a.com","port":443,"id":"u"}"#);
        let node = VmessCodec::decode(&uri).unwrap();
        assert_eq!(node.name, "A");
        assert!(!node.extras.contains_key("remark"));

        let uri = encode_vmess_json(r#"{"remark":"B","add":"a.com","port":443,"id":"u"}"#);
        let node = VmessCodec::decode(&uri).unwrap();
        assert_eq!(node.name, "B");

        let body = VmessCodec::encode(&node, &credential(&node));
        let json = decode_base64_utf8(body.trim_start_matches("vmess://")).unwrap();
        assert!(!json.contains("remark"), "{}", json);
    }

    #[test]
    fn test_vmess_unknown_keys_survive() {
        let uri = encode_vmess_json(
            r#"{"ps":"n","add":"a.com","port":443,"id":"u","custom":"x","mux":{"enabled":true}}"#,
        );
        let node = VmessCodec::decode(&uri).unwrap();
        assert_eq!(node.extra_str("custom"), Some("x"));
        assert!(node.extras.contains_key("mux"));

        let back = VmessCodec::decode(&VmessCodec::encode(&node, &credential(&node))).unwrap();
        assert_eq!(back.extras, node.extras);
    }

    #[test]
    fn test_vmess_round_trip_non_ascii_name() {
        let uri = encode_vmess_json(
            r#"{"v":"2","ps":"香港 01","add":"2001:db8::1","port":"443","id":"u","aid":"2","scy":"aes-128-gcm","net":"h2","host":"h.com","path":"/p","tls":"tls","allowInsecure":true}"#,
        );
        let node = VmessCodec::decode(&uri).unwrap();
        assert!(node.tls().unwrap().insecure);

        let encoded = VmessCodec::encode(&node, &credential(&node));
        assert!(!encoded.contains('#'));
        let back = VmessCodec::decode(&encoded).unwrap();
        assert!(node.equivalent(&back));
        assert_eq!(back.name, "香港 01");
    }

    #[test]
    fn test_vmess_errors() {
        assert!(VmessCodec::decode("vmess://not-base64!!!").is_err());
        assert!(VmessCodec::decode(&encode_vmess_json("not json")).is_err());
        assert!(VmessCodec::decode(&encode_vmess_json(r#"{"port":443,"id":"u"}"#)).is_err());
        assert!(VmessCodec::decode(&encode_vmess_json(r#"{"add":"a.com","port":"x","id":"u"}"#)).is_err());
        assert!(VmessCodec::decode(&encode_vmess_json(r#"{"add":"a.com","port":443}"#)).is_err());
    }

    #[test]
    fn test_vmess_structured_round_trip() {
        let uri = encode_vmess_json(
            r#"{"ps":"n","add":"a.com","port":443,"id":"u","aid":1,"net":"ws","path":"/ws","host":"c.com","tls":"tls","sni":"s.com"}"#,
        );
        let node = VmessCodec::decode(&uri).unwrap();
        let map = VmessCodec::to_structured(&node, &credential(&node));
        let proxy = StructuredProxy::from_mapping(map).unwrap();
        let back = VmessCodec::from_structured(&proxy).unwrap();
        assert!(node.equivalent(&back));
    }
}
