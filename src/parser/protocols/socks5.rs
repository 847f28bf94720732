//! SOCKS5 codec
//!
//! Format: socks5://[user:pass@]host:port#name
//! Some providers Base64-encode the whole `user:pass` userinfo; both forms are
//! accepted, `socks://` included.

use serde_yaml::Mapping;
use tracing::trace;

use crate::node::{Credential, Endpoint, Node, Socks5Credential, display_name};
use crate::parser::base64::decode_base64_utf8;
use crate::parser::error::ParseResult;
use crate::parser::structured::{ProxyMap, StructuredProxy};

use super::{ProtocolCodec, QueryBuilder, encode_fragment, parse_uri_parts};

/// Codec for SOCKS5 (socks5:// and socks://) URIs
pub struct Socks5Codec;

impl Socks5Codec {
    fn userinfo(username: String, password: Option<String>) -> Socks5Credential {
        match password {
            Some(password) => Socks5Credential {
                username: Some(username).filter(|u| !u.is_empty()),
                password: Some(password).filter(|p| !p.is_empty()),
            },
            None if username.is_empty() => Socks5Credential::default(),
            None => match decode_base64_utf8(&username)
                .ok()
                .and_then(|decoded| {
                    decoded
                        .split_once(':')
                        .map(|(u, p)| (u.to_string(), p.to_string()))
                }) {
                Some((user, pass)) => Socks5Credential {
                    username: Some(user).filter(|u| !u.is_empty()),
                    password: Some(pass).filter(|p| !p.is_empty()),
                },
                None => Socks5Credential {
                    username: Some(username),
                    password: None,
                },
            },
        }
    }
}

impl ProtocolCodec for Socks5Codec {
    type Credential = Socks5Credential;

    const SCHEMES: &'static [&'static str] = &["socks5", "socks"];

    fn decode(uri: &str) -> ParseResult<Node> {
        trace!("Parsing SOCKS5 URI");
        let parts = parse_uri_parts(uri, "socks5")?;
        let credential = Self::userinfo(parts.username, parts.password);

        Ok(Node::new(
            display_name(parts.name, &parts.host),
            Endpoint::new(parts.host, parts.port),
            Credential::Socks5(credential),
        )
        .with_extras(parts.params.into_extras()))
    }

    fn encode(node: &Node, credential: &Socks5Credential) -> String {
        let userinfo = match (&credential.username, &credential.password) {
            (Some(user), Some(pass)) => format!(
                "{}:{}@",
                urlencoding::encode(user),
                urlencoding::encode(pass)
            ),
            (Some(user), None) => format!("{}@", urlencoding::encode(user)),
            (None, Some(pass)) => format!(":{}@", urlencoding::encode(pass)),
            (None, None) => String::new(),
        };

        let mut query = QueryBuilder::new();
        query.push_extras(&node.extras, &[]);

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

        let credential = Socks5Credential {
            username: proxy.username.clone().filter(|u| !u.is_empty()),
            password: proxy.password.clone().filter(|p| !p.is_empty()),
        };

        let mut node = Node::new(proxy.display_name(), endpoint, Credential::Socks5(credential));
        node.transport.tls = proxy.tls_opts(false);
        Some(node.with_extras(proxy.extras()))
    }

    fn to_structured(node: &Node, credential: &Socks5Credential) -> Mapping {
        let mut map = ProxyMap::new(node, "socks5");
        map.insert_opt("username", credential.username.as_deref())
            .insert_opt("password", credential.password.as_deref());
        if let Some(tls) = node.tls() {
            map.insert("tls", true).insert_tls(Some(tls), "sni");
        }
        map.insert_extras(&node.extras);
        map.build()
    }
}
