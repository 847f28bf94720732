//! De-duplication by semantic fingerprint
//!
//! Two nodes are duplicates when their fingerprints match; display names
//! never take part. VMess is fingerprinted by its canonical JSON body with
//! `ps`/`remark` removed, every other protocol by its share URI without the
//! fragment.

use std::collections::HashSet;

use tracing::debug;

use crate::node::{Node, Protocol};
use crate::parser::base64::decode_base64_utf8;
use crate::parser::encode_uri;

/// Display-name keys inside the VMess JSON body
const VMESS_NAME_KEYS: &[&str] = &["ps", "remark", "remarks"];

/// Canonical identity of a node, independent of its display name
pub fn fingerprint(node: &Node) -> String {
    // Names can live inside the URI body (SSR remarks), so encode without one
    let mut unnamed = node.clone();
    unnamed.name.clear();
    let uri = encode_uri(&unnamed);

    if node.protocol() == Protocol::Vmess
        && let Some(canonical) = vmess_canonical_json(&uri)
    {
        return canonical;
    }

    match uri.split_once('#') {
        Some((body, _)) => body.to_string(),
        None => uri,
    }
}

/// `vmess://BASE64(JSON)` as sorted-key JSON without name fields
fn vmess_canonical_json(uri: &str) -> Option<String> {
    let body = uri.strip_prefix("vmess://")?;
    let (body, _) = body.split_once('#').unwrap_or((body, ""));
    let json = decode_base64_utf8(body).ok()?;
    let mut value: serde_json::Value = serde_json::from_str(&json).ok()?;
    let object = value.as_object_mut()?;
    for key in VMESS_NAME_KEYS {
        object.remove(*key);
    }
    // serde_json maps are ordered by key
    serde_json::to_string(&value).ok()
}

/// Drops later nodes whose fingerprint was already seen
pub fn dedup(nodes: Vec<Node>) -> Vec<Node> {
    let before = nodes.len();
    let mut seen = HashSet::with_capacity(before);
    let unique: Vec<Node> = nodes
        .into_iter()
        .filter(|node| seen.insert(fingerprint(node)))
        .collect();

    if unique.len() < before {
        debug!("Removed {} duplicate nodes", before - unique.len());
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::base64::encode_base64;
    use crate::parser::decode_uri;

    fn vmess(ps: &str, extra: &str) -> Node {
        let json = format!(
            r#"{{"v":"2","ps":"{}","add":"a.com","port":"443","id":"u-1","aid":"0","net":"ws","path":"/p"{}}}"#,
            ps, extra
        );
        decode_uri(&format!("vmess://{}", encode_base64(&json))).unwrap()
    }

    #[test]
    fn test_fragment_is_ignored() {
        let a = decode_uri("trojan://pw@a.com:443?sni=s.com#NameA").unwrap();
        let b = decode_uri("trojan://pw@a.com:443?sni=s.com#NameB").unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(dedup(vec![a, b]).len(), 1);
    }

    #[test]
    fn test_vmess_ps_is_ignored() {
        assert_eq!(fingerprint(&vmess("A", "")), fingerprint(&vmess("B", "")));
        assert_ne!(
            fingerprint(&vmess("A", "")),
            fingerprint(&vmess("A", r#","host":"h.com""#))
        );
        assert!(fingerprint(&vmess("A", "")).starts_with('{'));
    }

    #[test]
    fn test_different_endpoints_are_kept() {
        let a = decode_uri("trojan://pw@a.com:443#X").unwrap();
        let b = decode_uri("trojan://pw@a.com:8443#X").unwrap();
        assert_eq!(dedup(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let a = decode_uri("hy2://pw@a.com:443#First").unwrap();
        let b = decode_uri("hy2://pw@a.com:443#Second").unwrap();
        let unique = dedup(vec![a, b]);
        assert_eq!(unique[0].name, "First");
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let nodes: Vec<Node> = [
            "trojan://pw@a.com:443#1",
            "trojan://pw@a.com:443#2",
            "vless://1111@b.com:443#3",
            "wireguard://k@c.com:51820#4",
            "wireguard://k@c.com:51820#5",
        ]
        .iter()
        .map(|uri| decode_uri(uri).unwrap())
        .collect();

        let once = dedup(nodes);
        let once_names: Vec<String> = once.iter().map(|n| n.name.clone()).collect();
        let twice = dedup(once);
        let twice_names: Vec<String> = twice.iter().map(|n| n.name.clone()).collect();
        assert_eq!(once_names, vec!["1", "3", "4"]);
        assert_eq!(once_names, twice_names);
    }
}
