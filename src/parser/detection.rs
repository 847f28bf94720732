//! Subscription format detection
//!
//! Cheap, allocation-light predicates deciding which ingestion strategy is
//! worth trying for a payload. The patterns are compiled once.

use std::sync::LazyLock;

use regex::Regex;

/// Minimum length of a whole-body Base64 payload
pub const MIN_BASE64_BODY_LEN: usize = 20;

static BASE64_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+/=_-]+$").expect("base64 body pattern is valid")
});

static KNOWN_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(vmess|vless|trojan|ss|ssr|hysteria|hysteria2|hy2|tuic|anytls|socks5|socks)://",
    )
    .expect("known scheme pattern is valid")
});

static ANY_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*)://").expect("scheme pattern is valid")
});

/// Returns the whitespace-stripped body when it looks like one Base64 blob
pub fn base64_body(content: &str) -> Option<String> {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    (cleaned.len() > MIN_BASE64_BODY_LEN && BASE64_BODY.is_match(&cleaned)).then_some(cleaned)
}

/// Structured documents are recognized by their top-level list keys
pub fn is_structured(content: &str) -> bool {
    content.contains("proxies:") || content.contains("nodes:")
}

/// SIP008 payloads are JSON objects or bare arrays
pub fn is_json(content: &str) -> bool {
    let trimmed = content.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Checks if a line starts with a scheme one of the codecs understands
pub fn is_known_proxy_uri(line: &str) -> bool {
    KNOWN_SCHEME.is_match(line)
}

/// Extracts the scheme of any `scheme://` string
pub fn uri_scheme(uri: &str) -> Option<&str> {
    ANY_SCHEME
        .captures(uri)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
