//! Subscription Ingestion Pipeline
//!
//! This module turns an arbitrary subscription payload into nodes:
//! - Detecting the payload shape (Base64 blob, structured document, SIP008
//!   JSON, plain URI list)
//! - Decoding each entry through the protocol codecs
//! - Handing the result to the node processor (filtering, label prefixing,
//!   de-duplication)
//!
//! Detection strategies run in a fixed order and the first one producing at
//! least one node wins. A failing strategy is logged and skipped; the
//! pipeline itself never fails.

pub mod base64;
pub mod detection;
pub mod error;
pub mod protocols;
pub mod sip008;
pub mod structured;

pub use error::{ParseError, ParseResult};
pub use protocols::{decode_uri, encode_uri, node_from_structured, node_to_structured};

use tracing::{debug, info, trace, warn};

use crate::node::Node;
use crate::processor;

use self::base64::decode_base64_utf8;
use self::detection::{base64_body, is_json, is_known_proxy_uri, is_structured};

// ============================================================================
// Options
// ============================================================================

/// Per-subscription processing options
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Newline separated filter rules, see [`processor::filter`]
    pub exclude: Option<String>,
    /// Prefix node names with the subscription label
    pub prepend_label: bool,
}

// ============================================================================
// Detection Strategies
// ============================================================================

/// A named detection strategy; `None` means "not my format"
struct Strategy {
    name: &'static str,
    run: fn(&str) -> Option<Vec<Node>>,
}

/// Strategies in priority order
const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "base64",
        run: base64_strategy,
    },
    Strategy {
        name: "structured",
        run: structured_strategy,
    },
    Strategy {
        name: "sip008",
        run: sip008_strategy,
    },
    Strategy {
        name: "plain text",
        run: plain_text_strategy,
    },
];

fn base64_strategy(content: &str) -> Option<Vec<Node>> {
    let body = base64_body(content)?;
    let decoded = decode_base64_utf8(&body)
        .map_err(|e| debug!("Whole-body Base64 decode failed: {}", e))
        .ok()?;
    debug!("Base64 decoded content length: {} bytes", decoded.len());
    Some(decode_uri_lines(&decoded, |line| line.contains("://")))
}

fn structured_strategy(content: &str) -> Option<Vec<Node>> {
    if !is_structured(content) {
        return None;
    }
    structured::parse_structured(content)
        .map_err(|e| debug!("Structured document parse failed: {}", e))
        .ok()
}

fn sip008_strategy(content: &str) -> Option<Vec<Node>> {
    if !is_json(content) {
        return None;
    }
    sip008::parse_sip008(content)
        .map_err(|e| debug!("SIP008 parse failed: {}", e))
        .ok()
}

fn plain_text_strategy(content: &str) -> Option<Vec<Node>> {
    Some(decode_uri_lines(content, is_known_proxy_uri))
}

/// Decodes every line accepted by `keep`; undecodable lines are skipped
fn decode_uri_lines(content: &str, keep: fn(&str) -> bool) -> Vec<Node> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && keep(line))
        .filter_map(|line| match decode_uri(line) {
            Ok(node) => Some(node),
            Err(e) => {
                debug!("Skipping line: {}", e);
                None
            }
        })
        .collect()
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs the detection strategies without any post-processing
pub fn detect_nodes(content: &str) -> Vec<Node> {
    let preview: String = content.trim().chars().take(100).collect();
    debug!(
        "Detecting subscription format, content length: {} bytes, preview: {:?}",
        content.len(),
        preview
    );

    for strategy in STRATEGIES {
        trace!("Trying {} strategy", strategy.name);
        match (strategy.run)(content) {
            Some(nodes) if !nodes.is_empty() => {
                debug!("{} strategy produced {} nodes", strategy.name, nodes.len());
                return nodes;
            }
            Some(_) => debug!("{} strategy produced no nodes", strategy.name),
            None => trace!("{} strategy does not apply", strategy.name),
        }
    }

    Vec::new()
}

/// Parses a subscription payload into processed nodes
///
/// Never fails: an unrecognized or empty payload yields an empty list.
pub fn parse(content: &str, label: &str, options: &ParseOptions) -> Vec<Node> {
    let nodes = detect_nodes(content);
    if nodes.is_empty() {
        warn!("Could not find any nodes in subscription '{}'", label);
        return nodes;
    }

    let parsed = nodes.len();
    let nodes = processor::process(nodes, label, options);
    info!(
        "Subscription '{}': {} nodes parsed, {} kept",
        label,
        parsed,
        nodes.len()
    );
    nodes
}
