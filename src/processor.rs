//! Node Processor
//!
//! Post-parse transformation applied to every subscription:
//! 1. Filtering by exclude/keep rules
//! 2. Optional label prefixing of display names
//! 3. De-duplication by semantic fingerprint

pub mod dedup;
pub mod filter;

pub use dedup::{dedup, fingerprint};
pub use filter::{FilterMode, FilterRules};

use tracing::trace;

use crate::node::Node;
use crate::parser::ParseOptions;

/// Separator between the label and the original name
const LABEL_SEPARATOR: &str = " - ";

/// Filters, prefixes and de-duplicates the nodes of one subscription
pub fn process(nodes: Vec<Node>, label: &str, options: &ParseOptions) -> Vec<Node> {
    let mut nodes = match options.exclude.as_deref() {
        Some(rules) if !rules.trim().is_empty() => FilterRules::parse(rules).apply(nodes),
        _ => nodes,
    };

    if options.prepend_label {
        for node in &mut nodes {
            prefix_label(node, label);
        }
    }

    dedup(nodes)
}

/// Rewrites the name to `"<label> - <name>"` unless it already starts with the label
///
/// The name is the single source for every encoding: VMess writes it to the
/// JSON `ps` field and URI protocols to the fragment.
pub fn prefix_label(node: &mut Node, label: &str) {
    let label = label.trim();
    if label.is_empty() || node.name.starts_with(label) {
        return;
    }
    let prefixed = format!("{}{}{}", label, LABEL_SEPARATOR, node.name);
    trace!("Renaming '{}' to '{}'", node.name, prefixed);
    node.name = prefixed;
}
