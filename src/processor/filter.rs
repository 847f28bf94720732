//! Exclude / keep filtering
//!
//! Rules are newline separated. A rule is either `proto:<a>,<b>` (protocol
//! names) or free text, which is treated as a case-insensitive regex over the
//! node name; all free-text rules are OR-ed into one pattern.
//!
//! A single `keep:`-prefixed rule switches the whole set to whitelist mode.
//! In that mode every rule (prefixed or not) describes what to keep.

use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, warn};

use crate::node::{Node, Protocol};

const KEEP_PREFIX: &str = "keep:";
const PROTO_PREFIX: &str = "proto:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Drop nodes matching any rule
    Exclude,
    /// Retain only nodes matching some rule
    Keep,
}

/// A compiled rule set
#[derive(Debug, Clone)]
pub struct FilterRules {
    mode: FilterMode,
    protocols: HashSet<Protocol>,
    name_pattern: Option<Regex>,
}

impl FilterRules {
    pub fn parse(rules: &str) -> Self {
        let lines: Vec<&str> = rules
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let mode = if lines.iter().any(|l| l.starts_with(KEEP_PREFIX)) {
            FilterMode::Keep
        } else {
            FilterMode::Exclude
        };

        let mut protocols = HashSet::new();
        let mut fragments = Vec::new();
        for line in lines {
            let rule = line.strip_prefix(KEEP_PREFIX).unwrap_or(line).trim();
            if let Some(list) = rule.strip_prefix(PROTO_PREFIX) {
                for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                    match name.parse::<Protocol>() {
                        Ok(protocol) => {
                            protocols.insert(protocol);
                        }
                        Err(e) => warn!("Ignoring filter rule: {}", e),
                    }
                }
            } else if !rule.is_empty() {
                fragments.push(rule.to_string());
            }
        }

        debug!(
            "Filter rules: mode {:?}, {} protocols, {} name patterns",
            mode,
            protocols.len(),
            fragments.len()
        );

        Self {
            mode,
            protocols,
            name_pattern: compile_pattern(&fragments),
        }
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// True when no rule would ever match
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty() && self.name_pattern.is_none()
    }

    /// An exclude set with nothing in it lets every node through
    fn passes_everything(&self) -> bool {
        self.mode == FilterMode::Exclude && self.is_empty()
    }

    fn matches(&self, node: &Node) -> bool {
        self.protocols.contains(&node.protocol())
            || self
                .name_pattern
                .as_ref()
                .is_some_and(|re| re.is_match(&node.name))
    }

    /// Whether `node` survives the rule set
    pub fn retains(&self, node: &Node) -> bool {
        if self.passes_everything() {
            return true;
        }
        match self.mode {
            FilterMode::Exclude => !self.matches(node),
            FilterMode::Keep => self.matches(node),
        }
    }

    /// Selects the surviving nodes; the nodes themselves are left untouched
    pub fn apply(&self, nodes: Vec<Node>) -> Vec<Node> {
        if self.passes_everything() {
            return nodes;
        }
        let before = nodes.len();
        let kept: Vec<Node> = nodes.into_iter().filter(|n| self.retains(n)).collect();
        debug!("Filter kept {} of {} nodes", kept.len(), before);
        kept
    }
}

/// Joins free-text rules into one case-insensitive alternation
///
/// Rules that are not valid regexes are matched literally.
fn compile_pattern(fragments: &[String]) -> Option<Regex> {
    if fragments.is_empty() {
        return None;
    }

    let joined = format!("(?i)(?:{})", fragments.join("|"));
    match Regex::new(&joined) {
        Ok(re) => Some(re),
        Err(e) => {
            debug!("Filter pattern is not a valid regex ({}), matching literally", e);
            let escaped: Vec<String> = fragments.iter().map(|f| regex::escape(f)).collect();
            Regex::new(&format!("(?i)(?:{})", escaped.join("|"))).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::decode_uri;

    fn nodes() -> Vec<Node> {
        [
            "vless://1111@a.com:443#HK 01",
            "trojan://pw@b.com:443#JP 01",
            "ss://YWVzLTI1Ni1nY206cA@c.com:8388#US 01",
            "hy2://pw@d.com:443#HK 02",
            "tuic://u:p@e.com:443#Expire 2026-01-01",
        ]
        .iter()
        .map(|uri| decode_uri(uri).unwrap())
        .collect()
    }

    fn names(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_keep_protocols() {
        let kept = FilterRules::parse("keep:proto:vless,trojan").apply(nodes());
        assert_eq!(names(&kept), vec!["HK 01", "JP 01"]);
    }

    #[test]
    fn test_exclude_by_name_and_protocol() {
        let rules = FilterRules::parse("expire\nproto:ss");
        assert_eq!(rules.mode(), FilterMode::Exclude);
        let kept = rules.apply(nodes());
        assert_eq!(names(&kept), vec!["HK 01", "JP 01", "HK 02"]);
    }

    #[test]
    fn test_any_keep_rule_switches_to_whitelist() {
        let rules = FilterRules::parse("proto:ss\nkeep:^HK");
        assert_eq!(rules.mode(), FilterMode::Keep);
        let kept = rules.apply(nodes());
        assert_eq!(names(&kept), vec!["HK 01", "US 01", "HK 02"]);
    }

    #[test]
    fn test_invalid_regex_matches_literally() {
        let kept = FilterRules::parse("HK (").apply(nodes());
        assert_eq!(kept.len(), 5);
        let kept = FilterRules::parse("keep:01 [").apply(nodes());
        assert!(kept.is_empty());
    }

    #[test]
    fn test_empty_rules_keep_everything() {
        assert_eq!(FilterRules::parse("").apply(nodes()).len(), 5);
        assert_eq!(FilterRules::parse("proto:nonsense").apply(nodes()).len(), 5);
    }

    #[test]
    fn test_whitelist_without_usable_rules_keeps_nothing() {
        let rules = FilterRules::parse("keep:proto:nonsense");
        assert_eq!(rules.mode(), FilterMode::Keep);
        assert!(rules.is_empty());
        assert!(rules.apply(nodes()).is_empty());

        let rules = FilterRules::parse("keep:");
        assert_eq!(rules.mode(), FilterMode::Keep);
        assert!(rules.apply(nodes()).is_empty());
        assert!(!rules.retains(&nodes()[0]));
    }
}
