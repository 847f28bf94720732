//! Target Document Emitters
//!
//! Each emitter renders a node list into one client's configuration
//! document, including the policy scaffolding from [`policy`]. A node the
//! target cannot represent is skipped with a debug log; it never fails the
//! document. An empty node list still yields a document whose groups fall
//! back to `DIRECT`.

pub mod clash;
pub mod loon;
pub mod policy;
pub mod singbox;
pub mod surge;

pub use clash::ClashEmitter;
pub use loon::LoonEmitter;
pub use singbox::SingBoxEmitter;
pub use surge::SurgeEmitter;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::node::Node;

// ============================================================================
// Target
// ============================================================================

/// Client document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// mihomo / Clash-Meta YAML
    #[default]
    ClashMeta,
    /// sing-box JSON
    SingBox,
    /// Surge INI
    Surge,
    /// Loon INI
    Loon,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::ClashMeta => "clash-meta",
            Target::SingBox => "sing-box",
            Target::Surge => "surge",
            Target::Loon => "loon",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clash-meta" | "clash" | "mihomo" => Ok(Target::ClashMeta),
            "sing-box" | "singbox" => Ok(Target::SingBox),
            "surge" => Ok(Target::Surge),
            "loon" => Ok(Target::Loon),
            other => Err(format!("unknown target format: {}", other)),
        }
    }
}

// ============================================================================
// Emitter
// ============================================================================

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("text formatting failed: {0}")]
    Fmt(#[from] fmt::Error),
}

/// Renders nodes into one target document; never mutates its input
pub trait Emitter {
    fn emit(&self, nodes: &[Node], label: &str) -> Result<String, EmitError>;
}

/// Renders `nodes` with the emitter for `target`
pub fn emit(target: Target, nodes: &[Node], label: &str) -> Result<String, EmitError> {
    let document = match target {
        Target::ClashMeta => ClashEmitter.emit(nodes, label)?,
        Target::SingBox => SingBoxEmitter.emit(nodes, label)?,
        Target::Surge => SurgeEmitter.emit(nodes, label)?,
        Target::Loon => LoonEmitter.emit(nodes, label)?,
    };
    info!(
        "Rendered {} document from {} nodes ({} bytes)",
        target,
        nodes.len(),
        document.len()
    );
    Ok(document)
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Hands out unique display names
///
/// Every target keys proxies by name, so a repeated name becomes
/// `name 2`, `name 3` and so on. Policy group names are reserved up front.
#[derive(Debug, Default)]
pub struct NameRegistry {
    taken: HashSet<String>,
}

impl NameRegistry {
    pub fn with_reserved<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            taken: reserved.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{} {}", name, n);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Strips the characters that break `key = a, b` lines
///
/// Line breaks and other control characters become spaces so a name can
/// never open a section or rule of its own.
pub fn ini_safe_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, ',' | '='))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        crate::node::UNNAMED_NODE.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Builds the comma separated value of an INI proxy line
#[derive(Debug, Clone)]
pub struct IniLine {
    parts: Vec<String>,
}

impl IniLine {
    pub fn new(kind: &str, host: &str, port: u16) -> Self {
        Self {
            parts: vec![kind.to_string(), host.to_string(), port.to_string()],
        }
    }

    pub fn push(&mut self, value: impl fmt::Display) -> &mut Self {
        self.parts.push(value.to_string());
        self
    }

    pub fn kv(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
        self.parts.push(format!("{}={}", key, value));
        self
    }

    pub fn kv_opt(&mut self, key: &str, value: Option<impl fmt::Display>) -> &mut Self {
        if let Some(value) = value {
            self.kv(key, value);
        }
        self
    }

    /// Writes `key=true` only when set
    pub fn flag(&mut self, key: &str, enabled: bool) -> &mut Self {
        if enabled {
            self.kv(key, true);
        }
        self
    }

    pub fn join(&self, separator: &str) -> String {
        self.parts.join(separator)
    }
}

/// Appends `[name]` followed by one line per entry and a blank line
pub fn write_ini_section(
    out: &mut String,
    name: &str,
    lines: impl IntoIterator<Item = String>,
) -> fmt::Result {
    use fmt::Write;

    writeln!(out, "[{}]", name)?;
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_names() {
        assert_eq!(Target::default(), Target::ClashMeta);
        assert_eq!("sing-box".parse::<Target>(), Ok(Target::SingBox));
        assert_eq!("Clash".parse::<Target>(), Ok(Target::ClashMeta));
        assert!("quantumult".parse::<Target>().is_err());
        assert_eq!(Target::Loon.to_string(), "loon");

        // clap accepts the same kebab-case names
        assert_eq!(
            <Target as ValueEnum>::from_str("sing-box", false),
            Ok(Target::SingBox)
        );
    }

    #[test]
    fn test_target_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            target: Target,
        }
        let parsed: Wrapper = toml::from_str("target = \"sing-box\"").unwrap();
        assert_eq!(parsed.target, Target::SingBox);
    }

    #[test]
    fn test_name_registry() {
        let mut names = NameRegistry::with_reserved(["DIRECT"]);
        assert_eq!(names.claim("HK"), "HK");
        assert_eq!(names.claim("HK"), "HK 2");
        assert_eq!(names.claim("HK"), "HK 3");
        assert_eq!(names.claim("DIRECT"), "DIRECT 2");
    }

    #[test]
    fn test_ini_safe_name() {
        assert_eq!(ini_safe_name("HK, 01 = fast"), "HK 01  fast");
        assert_eq!(ini_safe_name(",="), crate::node::UNNAMED_NODE);
        assert_eq!(ini_safe_name("X\n[Rule]\r\nFINAL,REJECT"), "X [Rule]  FINALREJECT");
        assert_eq!(ini_safe_name("\n\t"), crate::node::UNNAMED_NODE);
    }

    #[test]
    fn test_ini_line() {
        let mut line = IniLine::new("ss", "a.com", 8388);
        line.kv("password", "p")
            .kv_opt("obfs", None::<&str>)
            .flag("tfo", false)
            .flag("udp-relay", true);
        assert_eq!(line.join(", "), "ss, a.com, 8388, password=p, udp-relay=true");
        assert_eq!(line.join(","), "ss,a.com,8388,password=p,udp-relay=true");
    }

    #[test]
    fn test_write_ini_section() {
        let mut out = String::new();
        write_ini_section(&mut out, "Rule", vec!["FINAL,DIRECT".to_string()]).unwrap();
        assert_eq!(out, "[Rule]\nFINAL,DIRECT\n\n");
    }
}
