//! Policy scaffolding shared by all emitters
//!
//! Every document gets the same shape: a top-level selector, a latency
//! auto-selector, one selector per traffic scenario and a catch-all. Rules
//! bind remote rule sets to those groups; each emitter only decides how a
//! rule set is addressed in its own format.

use crate::emitter::NameRegistry;

pub const DIRECT: &str = "DIRECT";
pub const REJECT: &str = "REJECT";

pub const PROXY_GROUP: &str = "🚀 Proxy";
pub const AUTO_GROUP: &str = "♻️ Auto";
pub const FINAL_GROUP: &str = "🐟 Final";

pub const TEST_URL: &str = "https://www.gstatic.com/generate_204";
pub const TEST_INTERVAL_SECS: u32 = 300;
pub const TEST_TOLERANCE_MS: u32 = 50;

// ============================================================================
// Rule Sources
// ============================================================================

/// A category of traffic and where each format finds its rule list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSource {
    /// Geosite category name
    pub geosite: &'static str,
    /// GeoIP category name, when the category has address ranges
    pub geoip: Option<&'static str>,
    /// Directory and file stem in the INI rule list repository
    pub list: &'static str,
}

impl RuleSource {
    pub fn geosite_tag(&self) -> String {
        format!("geosite-{}", self.geosite)
    }

    pub fn geoip_tag(&self) -> Option<String> {
        self.geoip.map(|ip| format!("geoip-{}", ip))
    }

    /// mihomo binary domain list
    pub fn clash_geosite_url(&self) -> String {
        format!(
            "https://raw.githubusercontent.com/MetaCubeX/meta-rules-dat/meta/geo/geosite/{}.mrs",
            self.geosite
        )
    }

    pub fn clash_geoip_url(&self) -> Option<String> {
        self.geoip.map(|ip| {
            format!(
                "https://raw.githubusercontent.com/MetaCubeX/meta-rules-dat/meta/geo/geoip/{}.mrs",
                ip
            )
        })
    }

    /// sing-box binary (`.srs`) domain rule set
    pub fn singbox_geosite_url(&self) -> String {
        format!(
            "https://raw.githubusercontent.com/SagerNet/sing-geosite/rule-set/geosite-{}.srs",
            self.geosite
        )
    }

    pub fn singbox_geoip_url(&self) -> Option<String> {
        self.geoip.map(|ip| {
            format!(
                "https://raw.githubusercontent.com/MetaCubeX/meta-rules-dat/sing/geo/geoip/{}.srs",
                ip
            )
        })
    }

    /// Text rule list for `flavor` (`Surge` or `Loon`)
    pub fn ini_list_url(&self, flavor: &str) -> String {
        format!(
            "https://raw.githubusercontent.com/blackmatrix7/ios_rule_script/master/rule/{flavor}/{list}/{list}.list",
            flavor = flavor,
            list = self.list
        )
    }
}

const PRIVATE: RuleSource = RuleSource {
    geosite: "private",
    geoip: Some("private"),
    list: "Lan",
};

const CHINA: RuleSource = RuleSource {
    geosite: "cn",
    geoip: Some("cn"),
    list: "China",
};

// ============================================================================
// Scenarios
// ============================================================================

/// A selector group dedicated to one kind of traffic
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub group: &'static str,
    pub source: RuleSource,
    /// Offer `DIRECT` first, for services that usually work without a proxy
    pub prefer_direct: bool,
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        group: "📲 Telegram",
        source: RuleSource {
            geosite: "telegram",
            geoip: Some("telegram"),
            list: "Telegram",
        },
        prefer_direct: false,
    },
    Scenario {
        group: "🤖 OpenAI",
        source: RuleSource {
            geosite: "openai",
            geoip: None,
            list: "OpenAI",
        },
        prefer_direct: false,
    },
    Scenario {
        group: "🎥 Netflix",
        source: RuleSource {
            geosite: "netflix",
            geoip: Some("netflix"),
            list: "Netflix",
        },
        prefer_direct: false,
    },
    Scenario {
        group: "📹 YouTube",
        source: RuleSource {
            geosite: "youtube",
            geoip: None,
            list: "YouTube",
        },
        prefer_direct: false,
    },
    Scenario {
        group: "🍎 Apple",
        source: RuleSource {
            geosite: "apple",
            geoip: None,
            list: "Apple",
        },
        prefer_direct: true,
    },
    Scenario {
        group: "Ⓜ️ Microsoft",
        source: RuleSource {
            geosite: "microsoft",
            geoip: None,
            list: "Microsoft",
        },
        prefer_direct: true,
    },
    Scenario {
        group: "🌍 Global",
        source: RuleSource {
            geosite: "geolocation-!cn",
            geoip: None,
            list: "Global",
        },
        prefer_direct: false,
    },
];

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Select,
    UrlTest,
}

/// A proxy group; `members` is never empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyGroup {
    pub name: String,
    pub kind: GroupKind,
    pub members: Vec<String>,
}

/// Traffic matching `source` goes to `target` (a group name or `DIRECT`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub source: RuleSource,
    pub target: String,
}

/// Groups and rules of one document
#[derive(Debug, Clone)]
pub struct Policy {
    pub groups: Vec<PolicyGroup>,
    /// Ordered, first match wins
    pub rules: Vec<PolicyRule>,
    /// Catch-all target
    pub final_target: String,
}

impl Policy {
    /// Builds the scaffolding around `proxies` (already unique names)
    ///
    /// Without proxies the auto-selector is left out and every group
    /// resolves to `DIRECT`.
    pub fn build(proxies: &[String]) -> Self {
        let has_proxies = !proxies.is_empty();
        let mut groups = Vec::new();

        let mut main = Vec::new();
        if has_proxies {
            main.push(AUTO_GROUP.to_string());
            main.extend(proxies.iter().cloned());
        }
        main.push(DIRECT.to_string());
        groups.push(PolicyGroup {
            name: PROXY_GROUP.to_string(),
            kind: GroupKind::Select,
            members: main,
        });

        if has_proxies {
            groups.push(PolicyGroup {
                name: AUTO_GROUP.to_string(),
                kind: GroupKind::UrlTest,
                members: proxies.to_vec(),
            });
        }

        for scenario in SCENARIOS {
            groups.push(PolicyGroup {
                name: scenario.group.to_string(),
                kind: GroupKind::Select,
                members: scenario_members(scenario.prefer_direct, proxies),
            });
        }

        groups.push(PolicyGroup {
            name: FINAL_GROUP.to_string(),
            kind: GroupKind::Select,
            members: scenario_members(false, proxies),
        });

        let mut rules = vec![PolicyRule {
            source: PRIVATE,
            target: DIRECT.to_string(),
        }];
        rules.extend(SCENARIOS.iter().map(|s| PolicyRule {
            source: s.source,
            target: s.group.to_string(),
        }));
        rules.push(PolicyRule {
            source: CHINA,
            target: DIRECT.to_string(),
        });

        Self {
            groups,
            rules,
            final_target: FINAL_GROUP.to_string(),
        }
    }

    /// Every rule source in rule order, without duplicates
    pub fn sources(&self) -> Vec<RuleSource> {
        let mut sources: Vec<RuleSource> = Vec::new();
        for rule in &self.rules {
            if !sources.contains(&rule.source) {
                sources.push(rule.source);
            }
        }
        sources
    }

    /// Whether `name` is a group, a built-in policy or one of `proxies`
    pub fn resolves(&self, name: &str, proxies: &[String]) -> bool {
        name == DIRECT
            || name == REJECT
            || self.groups.iter().any(|g| g.name == name)
            || proxies.iter().any(|p| p == name)
    }
}

fn scenario_members(prefer_direct: bool, proxies: &[String]) -> Vec<String> {
    let mut members = Vec::new();
    if prefer_direct {
        members.push(DIRECT.to_string());
    }
    members.push(PROXY_GROUP.to_string());
    if !proxies.is_empty() {
        members.push(AUTO_GROUP.to_string());
    }
    if !prefer_direct {
        members.push(DIRECT.to_string());
    }
    members.extend(proxies.iter().cloned());
    members
}

/// Names no proxy may take
pub fn reserved_names() -> Vec<&'static str> {
    let mut names = vec![DIRECT, REJECT, PROXY_GROUP, AUTO_GROUP, FINAL_GROUP];
    names.extend(SCENARIOS.iter().map(|s| s.group));
    names
}

/// A registry that already holds the group and built-in names
pub fn name_registry() -> NameRegistry {
    NameRegistry::with_reserved(reserved_names())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxies() -> Vec<String> {
        vec!["HK".to_string(), "JP".to_string()]
    }

    #[test]
    fn test_policy_groups_with_proxies() {
        let policy = Policy::build(&proxies());
        assert_eq!(policy.groups[0].name, PROXY_GROUP);
        assert_eq!(policy.groups[0].members, vec![AUTO_GROUP, "HK", "JP", DIRECT]);
        assert_eq!(policy.groups[1].kind, GroupKind::UrlTest);
        assert_eq!(policy.groups[1].members, vec!["HK", "JP"]);
        assert_eq!(policy.groups.len(), 2 + SCENARIOS.len() + 1);

        let apple = policy.groups.iter().find(|g| g.name == "🍎 Apple").unwrap();
        assert_eq!(apple.members[0], DIRECT);
    }

    #[test]
    fn test_policy_without_proxies_resolves_to_direct() {
        let policy = Policy::build(&[]);
        assert!(policy.groups.iter().all(|g| g.name != AUTO_GROUP));
        assert_eq!(policy.groups[0].members, vec![DIRECT]);

        for group in &policy.groups {
            assert!(!group.members.is_empty());
            for member in &group.members {
                assert!(policy.resolves(member, &[]), "dangling {}", member);
            }
        }
    }

    #[test]
    fn test_every_reference_resolves() {
        let proxies = proxies();
        let policy = Policy::build(&proxies);
        for group in &policy.groups {
            for member in &group.members {
                assert!(policy.resolves(member, &proxies));
            }
        }
        for rule in &policy.rules {
            assert!(policy.resolves(&rule.target, &proxies));
        }
        assert!(policy.resolves(&policy.final_target, &proxies));
    }

    #[test]
    fn test_rules_order() {
        let policy = Policy::build(&proxies());
        assert_eq!(policy.rules.first().unwrap().source.geosite, "private");
        assert_eq!(policy.rules.last().unwrap().source.geosite, "cn");
        assert_eq!(policy.sources().len(), SCENARIOS.len() + 2);
    }

    #[test]
    fn test_rule_source_urls() {
        let telegram = SCENARIOS[0].source;
        assert_eq!(telegram.geosite_tag(), "geosite-telegram");
        assert_eq!(telegram.geoip_tag().as_deref(), Some("geoip-telegram"));
        assert!(telegram.clash_geosite_url().ends_with("/geosite/telegram.mrs"));
        assert!(telegram.singbox_geosite_url().ends_with("/geosite-telegram.srs"));
        assert!(
            telegram
                .ini_list_url("Surge")
                .ends_with("/rule/Surge/Telegram/Telegram.list")
        );
        assert!(SCENARIOS[1].source.clash_geoip_url().is_none());
    }

    #[test]
    fn test_reserved_names() {
        let mut names = name_registry();
        assert_eq!(names.claim(PROXY_GROUP), format!("{} 2", PROXY_GROUP));
        assert_eq!(names.claim("HK"), "HK");
    }
}
