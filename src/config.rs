//! Typed sing-box document model
//!
//! The sing-box emitter composes these types instead of concatenating JSON
//! text; every field that is unset or default is left out of the output.

use serde::{Deserialize, Serialize};

use crate::config::dns::Dns;
use crate::config::experimental::Experimental;
use crate::config::inbound::Inbound;
use crate::config::log::Log;
use crate::config::outbound::Outbound;
use crate::config::route::Route;

pub mod dns;
pub mod experimental;
pub mod inbound;
pub mod log;
pub mod outbound;
pub mod route;
pub mod shared;
pub mod util;

/// Main sing-box configuration structure
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SingBoxConfig {
    #[serde(default, skip_serializing_if = "Log::is_empty")]
    pub log: Log,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbounds: Vec<Inbound>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbounds: Vec<Outbound>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Experimental>,
}

impl SingBoxConfig {
    pub fn builder() -> SingBoxConfigBuilder {
        SingBoxConfigBuilder::default()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Whether an outbound with `tag` exists
    pub fn has_outbound(&self, tag: &str) -> bool {
        self.outbounds.iter().any(|o| o.tag() == tag)
    }
}

#[derive(Default)]
pub struct SingBoxConfigBuilder {
    config: SingBoxConfig,
}

impl SingBoxConfigBuilder {
    pub fn log(mut self, log: Log) -> Self {
        self.config.log = log;
        self
    }

    pub fn dns(mut self, dns: Dns) -> Self {
        self.config.dns = Some(dns);
        self
    }

    pub fn inbound(mut self, inbound: Inbound) -> Self {
        self.config.inbounds.push(inbound);
        self
    }

    pub fn outbound(mut self, outbound: Outbound) -> Self {
        self.config.outbounds.push(outbound);
        self
    }

    pub fn outbounds(mut self, outbounds: impl IntoIterator<Item = Outbound>) -> Self {
        self.config.outbounds.extend(outbounds);
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.config.route = Some(route);
        self
    }

    pub fn experimental(mut self, experimental: Experimental) -> Self {
        self.config.experimental = Some(experimental);
        self
    }

    pub fn build(self) -> SingBoxConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::inbound::MixedInbound;
    use crate::config::log::LogLevel;
    use crate::config::outbound::SelectorOutbound;
    use crate::config::route::{RouteRule, RuleAction};
    use crate::config::shared::ListenFields;

    #[test]
    fn test_singbox_config_default_serializes_empty() {
        let json = serde_json::to_string(&SingBoxConfig::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_singbox_config_builder() {
        let config = SingBoxConfig::builder()
            .log(Log::with_level(LogLevel::Info))
            .inbound(Inbound::Mixed(MixedInbound {
                tag: "mixed-in".to_string(),
                listen: ListenFields::loopback(2080),
                set_system_proxy: false,
            }))
            .outbound(Outbound::Selector(SelectorOutbound {
                tag: "proxy".to_string(),
                outbounds: vec!["direct".to_string()],
                ..Default::default()
            }))
            .outbounds([Outbound::direct("direct"), Outbound::block("block")])
            .route(
                Route::new().with_final("proxy").add_rule(
                    RouteRule::new()
                        .match_protocol(vec!["dns".to_string()])
                        .with_action(RuleAction::HijackDns),
                ),
            )
            .build();

        assert!(config.has_outbound("block"));
        assert!(!config.has_outbound("missing"));

        let json = config.to_json_pretty().unwrap();
        let parsed: SingBoxConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.log.level, Some(LogLevel::Info));
        assert_eq!(parsed.inbounds.len(), 1);
        assert_eq!(parsed.outbounds.len(), 3);
        assert_eq!(
            parsed.route.unwrap().final_outbound.as_deref(),
            Some("proxy")
        );
    }
}
