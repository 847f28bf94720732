use serde::{Deserialize, Serialize};

use crate::config::util::is_false;

/// Experimental block: cache file and the Clash API used by dashboards
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Experimental {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<CacheFile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clash_api: Option<ClashApi>,
}

/// Persists selector choices across restarts
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CacheFile {
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub store_fakeip: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ClashApi {
    /// RESTful web API listening address; the API is disabled when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_controller: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ui: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<String>,
}

impl Experimental {
    /// Cache file plus a local Clash API on `127.0.0.1:9090`
    pub fn with_dashboard() -> Self {
        Self {
            cache_file: Some(CacheFile {
                enabled: true,
                path: Some("cache.db".to_string()),
                store_fakeip: false,
            }),
            clash_api: Some(ClashApi {
                external_controller: Some("127.0.0.1:9090".to_string()),
                external_ui: Some("ui".to_string()),
                default_mode: Some("rule".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_dashboard() {
        let json = serde_json::to_value(Experimental::with_dashboard()).unwrap();
        assert_eq!(json["cache_file"]["enabled"], true);
        assert!(json["cache_file"].get("store_fakeip").is_none());
        assert_eq!(json["clash_api"]["external_controller"], "127.0.0.1:9090");
    }

    #[test]
    fn test_default_serializes_empty() {
        let json = serde_json::to_string(&Experimental::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
