use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::emitter::Target;

use super::helpers::{expand_tilde, fetch_text, http_client, is_remote};
use super::subscription::Subscription;

// ============================================================================
// Generator Config Types
// ============================================================================

/// Generator configuration parsed from TOML file
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GeneratorConfig {
    /// Output document format, default clash-meta
    #[serde(default)]
    pub target: Target,

    /// Output file path, default "./out/config.yaml"
    #[serde(default = "default_output")]
    pub output: String,

    /// Label written into the document header
    #[serde(default = "default_label")]
    pub label: String,

    /// Per-fetch timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Subscriptions list (required - at least one)
    pub subscriptions: Vec<Subscription>,
}

// ============================================================================
// Generator Implementation
// ============================================================================

impl GeneratorConfig {
    /// Parse generator config from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: GeneratorConfig =
            toml::from_str(content).context("Failed to parse generator config TOML")?;

        if config.subscriptions.is_empty() {
            anyhow::bail!("At least one subscription is required");
        }
        if let Some(sub) = config.subscriptions.iter().find(|s| s.url.trim().is_empty()) {
            anyhow::bail!("Subscription '{}' has an empty url", sub.name);
        }
        if config.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Load generator config from file path
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read generator config from {:?}", path))?;
        Self::from_toml(&content)
    }

    /// Load generator config from file path or URL
    pub async fn load(path_or_url: &str) -> Result<Self> {
        if is_remote(path_or_url) {
            Self::from_url(path_or_url).await
        } else {
            let expanded = expand_tilde(path_or_url);
            Self::from_file(Path::new(&expanded)).await
        }
    }

    /// Load generator config from URL
    pub async fn from_url(url: &str) -> Result<Self> {
        let client = http_client(Duration::from_secs(default_timeout_secs()))?;
        let content = fetch_text(&client, url).await?;
        Self::from_toml(&content)
    }
}

fn default_output() -> String {
    "./out/config.yaml".to_string()
}

fn default_label() -> String {
    "subweave".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}
