//! Configuration generator module
//!
//! Fetches every subscription concurrently, runs each body through the
//! parser, merges the results and renders one target document.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::emitter::{self, Target};
use crate::node::Node;
use crate::parser;
use crate::processor;

// Sub-modules
pub mod generator_config;
pub mod helpers;
pub mod subscription;

// Re-exports
pub use generator_config::GeneratorConfig;
pub use helpers::{expand_tilde, fetch_text, http_client, read_source};
pub use subscription::Subscription;

// ============================================================================
// Generator
// ============================================================================

/// Generator that orchestrates fetch, parse, merge and emit
pub struct Generator {
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Load generator from path or URL
    pub async fn load(path_or_url: &str) -> Result<Self> {
        let config = GeneratorConfig::load(path_or_url).await?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Fetch and parse all subscriptions into one deduplicated list
    ///
    /// A subscription that fails to fetch is logged and skipped.
    pub async fn collect_nodes(&self) -> Result<Vec<Node>> {
        let client = http_client(self.config.timeout())?;
        let total = self.config.subscriptions.len();
        debug!("Starting to fetch {} subscription(s)", total);

        let mut tasks = JoinSet::new();
        for (index, sub) in self.config.subscriptions.iter().cloned().enumerate() {
            let client = client.clone();
            tasks.spawn(async move {
                info!(
                    "Fetching subscription [{}/{}]: '{}' from {}",
                    index + 1,
                    total,
                    sub.name,
                    sub.url
                );
                let body = helpers::read_source(&client, &sub.url).await;
                (index, sub, body)
            });
        }

        let mut fetched = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            let (index, sub, body) = joined.context("Subscription fetch task panicked")?;
            match body {
                Ok(body) => fetched.push((index, sub, body)),
                Err(e) => {
                    warn!("Failed to fetch subscription '{}': {}", sub.name, e);
                    debug!("Error details for '{}': {:?}", sub.name, e);
                }
            }
        }
        // Keep config order regardless of completion order
        fetched.sort_by_key(|(index, _, _)| *index);

        let mut nodes = Vec::new();
        for (_, sub, body) in &fetched {
            let parsed = parser::parse(body, &sub.name, &sub.parse_options());
            for node in &parsed {
                debug!("  - {}: {} ({})", sub.name, node.name, node.protocol());
            }
            nodes.extend(parsed);
        }

        let merged = nodes.len();
        let nodes = processor::dedup(nodes);
        info!(
            "{} of {} subscription(s) fetched, {} nodes ({} after merge dedup)",
            fetched.len(),
            total,
            merged,
            nodes.len()
        );

        Ok(nodes)
    }

    /// Run the generation process and return the document
    pub async fn generate(&self, target: Target) -> Result<String> {
        info!("Starting {} document generation", target);
        let nodes = self.collect_nodes().await?;
        if nodes.is_empty() {
            warn!("No nodes collected, emitting a DIRECT-only document");
        }

        emitter::emit(target, &nodes, &self.config.label)
            .with_context(|| format!("Failed to render {} document", target))
    }

    /// Generate and write to output file
    pub async fn generate_to_file(
        &self,
        output_override: Option<&str>,
        target_override: Option<Target>,
    ) -> Result<()> {
        let target = target_override.unwrap_or(self.config.target);
        let document = self.generate(target).await?;

        let output_path = output_override.unwrap_or(&self.config.output);
        let expanded_path = expand_tilde(output_path);
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create output directory {:?}", parent))?;
        }

        tokio::fs::write(path, &document)
            .await
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        info!("Config written to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_GENERATOR_TOML: &str = r#"
    target = "sing-box"
    output = "./out/config.json"
    label = "home"
    timeout_secs = 10

    [[subscriptions]]
    name = "MyProvider"
    url = "https://example.com/subscription-url"
    prepend_label = true
    exclude = "expire"
    "#;

    const MINIMAL_GENERATOR_TOML: &str = r#"
[[subscriptions]]
name = "Provider1"
url = "https://example.com/sub1"
"#;

    #[test]
    fn test_parse_full_generator_config() {
        let config = GeneratorConfig::from_toml(EXAMPLE_GENERATOR_TOML).unwrap();

        assert_eq!(config.target, Target::SingBox);
        assert_eq!(config.output, "./out/config.json");
        assert_eq!(config.label, "home");
        assert_eq!(config.timeout().as_secs(), 10);
        assert_eq!(config.subscriptions.len(), 1);
        assert_eq!(config.subscriptions[0].name, "MyProvider");
        assert!(config.subscriptions[0].prepend_label);
        assert_eq!(config.subscriptions[0].exclude.as_deref(), Some("expire"));
    }

    #[test]
    fn test_parse_minimal_generator_config() {
        let config = GeneratorConfig::from_toml(MINIMAL_GENERATOR_TOML).unwrap();

        assert_eq!(config.target, Target::ClashMeta);
        assert_eq!(config.output, "./out/config.yaml");
        assert_eq!(config.label, "subweave");
        assert_eq!(config.timeout_secs, 30);
        assert!(!config.subscriptions[0].prepend_label);
    }

    #[test]
    fn test_parse_multiple_subscriptions() {
        let toml = r#"
[[subscriptions]]
name = "Provider1"
url = "https://example.com/sub1"

[[subscriptions]]
name = "Provider2"
url = "~/nodes.txt"
"#;
        let config = GeneratorConfig::from_toml(toml).unwrap();
        assert_eq!(config.subscriptions.len(), 2);
        assert_eq!(config.subscriptions[0].name, "Provider1");
        assert_eq!(config.subscriptions[1].name, "Provider2");
    }

    #[test]
    fn test_parse_no_subscriptions_fails() {
        let toml = r#"
target = "surge"
subscriptions = []
"#;
        let result = GeneratorConfig::from_toml(toml);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("At least one subscription is required")
        );
    }

    #[test]
    fn test_parse_missing_subscriptions_fails() {
        assert!(GeneratorConfig::from_toml("target = \"loon\"").is_err());
    }

    #[test]
    fn test_parse_empty_url_fails() {
        let toml = r#"
[[subscriptions]]
name = "Broken"
url = " "
"#;
        let err = GeneratorConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("Broken"));
    }

    #[test]
    fn test_parse_unknown_target_fails() {
        let toml = r#"
target = "quantumult"

[[subscriptions]]
name = "Provider1"
url = "https://example.com/sub1"
"#;
        assert!(GeneratorConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_parse_zero_timeout_fails() {
        let toml = r#"
timeout_secs = 0

[[subscriptions]]
name = "Provider1"
url = "https://example.com/sub1"
"#;
        assert!(GeneratorConfig::from_toml(toml).is_err());
    }
}
