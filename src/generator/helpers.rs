//! Generator utility functions
//!
//! Path expansion, HTTP fetching and reading a source that may be either a
//! URL or a local file.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::get_version;

// ============================================================================
// Path Utilities
// ============================================================================

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = dirs_home()
    {
        return path.replacen("~", &home, 1);
    }
    path.to_string()
}

/// Get home directory path
pub fn dirs_home() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok()
    }
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

// ============================================================================
// HTTP Utilities
// ============================================================================

/// Builds the client shared by every fetch of one run
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("subweave/{}", get_version()))
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Fetch text content from a URL
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    debug!("Fetching URL: {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch URL: {}", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP request failed with status {}: {}", status, url);
    }

    let text = response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from: {}", url))?;

    debug!("Received {} bytes from {}", text.len(), url);
    Ok(text)
}

/// Reads `source` over HTTP(S) or from disk
pub async fn read_source(client: &reqwest::Client, source: &str) -> Result<String> {
    if is_remote(source) {
        fetch_text(client, source).await
    } else {
        let expanded = expand_tilde(source);
        tokio::fs::read_to_string(&expanded)
            .await
            .with_context(|| format!("Failed to read {}", expanded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_expand_tilde_with_home() {
        if let Ok(home) = env::var("HOME") {
            let expanded = expand_tilde("~/sub/list.txt");
            assert!(expanded.starts_with(&home));
            assert!(expanded.ends_with("/sub/list.txt"));
            assert!(!expanded.contains('~'));
        }
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        if let Ok(home) = env::var("HOME") {
            assert_eq!(expand_tilde("~"), home);
        }
    }

    #[test]
    fn test_expand_tilde_leaves_other_paths() {
        for path in ["/etc/subweave.toml", "./relative/path", "/some/~/path"] {
            assert_eq!(expand_tilde(path), path);
        }
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/sub"));
        assert!(is_remote("http://example.com/sub"));
        assert!(!is_remote("./nodes.txt"));
        assert!(!is_remote("ftp://example.com/sub"));
    }

    #[tokio::test]
    async fn test_read_source_missing_file() {
        let client = http_client(Duration::from_secs(1)).unwrap();
        let err = read_source(&client, "/nonexistent/subweave/nodes.txt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
