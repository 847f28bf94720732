//! Error types for subscription decoding
//!
//! Every variant describes input that could not be turned into a node. All of
//! them are recoverable: the pipeline logs the failure and moves on to the
//! next line or strategy.

use thiserror::Error;

/// Failure to decode a share URI, structured entry or payload
#[derive(Debug, Error)]
pub enum ParseError {
    /// The URI could not be split into its components
    #[error("Malformed {scheme} URI: {reason}")]
    MalformedUri {
        /// Scheme of the offending URI
        scheme: String,
        /// What was wrong with it
        reason: String,
    },

    /// A required field (host, port, credential) is missing
    #[error("{protocol} node is missing required field '{field}'")]
    MissingField {
        protocol: &'static str,
        field: &'static str,
    },

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid Base64 content")]
    InvalidBase64,

    #[error("Decoded content is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Input does not have the shape a strategy expects
    #[error("Unsupported input: {0}")]
    Unsupported(String),
}

impl ParseError {
    pub fn malformed(scheme: &str, reason: impl Into<String>) -> Self {
        Self::MalformedUri {
            scheme: scheme.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(protocol: &'static str, field: &'static str) -> Self {
        Self::MissingField { protocol, field }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ParseError::malformed("vless", "missing host").to_string(),
            "Malformed vless URI: missing host"
        );
        assert_eq!(
            ParseError::missing("trojan", "password").to_string(),
            "trojan node is missing required field 'password'"
        );
    }

    #[test]
    fn test_json_error_converts() {
        let err: ParseError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ParseError::Json(_)));
    }
}
