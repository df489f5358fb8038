use std::fmt;

use thiserror::Error;

/// Pipeline stage of an IP lookup, carried by network errors for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStage {
    Direct,
    Proxied,
}

impl fmt::Display for CheckStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStage::Direct => write!(f, "direct"),
            CheckStage::Proxied => write!(f, "proxied"),
        }
    }
}

/// Unified error type for the xray-checker application
#[derive(Error, Debug)]
pub enum CheckerError {
    // Link parsing errors
    #[error("Invalid proxy link: {0}")]
    ParseLink(String),

    #[error("Unsupported link scheme: {0}")]
    UnsupportedScheme(String),

    // Config generation errors
    #[error("Template error: {0}")]
    Template(String),

    #[error("Render error: {0}")]
    Render(String),

    // Subprocess supervision errors
    #[error("Failed to start proxy engine: {0}")]
    ProcessStart(String),

    #[error("Proxy engine not ready on {addr} after {timeout_secs}s")]
    ReadinessTimeout { addr: String, timeout_secs: u64 },

    // Connectivity check errors
    #[error("Network error during {stage} IP lookup: {message}")]
    Network { stage: CheckStage, message: String },

    // Reporting errors
    #[error("Report delivery failed: {0}")]
    ReportFailed(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Duplicate endpoint link: {0}")]
    DuplicateEndpoint(String),

    // Runtime config read-back errors
    #[error("Invalid runtime config: {0}")]
    InvalidRuntimeConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // HTTP client construction errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Result type alias for xray-checker operations
pub type Result<T> = std::result::Result<T, CheckerError>;

impl CheckerError {
    /// Whether this error should abort startup (as opposed to failing one job)
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            CheckerError::InvalidConfig(_)
                | CheckerError::UnknownProvider(_)
                | CheckerError::DuplicateEndpoint(_)
                | CheckerError::ParseLink(_)
                | CheckerError::UnsupportedScheme(_)
                | CheckerError::Template(_)
        )
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for CheckerError {
    fn from(err: url::ParseError) -> Self {
        CheckerError::ParseLink(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_stage_display() {
        assert_eq!(CheckStage::Direct.to_string(), "direct");
        assert_eq!(CheckStage::Proxied.to_string(), "proxied");
    }

    #[test]
    fn test_startup_fatal_classification() {
        assert!(CheckerError::UnknownProvider("x".to_string()).is_startup_fatal());
        assert!(CheckerError::ParseLink("bad".to_string()).is_startup_fatal());
        assert!(!CheckerError::ProcessStart("gone".to_string()).is_startup_fatal());
        assert!(!CheckerError::Network {
            stage: CheckStage::Proxied,
            message: "timeout".to_string()
        }
        .is_startup_fatal());
    }

    #[test]
    fn test_network_error_carries_stage() {
        let err = CheckerError::Network {
            stage: CheckStage::Proxied,
            message: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("proxied"));
    }
}
