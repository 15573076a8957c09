use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {ms}ms waiting for {what}")]
    Timeout { what: String, ms: u64 },

    #[error("Obstacle '{spec}' could not be resolved")]
    Obstacle { spec: String },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("URL rejected by policy: {0}")]
    Disallowed(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Snapshot failed: {0}")]
    SnapshotFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Site profile error: {0}")]
    ProfileError(String),

    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("General error: {0}")]
    General(String),
}

impl HarvestError {
    pub fn timeout(what: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            ms: timeout.as_millis() as u64,
        }
    }

    pub fn navigation(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::LaunchFailed(_) => vec![
                "Ensure Chrome/Chromium is installed".into(),
                "Try specifying Chrome path with --chrome-path".into(),
            ],
            Self::Navigation { url, .. } => vec![
                "Check network connectivity".into(),
                format!("Verify '{}' is reachable from this machine", url),
                "Raise run.navigation_retries for flaky sites".into(),
            ],
            Self::Timeout { ms, .. } => vec![
                format!("Increase the timeout above {}ms", ms),
                "Run with --verbose to see which condition stalled".into(),
            ],
            Self::Obstacle { spec } => vec![
                format!("Check the detection/confirmation selectors of '{}'", spec),
                "Set run.continue_on_obstacle_failure = true to bypass".into(),
                "Inspect the captured diagnostics snapshots".into(),
            ],
            Self::Script(_) => vec![
                "Check JavaScript syntax".into(),
                "Ensure the pagination entry point exists on the page".into(),
            ],
            Self::ElementNotFound { selector } => vec![
                "Verify the selector syntax is correct".into(),
                format!("Check if element '{}' exists on the page", selector),
            ],
            Self::Disallowed(_) => vec![
                "Review policy.allowed_domains and policy.disallowed_paths".into(),
            ],
            Self::ConfigError(_) | Self::ProfileError(_) => vec![
                "Check configuration file syntax".into(),
                "Run `listing-harvest check --profile <file>` to validate".into(),
            ],
            _ => vec![
                "Run with --verbose for more details".into(),
                "Check the documentation for help".into(),
            ],
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::LaunchFailed(_) => 3,
            Self::Navigation { .. } | Self::Timeout { .. } => 4,
            Self::ElementNotFound { .. } | Self::Obstacle { .. } => 5,
            Self::IoError(_) | Self::SnapshotFailed(_) => 6,
            Self::ConfigError(_)
            | Self::ProfileError(_)
            | Self::TomlDeError(_)
            | Self::TomlSerError(_) => 7,
            Self::Disallowed(_) => 2,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_constructor() {
        let err = HarvestError::timeout("next control", Duration::from_secs(5));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timed out after 5000ms waiting for next control");
    }

    #[test]
    fn test_obstacle_message_names_spec() {
        let err = HarvestError::Obstacle {
            spec: "age-check".into(),
        };
        assert!(err.to_string().contains("age-check"));
        assert!(err.suggestions().iter().any(|s| s.contains("age-check")));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(HarvestError::Cancelled.exit_code(), 130);
        assert_eq!(HarvestError::ConfigError("x".into()).exit_code(), 7);
        assert_eq!(HarvestError::navigation("http://a", "dns").exit_code(), 4);
    }
}
