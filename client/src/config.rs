use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("endpoint must not be empty")]
    EmptyEndpoint,

    #[error("timeout must be positive when set")]
    ZeroTimeout,

    #[error("user agent must not be empty")]
    EmptyUserAgent,
}

/// Settings for a storage daemon HTTP client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Multiaddress (`/ip4/<ip>/tcp/<port>`), `host:port` or URL
    pub endpoint: String,

    /// Per-request timeout; `None` waits as long as the daemon takes
    pub timeout_seconds: Option<u64>,

    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "/ip4/127.0.0.1/tcp/5001".to_string(),
            timeout_seconds: None,
            user_agent: format!("fleetbench/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if self.timeout_seconds == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.user_agent.is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(ClientConfig::default().validate().is_ok());
        assert!(ClientConfig::new(" ").validate().is_err());

        let mut config = ClientConfig::new("10.0.0.1:5001");
        config.timeout_seconds = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }
}
