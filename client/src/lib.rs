pub mod rest_client;
pub mod config;

use fleetbench_common::Result;
use std::path::Path;
use std::sync::Arc;

pub use config::*;
pub use rest_client::*;

/// Client interface for one storage member
#[async_trait::async_trait]
pub trait StorageClient: Send + Sync {
    /// Add a file; returns its content identifier
    async fn add(&self, path: &Path) -> Result<String>;

    /// Fetch the content behind `cid`
    async fn cat(&self, cid: &str) -> Result<Vec<u8>>;

    /// Peer identity of the member, doubles as a health check
    async fn id(&self) -> Result<String>;

    /// Address this client talks to
    fn endpoint(&self) -> &str;
}

/// Turns member addresses from the fleet description into clients
pub trait ClientFactory: Send + Sync {
    fn connect(&self, address: &str) -> Result<Arc<dyn StorageClient>>;
}

/// Builds [`HttpStorageClient`]s sharing one base configuration
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    template: ClientConfig,
}

impl HttpClientFactory {
    /// `template.endpoint` is replaced per member
    pub fn new(template: ClientConfig) -> Self {
        Self { template }
    }
}

impl ClientFactory for HttpClientFactory {
    fn connect(&self, address: &str) -> Result<Arc<dyn StorageClient>> {
        let config = ClientConfig {
            endpoint: address.to_string(),
            ..self.template.clone()
        };
        Ok(Arc::new(HttpStorageClient::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_uses_member_address() {
        let mut template = ClientConfig::default();
        template.timeout_seconds = Some(30);

        let client = HttpClientFactory::new(template)
            .connect("/ip4/10.0.0.2/tcp/15004")
            .unwrap();
        assert_eq!(client.endpoint(), "/ip4/10.0.0.2/tcp/15004");
    }

    #[test]
    fn test_factory_rejects_bad_address() {
        assert!(HttpClientFactory::default().connect("/ip4/nowhere").is_err());
    }
}
