use crate::{ClientConfig, StorageClient};
use fleetbench_common::{parse_multiaddr, FleetError, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

/// HTTP client for a storage daemon's (or a cluster proxy's) `/api/v0` API
#[derive(Debug, Clone)]
pub struct HttpStorageClient {
    client: reqwest::Client,
    base_url: String,
    config: ClientConfig,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
}

impl HttpStorageClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate().map_err(|e| FleetError::Configuration {
            message: e.to_string(),
        })?;

        let base_url = endpoint_url(&config.endpoint)?;

        let mut builder = reqwest::Client::builder().user_agent(&config.user_agent);
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| FleetError::Network {
            message: format!("Failed to create HTTP client: {}", e),
        })?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v0/{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| FleetError::Network {
            message: format!("Request to {} failed: {}", self.config.endpoint, e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FleetError::Network {
                message: format!("{} answered {}: {}", self.config.endpoint, status, body.trim()),
            });
        }

        Ok(response)
    }

    async fn body_text(&self, response: reqwest::Response) -> Result<String> {
        response.text().await.map_err(|e| FleetError::Network {
            message: format!("Failed to read response from {}: {}", self.config.endpoint, e),
        })
    }
}

#[async_trait::async_trait]
impl StorageClient for HttpStorageClient {
    #[instrument(skip(self), fields(endpoint = %self.config.endpoint))]
    async fn add(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let response = self.send(self.client.post(self.url("add")).multipart(form)).await?;
        let body = self.body_text(response).await?;

        let cid = parse_add_response(&body)?;
        debug!("Added {} as {}", path.display(), cid);
        Ok(cid)
    }

    #[instrument(skip(self), fields(endpoint = %self.config.endpoint))]
    async fn cat(&self, cid: &str) -> Result<Vec<u8>> {
        let request = self.client.post(self.url("cat")).query(&[("arg", cid)]);
        let response = self.send(request).await?;
        let bytes = response.bytes().await.map_err(|e| FleetError::Network {
            message: format!("Failed to read {} from {}: {}", cid, self.config.endpoint, e),
        })?;
        Ok(bytes.to_vec())
    }

    async fn id(&self) -> Result<String> {
        let response = self.send(self.client.post(self.url("id"))).await?;
        let body = self.body_text(response).await?;
        let parsed: IdResponse = serde_json::from_str(&body).map_err(|e| FleetError::Network {
            message: format!("Invalid id response from {}: {}", self.config.endpoint, e),
        })?;
        Ok(parsed.id)
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

/// Base URL for a member address.
///
/// Multiaddresses become `http://<ip>:<port>`; `host:port` gets a scheme;
/// URLs are kept minus a trailing slash.
pub fn endpoint_url(address: &str) -> Result<String> {
    let address = address.trim();
    if address.starts_with('/') {
        let socket = parse_multiaddr(address)?;
        return Ok(format!("http://{}", socket));
    }
    if address.starts_with("http://") || address.starts_with("https://") {
        return Ok(address.trim_end_matches('/').to_string());
    }
    if address.is_empty() {
        return Err(FleetError::InvalidArgument {
            message: "empty member address".to_string(),
        });
    }
    Ok(format!("http://{}", address.trim_end_matches('/')))
}

/// `add` streams one JSON object per added entry; the last names the root
fn parse_add_response(body: &str) -> Result<String> {
    let last = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .ok_or_else(|| FleetError::Network {
            message: "empty add response".to_string(),
        })?;

    let parsed: AddResponse = serde_json::from_str(last).map_err(|e| FleetError::Network {
        message: format!("Invalid add response: {}", e),
    })?;
    Ok(parsed.hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("/ip4/10.0.0.1/tcp/14004").unwrap(),
            "http://10.0.0.1:14004"
        );
        assert_eq!(endpoint_url("10.0.0.1:5001").unwrap(), "http://10.0.0.1:5001");
        assert_eq!(
            endpoint_url("http://localhost:9094/").unwrap(),
            "http://localhost:9094"
        );
        assert!(endpoint_url("").is_err());
        assert!(endpoint_url("/ip4/10.0.0.1/udp/1").is_err());
    }

    #[test]
    fn test_parse_add_response() {
        let body = "{\"Name\":\"a\",\"Hash\":\"QmLeaf\",\"Size\":\"10\"}\n\
                    {\"Name\":\"dir\",\"Hash\":\"QmRoot\",\"Size\":\"60\"}\n";
        assert_eq!(parse_add_response(body).unwrap(), "QmRoot");
        assert!(parse_add_response("  \n").is_err());
        assert!(parse_add_response("not json").is_err());
    }

    #[test]
    fn test_client_url_building() {
        let client = HttpStorageClient::new(ClientConfig::new("/ip4/127.0.0.1/tcp/5001")).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5001");
        assert_eq!(client.url("cat"), "http://127.0.0.1:5001/api/v0/cat");
        assert_eq!(client.endpoint(), "/ip4/127.0.0.1/tcp/5001");
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_network_error() {
        let mut config = ClientConfig::new("127.0.0.1:1");
        config.timeout_seconds = Some(2);
        let client = HttpStorageClient::new(config).unwrap();
        let err = client.id().await.unwrap_err();
        assert!(matches!(err, FleetError::Network { .. }));
    }
}
