use anyhow::{bail, Context, Result};
use fleetbench_client::ClientConfig;
use fleetbench_cluster::{OrchestratorConfig, Readiness};
use fleetbench_common::ReplicationBounds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment overrides, e.g. `FLEETBENCH_BASE_PORT=20000`
pub const ENV_PREFIX: &str = "FLEETBENCH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessMode {
    /// Sleep through the warm-up
    #[default]
    Fixed,
    /// Poll the daemon's port, giving up after the warm-up
    Probe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub storage_bin: String,
    pub coordinator_bin: String,
    pub config_root: PathBuf,
    pub work_dir: PathBuf,
    pub fleet_file: PathBuf,
    pub base_port: u16,
    pub ports_per_host: u16,
    pub replication_min: u32,
    pub replication_max: u32,
    /// Empty disables `--consensus`
    pub consensus: Option<String>,
    pub storage_warmup_ms: u64,
    pub cluster_warmup_ms: u64,
    pub readiness: ReadinessMode,
    pub probe_interval_ms: u64,
    pub request_timeout_seconds: Option<u64>,
    pub log_level: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            storage_bin: "ipfs".to_string(),
            coordinator_bin: "ipfs-cluster-service".to_string(),
            config_root: PathBuf::from("./configs"),
            work_dir: PathBuf::from("./files"),
            fleet_file: PathBuf::from("./fleet.txt"),
            base_port: 14000,
            ports_per_host: 1000,
            replication_min: 3,
            replication_max: 3,
            consensus: Some("crdt".to_string()),
            storage_warmup_ms: 5000,
            cluster_warmup_ms: 2000,
            readiness: ReadinessMode::Fixed,
            probe_interval_ms: 200,
            request_timeout_seconds: None,
            log_level: "info".to_string(),
        }
    }
}

impl FleetConfig {
    /// Defaults, then `path` if given, then `FLEETBENCH_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let loaded: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| match path {
                Some(path) => format!("Failed to load configuration from {}", path.display()),
                None => "Failed to load configuration".to_string(),
            })?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ports_per_host == 0 {
            bail!("ports_per_host must be positive");
        }
        if self.readiness == ReadinessMode::Probe && self.probe_interval_ms == 0 {
            bail!("probe_interval_ms must be positive");
        }
        if self.request_timeout_seconds == Some(0) {
            bail!("request_timeout_seconds must be positive when set");
        }
        ReplicationBounds::new(self.replication_min, self.replication_max)?;
        Ok(())
    }

    fn readiness(&self, warmup_ms: u64) -> Readiness {
        let budget = Duration::from_millis(warmup_ms);
        match self.readiness {
            ReadinessMode::Fixed => Readiness::Fixed(budget),
            ReadinessMode::Probe => Readiness::Probe {
                timeout: budget,
                interval: Duration::from_millis(self.probe_interval_ms),
            },
        }
    }

    pub fn orchestrator(&self) -> Result<OrchestratorConfig> {
        Ok(OrchestratorConfig {
            storage_bin: self.storage_bin.clone(),
            coordinator_bin: self.coordinator_bin.clone(),
            consensus: self.consensus.clone().filter(|mode| !mode.trim().is_empty()),
            config_root: self.config_root.clone(),
            base_port: self.base_port,
            ports_per_host: self.ports_per_host,
            replication: ReplicationBounds::new(self.replication_min, self.replication_max)?,
            storage_readiness: self.readiness(self.storage_warmup_ms),
            cluster_readiness: self.readiness(self.cluster_warmup_ms),
        })
    }

    /// Template for member clients; the endpoint is filled in per member
    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            timeout_seconds: self.request_timeout_seconds,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_map_to_orchestrator() {
        let orchestrator = FleetConfig::default().orchestrator().unwrap();
        assert_eq!(orchestrator.base_port, 14000);
        assert_eq!(orchestrator.consensus.as_deref(), Some("crdt"));
        assert_eq!(
            orchestrator.storage_readiness,
            Readiness::Fixed(Duration::from_secs(5))
        );
        assert_eq!(
            orchestrator.cluster_readiness,
            Readiness::Fixed(Duration::from_secs(2))
        );
        assert_eq!(orchestrator.replication, ReplicationBounds::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("fleetbench.yaml");
        std::fs::write(
            &path,
            "base_port: 20000\nreadiness: probe\nstorage_warmup_ms: 8000\nconsensus: \"\"\nrequest_timeout_seconds: 30\n",
        )
        .unwrap();

        let config = FleetConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.base_port, 20000);
        assert_eq!(config.ports_per_host, 1000);
        assert_eq!(config.client().timeout_seconds, Some(30));

        let orchestrator = config.orchestrator().unwrap();
        assert_eq!(orchestrator.consensus, None);
        assert_eq!(
            orchestrator.storage_readiness,
            Readiness::Probe {
                timeout: Duration::from_secs(8),
                interval: Duration::from_millis(200),
            }
        );
    }

    #[test]
    fn test_invalid_replication_rejected() {
        let config = FleetConfig {
            replication_min: 4,
            replication_max: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(config.orchestrator().is_err());
    }
}
