pub mod ports;
pub mod credential;
pub mod configurer;
pub mod runner;
pub mod daemon;
pub mod health;
pub mod host;
pub mod orchestrator;
pub mod topology;
pub mod types;

pub use ports::{allocate, HostPorts};
pub use credential::issue;
pub use configurer::{ClusterEnv, ClusterPorts, InstanceConfigurer, StoragePorts};
pub use runner::{BashRunner, CommandOutput, CommandRunner, ShellCommand};
pub use daemon::{DaemonHandle, DaemonState};
pub use health::Readiness;
pub use host::Host;
pub use orchestrator::BootstrapOrchestrator;
pub use topology::{Fleet, GroupOutcome, GroupSpec, HostSpec, TopologyPlan};
pub use types::*;

use fleetbench_common::ReplicationBounds;
use std::path::PathBuf;
use std::time::Duration;

/// Bootstrap configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Storage daemon executable
    pub storage_bin: String,

    /// Cluster coordinator executable
    pub coordinator_bin: String,

    /// Consensus mode passed to the coordinator's init (`--consensus`)
    pub consensus: Option<String>,

    /// Root of the per-host, per-instance configuration directories
    pub config_root: PathBuf,

    /// First port of host 0's range
    pub base_port: u16,

    /// Size of each host's port range
    pub ports_per_host: u16,

    /// Replication factor bounds for every formed peer
    pub replication: ReplicationBounds,

    /// How to wait for a freshly launched storage daemon
    pub storage_readiness: Readiness,

    /// How to wait for a freshly launched cluster peer
    pub cluster_readiness: Readiness,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            storage_bin: "ipfs".to_string(),
            coordinator_bin: "ipfs-cluster-service".to_string(),
            consensus: Some("crdt".to_string()),
            config_root: PathBuf::from("configs"),
            base_port: 14000,
            ports_per_host: 1000,
            replication: ReplicationBounds::default(),
            storage_readiness: Readiness::Fixed(Duration::from_secs(5)),
            cluster_readiness: Readiness::Fixed(Duration::from_secs(2)),
        }
    }
}
