use crate::daemon::DaemonHandle;
use fleetbench_common::{ClusterInstance, Credential, NodeRole, StorageInstance};
use std::path::PathBuf;

/// Steps of a single formation on one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormationState {
    Idle,
    AllocatingPorts,
    Initializing,
    Launching,
    Ready,
    Failed,
}

impl std::fmt::Display for FormationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormationState::Idle => write!(f, "idle"),
            FormationState::AllocatingPorts => write!(f, "allocating-ports"),
            FormationState::Initializing => write!(f, "initializing"),
            FormationState::Launching => write!(f, "launching"),
            FormationState::Ready => write!(f, "ready"),
            FormationState::Failed => write!(f, "failed"),
        }
    }
}

/// A storage daemon that reached readiness
#[derive(Debug, Clone)]
pub struct StartedStorage {
    pub instance: StorageInstance,
    /// Config directory passed as `-c`
    pub dir: PathBuf,
    pub daemon: DaemonHandle,
}

/// A cluster peer that reached readiness
#[derive(Debug, Clone)]
pub struct FormedPeer {
    pub instance: ClusterInstance,
    pub role: NodeRole,
    pub credential: Credential,
    pub dir: PathBuf,
    pub daemon: DaemonHandle,
}

impl FormedPeer {
    /// Address followers pass as `--bootstrap`
    pub fn bootstrap_addr(&self) -> String {
        self.instance.cluster_addr()
    }
}

/// Storage daemon plus the cluster peer driving it
#[derive(Debug, Clone)]
pub struct FormedMember {
    pub storage: StartedStorage,
    pub peer: FormedPeer,
}

impl FormedMember {
    pub fn host_name(&self) -> &str {
        &self.peer.instance.host_name
    }

    /// Stop both daemons
    pub fn stop(&self) {
        self.peer.daemon.stop();
        self.storage.daemon.stop();
    }
}
