use crate::error::{FleetError, Result};
use crate::multiaddr::multiaddr;
use serde::{Deserialize, Serialize};

/// Number of ports a storage daemon or cluster peer needs
pub const PORTS_PER_INSTANCE: usize = 3;

/// Half-open port range `[min, max)` assigned to one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Result<Self> {
        if min >= max {
            return Err(FleetError::InvalidArgument {
                message: format!("empty port range [{}, {})", min, max),
            });
        }
        Ok(Self { min, max })
    }

    /// Range of the host at `index` when every host gets `ports_per_host`
    /// ports starting at `base`.
    ///
    /// The exclusive bound must fit a `u16`, so port 65535 is never part of
    /// a host range; a range that would need it is rejected.
    pub fn for_host(base: u16, ports_per_host: u16, index: usize) -> Result<Self> {
        let min = base as u64 + index as u64 * ports_per_host as u64;
        let max = min + ports_per_host as u64;
        if max > u16::MAX as u64 {
            return Err(FleetError::InvalidArgument {
                message: format!(
                    "host {} range starting at {} overflows the port space",
                    index, min
                ),
            });
        }
        Self::new(min as u16, max as u16)
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.min && port < self.max
    }

    pub fn len(&self) -> usize {
        (self.max - self.min) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.min >= self.max
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.min, self.max)
    }
}

/// Replication factor bounds handed to the cluster coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationBounds {
    pub min: u32,
    pub max: u32,
}

impl ReplicationBounds {
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min == 0 || min > max {
            return Err(FleetError::InvalidArgument {
                message: format!("invalid replication bounds min={} max={}", min, max),
            });
        }
        Ok(Self { min, max })
    }
}

impl Default for ReplicationBounds {
    fn default() -> Self {
        Self { min: 3, max: 3 }
    }
}

/// Shared secret of one cluster group (leader plus its followers)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Length of the hex encoding of a 32-byte secret
    pub const HEX_LEN: usize = 64;

    /// Wrap an already-encoded secret, checking its shape
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        let well_formed = hex.len() == Self::HEX_LEN
            && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(FleetError::InvalidArgument {
                message: "credential must be 64 lowercase hex characters".to_string(),
            });
        }
        Ok(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used in log lines
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({}..)", self.short())
    }
}

/// Role of a host inside one cluster group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Initializes the coordinator without a bootstrap address
    Leader,

    /// Joins through the leader's cluster-transport address
    Follower,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Leader => write!(f, "leader"),
            NodeRole::Follower => write!(f, "follower"),
        }
    }
}

/// A launched storage daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInstance {
    pub host_name: String,
    pub ip: String,
    pub swarm_port: u16,
    pub api_port: u16,
    pub gateway_port: u16,
}

impl StorageInstance {
    pub fn api_addr(&self) -> String {
        multiaddr(&self.ip, self.api_port)
    }

    pub fn gateway_addr(&self) -> String {
        multiaddr(&self.ip, self.gateway_port)
    }

    pub fn swarm_addr(&self) -> String {
        multiaddr(&self.ip, self.swarm_port)
    }

    pub fn ports(&self) -> [u16; PORTS_PER_INSTANCE] {
        [self.swarm_port, self.api_port, self.gateway_port]
    }
}

/// A formed cluster-coordinator process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInstance {
    pub host_name: String,
    pub ip: String,
    /// Multiaddress of the storage daemon API this peer drives
    pub storage_api: String,
    pub rest_api_port: u16,
    pub proxy_port: u16,
    pub cluster_port: u16,
    pub replication: ReplicationBounds,
}

impl ClusterInstance {
    pub fn rest_api_addr(&self) -> String {
        multiaddr(&self.ip, self.rest_api_port)
    }

    pub fn proxy_addr(&self) -> String {
        multiaddr(&self.ip, self.proxy_port)
    }

    /// Internal cluster-transport address; followers bootstrap from it
    pub fn cluster_addr(&self) -> String {
        multiaddr(&self.ip, self.cluster_port)
    }

    pub fn ports(&self) -> [u16; PORTS_PER_INSTANCE] {
        [self.rest_api_port, self.proxy_port, self.cluster_port]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ClusterInstance {
        ClusterInstance {
            host_name: "node_0".to_string(),
            ip: "10.0.0.1".to_string(),
            storage_api: "/ip4/10.0.0.1/tcp/14001".to_string(),
            rest_api_port: 14003,
            proxy_port: 14004,
            cluster_port: 14005,
            replication: ReplicationBounds::default(),
        }
    }

    #[test]
    fn test_port_range_for_host() {
        let range = PortRange::for_host(14000, 1000, 0).unwrap();
        assert_eq!(range, PortRange { min: 14000, max: 15000 });
        assert!(range.contains(14000));
        assert!(!range.contains(15000));
        assert_eq!(range.len(), 1000);

        let third = PortRange::for_host(14000, 1000, 2).unwrap();
        assert_eq!(third.min, 16000);
        assert_eq!(third.to_string(), "[16000, 17000)");
    }

    #[test]
    fn test_port_range_overflow() {
        assert!(PortRange::for_host(60000, 1000, 10).is_err());
        assert!(PortRange::new(5, 5).is_err());

        // the last range ends at 65535 exclusive
        let last = PortRange::for_host(64535, 1000, 0).unwrap();
        assert_eq!(last.max, 65535);
        assert!(PortRange::for_host(64536, 1000, 0).is_err());
    }

    #[test]
    fn test_replication_bounds() {
        assert!(ReplicationBounds::new(1, 3).is_ok());
        assert!(ReplicationBounds::new(0, 3).is_err());
        assert!(ReplicationBounds::new(4, 3).is_err());
        assert_eq!(ReplicationBounds::default(), ReplicationBounds { min: 3, max: 3 });
    }

    #[test]
    fn test_credential_shape() {
        let hex = "ab".repeat(32);
        let credential = Credential::from_hex(hex.clone()).unwrap();
        assert_eq!(credential.as_str(), hex);
        assert_eq!(format!("{:?}", credential), "Credential(abababab..)");

        assert!(Credential::from_hex("abc").is_err());
        assert!(Credential::from_hex("AB".repeat(32)).is_err());
    }

    #[test]
    fn test_cluster_instance_addresses() {
        let instance = instance();
        assert_eq!(instance.rest_api_addr(), "/ip4/10.0.0.1/tcp/14003");
        assert_eq!(instance.proxy_addr(), "/ip4/10.0.0.1/tcp/14004");
        assert_eq!(instance.cluster_addr(), "/ip4/10.0.0.1/tcp/14005");
        assert_eq!(instance.ports(), [14003, 14004, 14005]);
    }

    #[test]
    fn test_cluster_instance_serialization() {
        let json = serde_json::to_string(&instance()).unwrap();
        let back: ClusterInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(back, instance());
    }

    #[test]
    fn test_role_serialization() {
        let role: NodeRole = serde_yaml::from_str("follower").unwrap();
        assert_eq!(role, NodeRole::Follower);
        assert_eq!(NodeRole::Leader.to_string(), "leader");
    }
}
