//! Translates addresses, ports and the cluster secret into the commands,
//! environment and config edits that bring up one storage daemon and one
//! cluster coordinator.

use crate::runner::ShellCommand;
use fleetbench_common::{
    env_assignment, json_array, json_elem, multiaddr, Credential, FleetError, NodeRole,
    ReplicationBounds, Result, PORTS_PER_INSTANCE,
};
use std::path::{Path, PathBuf};

pub const ENV_PEERNAME: &str = "CLUSTER_PEERNAME";
pub const ENV_SECRET: &str = "CLUSTER_SECRET";
pub const ENV_REPLICATION_MIN: &str = "CLUSTER_REPLICATIONFACTORMIN";
pub const ENV_REPLICATION_MAX: &str = "CLUSTER_REPLICATIONFACTORMAX";
pub const ENV_PROXY_NODE_ADDR: &str = "CLUSTER_IPFSPROXY_NODEMULTIADDRESS";
pub const ENV_HTTP_NODE_ADDR: &str = "CLUSTER_IPFSHTTP_NODEMULTIADDRESS";
pub const ENV_RESTAPI_LISTEN: &str = "CLUSTER_RESTAPI_HTTPLISTENMULTIADDRESS";
pub const ENV_PROXY_LISTEN: &str = "CLUSTER_IPFSPROXY_LISTENMULTIADDRESS";
pub const ENV_CLUSTER_LISTEN: &str = "CLUSTER_LISTENMULTIADDRESS";

pub const FIELD_API: &str = "Addresses.API";
pub const FIELD_GATEWAY: &str = "Addresses.Gateway";
pub const FIELD_SWARM: &str = "Addresses.Swarm";

/// Ports of one cluster peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterPorts {
    pub rest_api: u16,
    pub proxy: u16,
    pub cluster: u16,
}

impl ClusterPorts {
    /// Assign allocator output in order: REST API, proxy, cluster transport
    pub fn from_slice(ports: &[u16]) -> Result<Self> {
        match *ports {
            [rest_api, proxy, cluster] => Ok(Self { rest_api, proxy, cluster }),
            _ => Err(wrong_port_count(ports)),
        }
    }
}

/// Ports of one storage daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoragePorts {
    pub swarm: u16,
    pub api: u16,
    pub gateway: u16,
}

impl StoragePorts {
    /// Assign allocator output in order: swarm, API, gateway
    pub fn from_slice(ports: &[u16]) -> Result<Self> {
        match *ports {
            [swarm, api, gateway] => Ok(Self { swarm, api, gateway }),
            _ => Err(wrong_port_count(ports)),
        }
    }
}

fn wrong_port_count(ports: &[u16]) -> FleetError {
    FleetError::InvalidArgument {
        message: format!("expected {} ports, got {}", PORTS_PER_INSTANCE, ports.len()),
    }
}

/// Environment consumed by the coordinator's init step, in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEnv {
    vars: Vec<(&'static str, String)>,
}

impl ClusterEnv {
    pub fn new(
        ip: &str,
        peer_name: &str,
        credential: &Credential,
        replication: ReplicationBounds,
        storage_api: &str,
        ports: ClusterPorts,
    ) -> Self {
        let vars = vec![
            (ENV_PEERNAME, peer_name.to_string()),
            (ENV_SECRET, credential.to_string()),
            (ENV_REPLICATION_MIN, replication.min.to_string()),
            (ENV_REPLICATION_MAX, replication.max.to_string()),
            (ENV_PROXY_NODE_ADDR, storage_api.to_string()),
            (ENV_HTTP_NODE_ADDR, storage_api.to_string()),
            (ENV_RESTAPI_LISTEN, multiaddr(ip, ports.rest_api)),
            (ENV_PROXY_LISTEN, multiaddr(ip, ports.proxy)),
            (ENV_CLUSTER_LISTEN, multiaddr(ip, ports.cluster)),
        ];
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.vars.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// `KEY="value" ` for every variable, concatenated
    pub fn to_shell_prefix(&self) -> String {
        self.vars
            .iter()
            .map(|(k, v)| env_assignment(k, v))
            .collect()
    }
}

/// The three `config --json` edits applied to a fresh storage daemon config
pub fn storage_config_edits(ip: &str, ports: StoragePorts) -> [(&'static str, String); 3] {
    [
        (FIELD_API, json_elem(&multiaddr(ip, ports.api))),
        (FIELD_GATEWAY, json_elem(&multiaddr(ip, ports.gateway))),
        (FIELD_SWARM, json_array(&[multiaddr(ip, ports.swarm)])),
    ]
}

/// Builds directories and command lines for one fleet
#[derive(Debug, Clone)]
pub struct InstanceConfigurer {
    storage_bin: String,
    coordinator_bin: String,
    consensus: Option<String>,
    config_root: PathBuf,
}

impl InstanceConfigurer {
    pub fn new(
        storage_bin: impl Into<String>,
        coordinator_bin: impl Into<String>,
        consensus: Option<String>,
        config_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let config_root = config_root.into();
        // paths are spliced into `bash -c` lines unquoted
        if config_root.to_string_lossy().chars().any(char::is_whitespace) {
            return Err(FleetError::Configuration {
                message: format!(
                    "config root must not contain whitespace: {}",
                    config_root.display()
                ),
            });
        }

        Ok(Self {
            storage_bin: storage_bin.into(),
            coordinator_bin: coordinator_bin.into(),
            consensus,
            config_root,
        })
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    /// `<root>/<host>/ipfs-<port>-<secret>`.
    ///
    /// `instance` is the first port claimed for the daemon; the host's port
    /// ledger keeps it unique among the host's live instances.
    pub fn storage_dir(&self, host: &str, credential: &Credential, instance: u16) -> PathBuf {
        self.config_root
            .join(host)
            .join(format!("ipfs-{}-{}", instance, credential))
    }

    /// Leader: `<root>/<host>/cluster-<port>-<secret>`,
    /// follower: `<root>/<host>/cluster-<host>-<port>-<secret>`
    pub fn cluster_dir(
        &self,
        host: &str,
        role: NodeRole,
        credential: &Credential,
        instance: u16,
    ) -> PathBuf {
        let name = match role {
            NodeRole::Leader => format!("cluster-{}-{}", instance, credential),
            NodeRole::Follower => format!("cluster-{}-{}-{}", host, instance, credential),
        };
        self.config_root.join(host).join(name)
    }

    fn storage(&self, path: &Path) -> ShellCommand {
        ShellCommand::new(&self.storage_bin)
            .arg("-c")
            .arg(path.to_string_lossy())
    }

    fn coordinator(&self, path: &Path) -> ShellCommand {
        ShellCommand::new(&self.coordinator_bin)
            .arg("-c")
            .arg(path.to_string_lossy())
    }

    pub fn storage_init(&self, path: &Path) -> ShellCommand {
        self.storage(path).arg("init")
    }

    pub fn storage_config_edit(&self, path: &Path, field: &str, value: &str) -> ShellCommand {
        self.storage(path)
            .arg("config")
            .arg("--json")
            .arg(field)
            .arg(value)
    }

    pub fn storage_daemon(&self, path: &Path) -> ShellCommand {
        self.storage(path).arg("daemon")
    }

    pub fn cluster_init(&self, path: &Path, env: &ClusterEnv) -> ShellCommand {
        let mut cmd = self.coordinator(path).arg("init");
        if let Some(mode) = &self.consensus {
            cmd = cmd.arg("--consensus").arg(mode);
        }
        cmd.with_prefix(&env.to_shell_prefix())
    }

    pub fn cluster_daemon(&self, path: &Path, bootstrap: Option<&str>) -> ShellCommand {
        let cmd = self.coordinator(path).arg("daemon");
        match bootstrap {
            Some(addr) => cmd.arg("--bootstrap").arg(addr),
            None => cmd,
        }
    }
}

/// Create `path` as an empty directory, discarding anything already there
pub async fn recreate_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential::from_hex("0f".repeat(32)).unwrap()
    }

    fn configurer() -> InstanceConfigurer {
        InstanceConfigurer::new("ipfs", "ipfs-cluster-service", Some("crdt".to_string()), "/srv/fleet")
            .unwrap()
    }

    #[test]
    fn test_cluster_env_order_and_values() {
        let env = ClusterEnv::new(
            "10.0.0.2",
            "node_2",
            &credential(),
            ReplicationBounds::new(2, 4).unwrap(),
            "/ip4/10.0.0.2/tcp/14001",
            ClusterPorts { rest_api: 14003, proxy: 14004, cluster: 14005 },
        );

        let keys: Vec<_> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                ENV_PEERNAME,
                ENV_SECRET,
                ENV_REPLICATION_MIN,
                ENV_REPLICATION_MAX,
                ENV_PROXY_NODE_ADDR,
                ENV_HTTP_NODE_ADDR,
                ENV_RESTAPI_LISTEN,
                ENV_PROXY_LISTEN,
                ENV_CLUSTER_LISTEN,
            ]
        );
        assert_eq!(env.get(ENV_REPLICATION_MIN), Some("2"));
        assert_eq!(env.get(ENV_HTTP_NODE_ADDR), Some("/ip4/10.0.0.2/tcp/14001"));
        assert_eq!(env.get(ENV_CLUSTER_LISTEN), Some("/ip4/10.0.0.2/tcp/14005"));

        let prefix = env.to_shell_prefix();
        assert!(prefix.starts_with("CLUSTER_PEERNAME=\"node_2\" CLUSTER_SECRET=\"0f0f"));
        assert!(prefix.ends_with("CLUSTER_LISTENMULTIADDRESS=\"/ip4/10.0.0.2/tcp/14005\" "));
    }

    #[test]
    fn test_storage_config_edits() {
        let edits = storage_config_edits(
            "10.0.0.2",
            StoragePorts { swarm: 14000, api: 14001, gateway: 14002 },
        );
        assert_eq!(edits[0], (FIELD_API, r#"\"/ip4/10.0.0.2/tcp/14001\""#.to_string()));
        assert_eq!(edits[1], (FIELD_GATEWAY, r#"\"/ip4/10.0.0.2/tcp/14002\""#.to_string()));
        assert_eq!(edits[2], (FIELD_SWARM, r#""[\"/ip4/10.0.0.2/tcp/14000\"]""#.to_string()));
    }

    #[test]
    fn test_ports_from_slice() {
        let ports = ClusterPorts::from_slice(&[1, 2, 3]).unwrap();
        assert_eq!((ports.rest_api, ports.proxy, ports.cluster), (1, 2, 3));
        assert!(StoragePorts::from_slice(&[1, 2]).is_err());
    }

    #[test]
    fn test_directories() {
        let c = configurer();
        let secret = credential();
        assert_eq!(
            c.storage_dir("node_1", &secret, 15000),
            PathBuf::from(format!("/srv/fleet/node_1/ipfs-15000-{}", secret))
        );
        assert_eq!(
            c.cluster_dir("node_1", NodeRole::Leader, &secret, 15003),
            PathBuf::from(format!("/srv/fleet/node_1/cluster-15003-{}", secret))
        );
        assert_eq!(
            c.cluster_dir("node_1", NodeRole::Follower, &secret, 15009),
            PathBuf::from(format!("/srv/fleet/node_1/cluster-node_1-15009-{}", secret))
        );
    }

    #[test]
    fn test_same_group_instances_on_one_host_get_own_dirs() {
        let c = configurer();
        let secret = credential();
        assert_ne!(
            c.storage_dir("node_0", &secret, 14000),
            c.storage_dir("node_0", &secret, 14006)
        );
        assert_ne!(
            c.cluster_dir("node_0", NodeRole::Follower, &secret, 14009),
            c.cluster_dir("node_0", NodeRole::Follower, &secret, 14015)
        );
    }

    #[test]
    fn test_commands() {
        let c = configurer();
        let path = Path::new("/srv/fleet/node_1/x");

        assert_eq!(c.storage_init(path).as_str(), "ipfs -c /srv/fleet/node_1/x init");
        assert_eq!(c.storage_daemon(path).as_str(), "ipfs -c /srv/fleet/node_1/x daemon");
        assert_eq!(
            c.storage_config_edit(path, FIELD_API, r#"\"/ip4/1.2.3.4/tcp/5\""#).as_str(),
            r#"ipfs -c /srv/fleet/node_1/x config --json Addresses.API \"/ip4/1.2.3.4/tcp/5\""#
        );
        assert_eq!(
            c.cluster_daemon(path, None).as_str(),
            "ipfs-cluster-service -c /srv/fleet/node_1/x daemon"
        );
        assert_eq!(
            c.cluster_daemon(path, Some("/ip4/1.2.3.4/tcp/9096")).as_str(),
            "ipfs-cluster-service -c /srv/fleet/node_1/x daemon --bootstrap /ip4/1.2.3.4/tcp/9096"
        );
    }

    #[test]
    fn test_cluster_init_with_env_and_consensus() {
        let env = ClusterEnv::new(
            "1.2.3.4",
            "n",
            &credential(),
            ReplicationBounds::default(),
            "/ip4/1.2.3.4/tcp/1",
            ClusterPorts { rest_api: 2, proxy: 3, cluster: 4 },
        );
        let path = Path::new("/srv/c");

        let cmd = configurer().cluster_init(path, &env);
        assert!(cmd.as_str().starts_with(&env.to_shell_prefix()));
        assert!(cmd.as_str().ends_with("ipfs-cluster-service -c /srv/c init --consensus crdt"));

        let raft = InstanceConfigurer::new("ipfs", "svc", None, "/srv").unwrap();
        assert!(raft.cluster_init(path, &env).as_str().ends_with("svc -c /srv/c init"));
    }

    #[test]
    fn test_whitespace_root_rejected() {
        assert!(InstanceConfigurer::new("ipfs", "svc", None, "/tmp/my fleet").is_err());
    }

    #[tokio::test]
    async fn test_recreate_dir_empties() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b");
        recreate_dir(&target).await.unwrap();
        std::fs::write(target.join("stale"), b"x").unwrap();

        recreate_dir(&target).await.unwrap();
        assert!(target.is_dir());
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);
    }
}
