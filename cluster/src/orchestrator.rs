use crate::configurer::{
    recreate_dir, storage_config_edits, ClusterEnv, ClusterPorts, InstanceConfigurer, StoragePorts,
};
use crate::host::{ensure_local, parse_ip, validate_host_name, Host};
use crate::daemon::DaemonHandle;
use crate::runner::{CommandRunner, ShellCommand};
use crate::types::*;
use crate::OrchestratorConfig;
use dashmap::DashMap;
use fleetbench_common::{
    ClusterInstance, Credential, FleetError, NodeRole, PortRange, Result, StorageInstance,
    PORTS_PER_INSTANCE,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// File inside each instance directory receiving the daemon's output
pub const DAEMON_LOG: &str = "daemon.log";

/// Brings up storage daemons and cluster peers host by host
pub struct BootstrapOrchestrator {
    config: OrchestratorConfig,
    configurer: InstanceConfigurer,
    runner: Arc<dyn CommandRunner>,
    hosts: DashMap<String, Arc<Host>>,
}

impl BootstrapOrchestrator {
    pub fn new(config: OrchestratorConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let configurer = InstanceConfigurer::new(
            config.storage_bin.clone(),
            config.coordinator_bin.clone(),
            config.consensus.clone(),
            config.config_root.clone(),
        )?;

        Ok(Self {
            config,
            configurer,
            runner,
            hosts: DashMap::new(),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn configurer(&self) -> &InstanceConfigurer {
        &self.configurer
    }

    /// Register a host; its port range follows from its index.
    ///
    /// Commands run and ports are tested on this machine, so `ip` must be
    /// one of its addresses. Registering the same name again returns the
    /// existing host as long as the IP and index agree.
    pub fn register_host(&self, name: &str, ip: &str, index: usize) -> Result<Arc<Host>> {
        validate_host_name(name)?;
        let ip = parse_ip(name, ip)?;
        ensure_local(name, ip)?;
        let range = PortRange::for_host(self.config.base_port, self.config.ports_per_host, index)?;

        let host = self
            .hosts
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Host::new(name, ip, index, range)))
            .value()
            .clone();

        if host.ip() != ip || host.index() != index {
            return Err(FleetError::Configuration {
                message: format!(
                    "host {} already registered as {} (index {})",
                    name,
                    host.ip(),
                    host.index()
                ),
            });
        }

        debug!("Registered host {} at {} with ports {}", name, ip, range);
        Ok(host)
    }

    pub fn host(&self, name: &str) -> Option<Arc<Host>> {
        self.hosts.get(name).map(|entry| entry.value().clone())
    }

    pub fn hosts(&self) -> Vec<Arc<Host>> {
        let mut hosts: Vec<_> = self.hosts.iter().map(|e| e.value().clone()).collect();
        hosts.sort_by_key(|h| h.index());
        hosts
    }

    /// Initialize, configure and launch a storage daemon on `host`
    #[instrument(skip_all, fields(host = %host.name(), secret = %credential.short()))]
    pub async fn start_storage(&self, host: &Host, credential: &Credential) -> Result<StartedStorage> {
        let label = format!("ipfs@{}", host.name());
        transition(&label, FormationState::Idle);

        let mut section = host.lock().await;
        let result = async {
            transition(&label, FormationState::AllocatingPorts);
            let ports = section.allocate(PORTS_PER_INSTANCE)?;
            let launched = match StoragePorts::from_slice(&ports) {
                Ok(storage_ports) => self.launch_storage(host, credential, storage_ports, &label).await,
                Err(e) => Err(e),
            };
            if launched.is_err() {
                section.release(&ports);
            }
            launched
        }
        .await;

        finish(&label, result)
    }

    /// Form a cluster leader on `host`, driving the storage daemon at
    /// `storage_api`
    pub async fn form_leader(
        &self,
        host: &Host,
        credential: &Credential,
        storage_api: &str,
    ) -> Result<FormedPeer> {
        self.form(host, NodeRole::Leader, credential, storage_api, None).await
    }

    /// Form a follower joining the leader at `bootstrap`
    pub async fn form_follower(
        &self,
        host: &Host,
        credential: &Credential,
        storage_api: &str,
        bootstrap: &str,
    ) -> Result<FormedPeer> {
        self.form(host, NodeRole::Follower, credential, storage_api, Some(bootstrap))
            .await
    }

    /// Start a storage daemon and the cluster peer on top of it
    pub async fn start_member(
        &self,
        host: &Host,
        role: NodeRole,
        credential: &Credential,
        bootstrap: Option<&str>,
    ) -> Result<FormedMember> {
        let storage = self.start_storage(host, credential).await?;

        match self
            .form(host, role, credential, &storage.instance.api_addr(), bootstrap)
            .await
        {
            Ok(peer) => Ok(FormedMember { storage, peer }),
            Err(e) => {
                storage.daemon.stop();
                storage.daemon.wait_exit().await;
                host.lock().await.release(&storage.instance.ports());
                Err(e)
            }
        }
    }

    /// Stop both daemons of `member`, wait for them to go down and hand
    /// their ports back to the host
    pub async fn stop_member(&self, member: &FormedMember) {
        member.stop();
        member.peer.daemon.wait_exit().await;
        member.storage.daemon.wait_exit().await;

        match self.host(member.host_name()) {
            Some(host) => {
                let mut section = host.lock().await;
                section.release(&member.peer.instance.ports());
                section.release(&member.storage.instance.ports());
            }
            None => warn!("Stopped member on unregistered host {}", member.host_name()),
        }
        debug!("Stopped member {}", member.peer.daemon.label());
    }

    #[instrument(skip_all, fields(host = %host.name(), role = %role, secret = %credential.short()))]
    async fn form(
        &self,
        host: &Host,
        role: NodeRole,
        credential: &Credential,
        storage_api: &str,
        bootstrap: Option<&str>,
    ) -> Result<FormedPeer> {
        if role == NodeRole::Follower && bootstrap.is_none() {
            return Err(FleetError::InvalidArgument {
                message: format!("follower on {} needs a bootstrap address", host.name()),
            });
        }

        let label = format!("cluster-{}@{}", role, host.name());
        transition(&label, FormationState::Idle);

        let mut section = host.lock().await;
        let result = async {
            transition(&label, FormationState::AllocatingPorts);
            let ports = section.allocate(PORTS_PER_INSTANCE)?;
            let launched = match ClusterPorts::from_slice(&ports) {
                Ok(cluster_ports) => {
                    self.launch_peer(host, role, credential, storage_api, bootstrap, cluster_ports, &label)
                        .await
                }
                Err(e) => Err(e),
            };
            if launched.is_err() {
                section.release(&ports);
            }
            launched
        }
        .await;

        finish(&label, result)
    }

    async fn launch_storage(
        &self,
        host: &Host,
        credential: &Credential,
        ports: StoragePorts,
        label: &str,
    ) -> Result<StartedStorage> {
        transition(label, FormationState::Initializing);
        let dir = self.configurer.storage_dir(host.name(), credential, ports.swarm);
        recreate_dir(&dir).await?;

        self.runner.run(&self.configurer.storage_init(&dir)).await?;

        let ip = host.ip().to_string();
        for (field, value) in storage_config_edits(&ip, ports) {
            self.runner
                .run(&self.configurer.storage_config_edit(&dir, field, &value))
                .await?;
        }

        transition(label, FormationState::Launching);
        let daemon = self.spawn(&dir, &self.configurer.storage_daemon(&dir), label)?;

        let target = SocketAddr::from((host.ip(), ports.api));
        if let Err(e) = self.config.storage_readiness.wait(&daemon, target).await {
            daemon.stop();
            return Err(e);
        }

        Ok(StartedStorage {
            instance: StorageInstance {
                host_name: host.name().to_string(),
                ip,
                swarm_port: ports.swarm,
                api_port: ports.api,
                gateway_port: ports.gateway,
            },
            dir,
            daemon,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn launch_peer(
        &self,
        host: &Host,
        role: NodeRole,
        credential: &Credential,
        storage_api: &str,
        bootstrap: Option<&str>,
        ports: ClusterPorts,
        label: &str,
    ) -> Result<FormedPeer> {
        transition(label, FormationState::Initializing);
        let dir = self
            .configurer
            .cluster_dir(host.name(), role, credential, ports.rest_api);
        recreate_dir(&dir).await?;

        let ip = host.ip().to_string();
        let env = ClusterEnv::new(
            &ip,
            host.name(),
            credential,
            self.config.replication,
            storage_api,
            ports,
        );
        self.runner.run(&self.configurer.cluster_init(&dir, &env)).await?;

        transition(label, FormationState::Launching);
        let daemon = self.spawn(&dir, &self.configurer.cluster_daemon(&dir, bootstrap), label)?;

        let target = SocketAddr::from((host.ip(), ports.rest_api));
        if let Err(e) = self.config.cluster_readiness.wait(&daemon, target).await {
            daemon.stop();
            return Err(e);
        }

        Ok(FormedPeer {
            instance: ClusterInstance {
                host_name: host.name().to_string(),
                ip,
                storage_api: storage_api.to_string(),
                rest_api_port: ports.rest_api,
                proxy_port: ports.proxy,
                cluster_port: ports.cluster,
                replication: self.config.replication,
            },
            role,
            credential: credential.clone(),
            dir,
            daemon,
        })
    }

    fn spawn(&self, dir: &Path, command: &ShellCommand, label: &str) -> Result<DaemonHandle> {
        self.runner.spawn(command, label, &dir.join(DAEMON_LOG))
    }
}

fn transition(label: &str, state: FormationState) {
    debug!("{} -> {}", label, state);
}

fn finish<T>(label: &str, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => {
            transition(label, FormationState::Ready);
            info!("{} ready", label);
        }
        Err(e) => {
            transition(label, FormationState::Failed);
            error!("{} failed: {}", label, e);
        }
    }
    result
}
