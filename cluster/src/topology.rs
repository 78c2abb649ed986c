use crate::credential::issue;
use crate::host::{validate_host_name, Host};
use crate::orchestrator::BootstrapOrchestrator;
use crate::types::FormedMember;
use fleetbench_common::{Credential, FleetDescription, FleetEntry, FleetError, NodeRole, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// A host as named by the topology planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: String,
    pub ip: String,
}

/// One cluster group: a leader and the hosts that join it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub leader: String,
    #[serde(default)]
    pub followers: Vec<String>,
}

/// Role and bootstrap-target assignments produced by the topology planner.
///
/// A host's index (and so its port range) is its position in `hosts`. A host
/// may appear in several groups; its formations are then serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyPlan {
    pub hosts: Vec<HostSpec>,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

impl TopologyPlan {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let plan: Self = serde_yaml::from_str(text).map_err(|e| FleetError::Configuration {
            message: format!("invalid topology plan: {}", e),
        })?;
        plan.validate()?;
        Ok(plan)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for host in &self.hosts {
            validate_host_name(&host.name)?;
            if !names.insert(host.name.as_str()) {
                return Err(invalid(format!("host {} listed twice", host.name)));
            }
        }

        for group in &self.groups {
            if !names.contains(group.leader.as_str()) {
                return Err(invalid(format!("unknown leader host {}", group.leader)));
            }
            let mut members = HashSet::from([group.leader.as_str()]);
            for follower in &group.followers {
                if !names.contains(follower.as_str()) {
                    return Err(invalid(format!("unknown follower host {}", follower)));
                }
                if !members.insert(follower.as_str()) {
                    return Err(invalid(format!(
                        "host {} appears twice in the group led by {}",
                        follower, group.leader
                    )));
                }
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> FleetError {
    FleetError::Configuration { message }
}

/// What happened to one group. Members formed before a failure stay listed
/// (and running) so they can be described or stopped.
#[derive(Debug)]
pub struct GroupOutcome {
    pub leader: String,
    pub credential: Option<Credential>,
    /// Leader first, then followers in plan order
    pub members: Vec<FormedMember>,
    pub error: Option<FleetError>,
}

impl GroupOutcome {
    fn new(leader: &str) -> Self {
        Self {
            leader: leader.to_string(),
            credential: None,
            members: Vec::new(),
            error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a topology walk brought up
#[derive(Debug, Default)]
pub struct Fleet {
    groups: Vec<GroupOutcome>,
}

impl Fleet {
    pub fn groups(&self) -> &[GroupOutcome] {
        &self.groups
    }

    pub fn members(&self) -> impl Iterator<Item = &FormedMember> {
        self.groups.iter().flat_map(|g| g.members.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &FleetError)> {
        self.groups
            .iter()
            .filter_map(|g| g.error.as_ref().map(|e| (g.leader.as_str(), e)))
    }

    /// Fleet description: one node per host, one member per cluster peer on
    /// it, identified by its group's secret and addressed at its proxy
    pub fn describe(&self) -> FleetDescription {
        let mut description = FleetDescription::new();
        for member in self.members() {
            let peer = &member.peer;
            description.push(FleetEntry {
                node: peer.instance.host_name.clone(),
                id: peer.credential.to_string(),
                address: peer.instance.proxy_addr(),
            });
        }
        description
    }
}

impl BootstrapOrchestrator {
    /// Form every group of `plan`.
    ///
    /// Groups run concurrently; within a group the leader is formed first
    /// and its cluster address handed to the followers, which are formed in
    /// order under the same secret. A failure stops its own group only.
    #[instrument(skip_all, fields(hosts = plan.hosts.len(), groups = plan.groups.len()))]
    pub async fn form_topology(self: &Arc<Self>, plan: &TopologyPlan) -> Result<Fleet> {
        plan.validate()?;
        for (index, host) in plan.hosts.iter().enumerate() {
            self.register_host(&host.name, &host.ip, index)?;
        }

        let handles: Vec<_> = plan
            .groups
            .iter()
            .cloned()
            .map(|group| {
                let orchestrator = Arc::clone(self);
                tokio::spawn(async move { orchestrator.run_group(group).await })
            })
            .collect();

        let mut fleet = Fleet::default();
        for (group, handle) in plan.groups.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Formation task for group {} died: {}", group.leader, e);
                    let mut outcome = GroupOutcome::new(&group.leader);
                    outcome.error = Some(FleetError::Io(std::io::Error::other(e.to_string())));
                    outcome
                }
            };
            fleet.groups.push(outcome);
        }

        let formed = fleet.members().count();
        let failed = fleet.failures().count();
        if failed > 0 {
            warn!("Topology formed {} members, {} groups failed", formed, failed);
        } else {
            info!("Topology formed {} members in {} groups", formed, fleet.groups.len());
        }

        Ok(fleet)
    }

    async fn run_group(&self, group: GroupSpec) -> GroupOutcome {
        let mut outcome = GroupOutcome::new(&group.leader);
        if let Err(e) = self.form_group(&group, &mut outcome).await {
            error!("Group led by {} stopped: {}", group.leader, e);
            outcome.error = Some(e);
        }
        outcome
    }

    async fn form_group(&self, group: &GroupSpec, outcome: &mut GroupOutcome) -> Result<()> {
        let credential = issue()?;
        outcome.credential = Some(credential.clone());

        let leader_host = self.known_host(&group.leader)?;
        let leader = self
            .start_member(&leader_host, NodeRole::Leader, &credential, None)
            .await?;
        let bootstrap = leader.peer.bootstrap_addr();
        outcome.members.push(leader);

        for name in &group.followers {
            let host = self.known_host(name)?;
            let follower = self
                .start_member(&host, NodeRole::Follower, &credential, Some(&bootstrap))
                .await?;
            outcome.members.push(follower);
        }

        info!(
            "Group led by {} formed with {} followers",
            group.leader,
            group.followers.len()
        );
        Ok(())
    }

    /// Stop every member of `fleet` and release its ports
    pub async fn shutdown(&self, fleet: &Fleet) {
        for member in fleet.members() {
            member.stop();
        }
        for member in fleet.members() {
            self.stop_member(member).await;
        }
        info!("Fleet stopped");
    }

    fn known_host(&self, name: &str) -> Result<Arc<Host>> {
        self.host(name).ok_or_else(|| FleetError::Configuration {
            message: format!("host {} is not registered", name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
hosts:
  - name: node_0
    ip: 10.0.0.1
  - name: node_1
    ip: 10.0.0.2
  - name: node_2
    ip: 10.0.0.3
groups:
  - leader: node_0
    followers: [node_1, node_2]
  - leader: node_1
"#;

    #[test]
    fn test_plan_from_yaml() {
        let plan = TopologyPlan::from_yaml(PLAN).unwrap();
        assert_eq!(plan.hosts.len(), 3);
        assert_eq!(plan.groups[0].followers, vec!["node_1", "node_2"]);
        assert!(plan.groups[1].followers.is_empty());
    }

    #[test]
    fn test_plan_unknown_host() {
        let text = "hosts:\n  - {name: a, ip: 10.0.0.1}\ngroups:\n  - {leader: a, followers: [b]}\n";
        let err = TopologyPlan::from_yaml(text).unwrap_err();
        assert!(err.to_string().contains("unknown follower host b"));
    }

    #[test]
    fn test_plan_duplicate_member() {
        let text = "hosts:\n  - {name: a, ip: 10.0.0.1}\ngroups:\n  - {leader: a, followers: [a]}\n";
        assert!(TopologyPlan::from_yaml(text).is_err());
    }

    #[test]
    fn test_plan_rejects_shell_host_name() {
        let text = "hosts:\n  - {name: 'x;touch /tmp/pwned;', ip: 10.0.0.1}\n";
        let err = TopologyPlan::from_yaml(text).unwrap_err();
        assert!(matches!(err, FleetError::Configuration { .. }));
        assert!(err.to_string().contains("invalid host name"));
    }

    #[test]
    fn test_plan_duplicate_host() {
        let text = "hosts:\n  - {name: a, ip: 10.0.0.1}\n  - {name: a, ip: 10.0.0.2}\n";
        assert!(TopologyPlan::from_yaml(text).is_err());
    }
}
