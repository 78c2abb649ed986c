use fleetbench_client::{ClientFactory, StorageClient};
use fleetbench_common::{FleetDescription, FleetError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// One endpoint of a logical node
#[derive(Clone)]
pub struct Member {
    pub id: String,
    pub address: String,
    pub client: Arc<dyn StorageClient>,
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish()
    }
}

/// A logical node: the members a benchmark operation fans out to.
/// Identifiers and clients stay positionally aligned.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    members: Vec<Member>,
}

impl Node {
    pub fn new(name: impl Into<String>, members: Vec<Member>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn addresses(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.address.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Node-name lookup over the fleet description.
///
/// The description is loaded by the first `resolve` and then shared
/// read-only; concurrent first callers wait on the same load.
pub struct FleetRegistry {
    source: Option<(PathBuf, Arc<dyn ClientFactory>)>,
    nodes: OnceCell<HashMap<String, Arc<Node>>>,
}

impl FleetRegistry {
    pub fn new(fleet_file: impl Into<PathBuf>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            source: Some((fleet_file.into(), factory)),
            nodes: OnceCell::new(),
        }
    }

    /// Registry over nodes that are already connected
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|node| (node.name.clone(), Arc::new(node)))
            .collect();
        Self {
            source: None,
            nodes: OnceCell::new_with(Some(nodes)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.nodes.initialized()
    }

    pub async fn resolve(&self, name: &str) -> Result<Arc<Node>> {
        self.nodes()
            .await?
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::UnknownNode {
                name: name.to_string(),
            })
    }

    /// Known node names, sorted
    pub async fn node_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.nodes().await?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn nodes(&self) -> Result<&HashMap<String, Arc<Node>>> {
        self.nodes.get_or_try_init(|| self.load()).await
    }

    async fn load(&self) -> Result<HashMap<String, Arc<Node>>> {
        let (path, factory) = self.source.as_ref().ok_or_else(|| FleetError::Configuration {
            message: "fleet registry has no fleet description".to_string(),
        })?;

        let text = tokio::fs::read_to_string(path).await?;
        let description = FleetDescription::parse(&text, &path.display().to_string())?;
        let nodes = build_nodes(&description, factory.as_ref())?;

        info!("Loaded {} nodes from {}", nodes.len(), path.display());
        Ok(nodes)
    }

    pub fn fleet_file(&self) -> Option<&Path> {
        self.source.as_ref().map(|(path, _)| path.as_path())
    }
}

fn build_nodes(
    description: &FleetDescription,
    factory: &dyn ClientFactory,
) -> Result<HashMap<String, Arc<Node>>> {
    let mut grouped: HashMap<String, Vec<Member>> = HashMap::new();
    for entry in description.entries() {
        let client = factory.connect(&entry.address)?;
        grouped.entry(entry.node.clone()).or_default().push(Member {
            id: entry.id.clone(),
            address: entry.address.clone(),
            client,
        });
    }

    Ok(grouped
        .into_iter()
        .map(|(name, members)| {
            let node = Node::new(name.clone(), members);
            (name, Arc::new(node))
        })
        .collect())
}
