//! Domain model types for Netlab topologies

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current version of the project descriptor format
pub const PROJECT_FILE_VERSION: u32 = 1;

/// Which kind of resources a project runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourcesType {
    #[default]
    Local,
    Cloud,
}

impl ResourcesType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourcesType::Local => "local",
            ResourcesType::Cloud => "cloud",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ResourcesType::Local => "Local resources",
            ResourcesType::Cloud => "Cloud instances",
        }
    }
}

/// Runtime status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Stopped,
    Started,
    Suspended,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Stopped => "stopped",
            NodeStatus::Started => "started",
            NodeStatus::Suspended => "suspended",
        }
    }
}

/// A device in the topology
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub name: String,
    /// Device type label, e.g. "router" or "ethernet_switch"
    pub kind: String,
    pub status: NodeStatus,
    /// Whether this node supports start/stop control
    pub stoppable: bool,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: kind.into(),
            status: NodeStatus::Stopped,
            stoppable: true,
        }
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_stoppable(mut self, stoppable: bool) -> Self {
        self.stoppable = stoppable;
        self
    }

    /// Whether the node is currently running and can be stopped
    pub fn is_running(&self) -> bool {
        self.stoppable && self.status == NodeStatus::Started
    }
}

/// A link between two node ports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub source_node: Uuid,
    pub source_port: String,
    pub destination_node: Uuid,
    pub destination_port: String,
}

impl Link {
    pub fn new(
        source_node: Uuid,
        source_port: impl Into<String>,
        destination_node: Uuid,
        destination_port: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_node,
            source_port: source_port.into(),
            destination_node,
            destination_port: destination_port.into(),
        }
    }
}

/// A cloud instance referenced by a cloud project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyInstance {
    pub id: String,
    pub name: String,
    pub size_id: String,
    pub image_id: String,
}

/// The topology being edited: nodes, links and any referenced cloud instances
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Topology {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub instances: Vec<TopologyInstance>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all nodes, links and instances
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.instances.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty() && self.instances.is_empty()
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn add_link(&mut self, link: Link) {
        self.links.push(link);
    }

    pub fn add_instance(&mut self, instance: TopologyInstance) {
        self.instances.push(instance);
    }

    pub fn remove_instance(&mut self, id: &str) {
        self.instances.retain(|i| i.id != id);
    }

    /// Names of nodes that are running and can be stopped
    pub fn running_stoppable_nodes(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.is_running())
            .map(|n| n.name.clone())
            .collect()
    }
}

/// On-disk project descriptor.
///
/// Fields are declared in key order so the pretty JSON dump is stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,
    pub resources_type: ResourcesType,
    pub topology: Topology,
    pub version: u32,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, resources_type: ResourcesType, topology: Topology) -> Self {
        Self {
            name: name.into(),
            resources_type,
            topology,
            version: PROJECT_FILE_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resources_type_serde_strings() {
        assert_eq!(
            serde_json::to_string(&ResourcesType::Local).unwrap(),
            "\"local\""
        );
        assert_eq!(
            serde_json::to_string(&ResourcesType::Cloud).unwrap(),
            "\"cloud\""
        );
        let parsed: ResourcesType = serde_json::from_str("\"cloud\"").unwrap();
        assert_eq!(parsed, ResourcesType::Cloud);
    }

    #[test]
    fn test_running_stoppable_nodes() {
        let mut topology = Topology::new();
        topology.add_node(Node::new("R1", "router").with_status(NodeStatus::Started));
        topology.add_node(Node::new("R2", "router"));
        topology.add_node(
            Node::new("SW1", "ethernet_switch")
                .with_status(NodeStatus::Started)
                .with_stoppable(false),
        );

        let running = topology.running_stoppable_nodes();
        assert_eq!(running, vec!["R1".to_string()]);
    }

    #[test]
    fn test_topology_roundtrip() {
        let mut topology = Topology::new();
        let r1 = Node::new("R1", "router");
        let r2 = Node::new("R2", "router");
        let link = Link::new(r1.id, "f0/0", r2.id, "f0/1");
        topology.add_node(r1);
        topology.add_node(r2);
        topology.add_link(link);

        let dump = serde_json::to_string_pretty(&topology).unwrap();
        let loaded: Topology = serde_json::from_str(&dump).unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.links.len(), 1);
        assert_eq!(loaded.nodes[0].name, "R1");
        assert_eq!(loaded.links[0].source_port, "f0/0");
    }

    #[test]
    fn test_project_file_requires_resources_type() {
        let missing = r#"{"name": "demo", "topology": {"nodes": [], "links": [], "instances": []}, "version": 1}"#;
        assert!(serde_json::from_str::<ProjectFile>(missing).is_err());
    }

    #[test]
    fn test_clear() {
        let mut topology = Topology::new();
        topology.add_node(Node::new("R1", "router"));
        topology.add_instance(TopologyInstance {
            id: "i-1".to_string(),
            name: "instance".to_string(),
            size_id: "2".to_string(),
            image_id: "img".to_string(),
        });
        assert!(!topology.is_empty());
        topology.clear();
        assert!(topology.is_empty());
    }
}
