use crate::framework::{CycleState, Status};
use async_trait::async_trait;
use tether_core::{Node, Pod};

/// Aggregated information about a candidate node
///
/// The node itself may be missing when the scheduler's snapshot is out of
/// sync with the cluster, which plugins must treat as an error.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    node: Option<Node>,
}

impl NodeInfo {
    pub fn new(node: Node) -> Self {
        Self { node: Some(node) }
    }

    /// A NodeInfo whose node has disappeared
    pub fn without_node() -> Self {
        Self { node: None }
    }

    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    pub fn node_name(&self) -> Option<&str> {
        self.node.as_ref().and_then(|n| n.metadata.name.as_deref())
    }
}

/// Common interface of all scheduling plugins
pub trait Plugin: Send + Sync {
    /// Name of the plugin, used in logs and configuration
    fn name(&self) -> &str;
}

/// Decides whether a pod can run on a node
#[async_trait]
pub trait FilterPlugin: Plugin {
    /// Called once per candidate node, possibly concurrently.
    /// Must not mutate the cycle state.
    async fn filter(&self, state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status;
}

/// Updates plugin state when a node has been chosen for the pod
#[async_trait]
pub trait ReservePlugin: Plugin {
    async fn reserve(&self, state: &mut CycleState, pod: &Pod, node_name: &str) -> Status;
}

/// Runs before the pod is bound; any non-success status rejects the pod
#[async_trait]
pub trait PreBindPlugin: Plugin {
    async fn pre_bind(&self, state: &CycleState, pod: &Pod, node_name: &str) -> Status;
}

/// Cleans up after a reserved pod was rejected in a later phase
#[async_trait]
pub trait UnreservePlugin: Plugin {
    async fn unreserve(&self, state: &CycleState, pod: &Pod, node_name: &str);
}

/// Informational hook run after a pod was bound
#[async_trait]
pub trait PostBindPlugin: Plugin {
    async fn post_bind(&self, state: &CycleState, pod: &Pod, node_name: &str);
}
