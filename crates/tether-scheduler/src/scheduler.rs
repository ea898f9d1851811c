use crate::config::SchedulerConfiguration;
use crate::framework::{
    CycleState, FilterPlugin, FrameworkHandle, NodeInfo, PostBindPlugin, PreBindPlugin,
    ReservePlugin, Status, UnreservePlugin,
};
use crate::volumebinding::{self, VolumeBinding};
use crate::{Result, SchedulerError};
use futures_util::future::join_all;
use std::sync::Arc;
use tether_core::{pod_key, Node, Pod};
use tracing::{debug, info, warn};

/// Result of a successful scheduling attempt
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    /// Node the pod was bound to
    pub node_name: String,
    /// The pod with `spec.nodeName` set
    pub pod: Pod,
}

/// Runs pods through the registered plugins, one scheduling attempt at a time
#[derive(Default)]
pub struct Scheduler {
    filters: Vec<Arc<dyn FilterPlugin>>,
    reservers: Vec<Arc<dyn ReservePlugin>>,
    pre_binders: Vec<Arc<dyn PreBindPlugin>>,
    unreservers: Vec<Arc<dyn UnreservePlugin>>,
    post_binders: Vec<Arc<dyn PostBindPlugin>>,
}

impl Scheduler {
    /// Create a scheduler without plugins
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scheduler from a configuration, with VolumeBinding enabled
    pub fn from_config(config: &SchedulerConfiguration, handle: &FrameworkHandle) -> Result<Self> {
        let args = config.plugin_args(volumebinding::NAME);
        let plugin = Arc::new(VolumeBinding::new(&args, handle)?);

        let mut scheduler = Self::new();
        scheduler.register_volume_binding(plugin);
        Ok(scheduler)
    }

    /// Register VolumeBinding at all of its extension points
    pub fn register_volume_binding(&mut self, plugin: Arc<VolumeBinding>) {
        self.filters.push(plugin.clone());
        self.reservers.push(plugin.clone());
        self.pre_binders.push(plugin.clone());
        self.unreservers.push(plugin.clone());
        self.post_binders.push(plugin);
    }

    pub fn add_filter_plugin(&mut self, plugin: Arc<dyn FilterPlugin>) {
        self.filters.push(plugin);
    }

    pub fn add_reserve_plugin(&mut self, plugin: Arc<dyn ReservePlugin>) {
        self.reservers.push(plugin);
    }

    pub fn add_pre_bind_plugin(&mut self, plugin: Arc<dyn PreBindPlugin>) {
        self.pre_binders.push(plugin);
    }

    pub fn add_unreserve_plugin(&mut self, plugin: Arc<dyn UnreservePlugin>) {
        self.unreservers.push(plugin);
    }

    pub fn add_post_bind_plugin(&mut self, plugin: Arc<dyn PostBindPlugin>) {
        self.post_binders.push(plugin);
    }

    /// Schedule a single pod onto one of `nodes`
    pub async fn schedule_pod(&self, pod: &Pod, nodes: &[Node]) -> Result<ScheduleOutcome> {
        let pod_name = pod_key(pod);
        let mut state = CycleState::new();

        // Phase 1: Filter nodes, all candidates concurrently
        let results = {
            let state = &state;
            join_all(nodes.iter().map(|node| async move {
                let node_info = NodeInfo::new(node.clone());
                let node_name = node_info.node_name().unwrap_or("unknown").to_string();
                let status = self.run_filter_plugins(state, pod, &node_info).await;
                (node_name, status)
            }))
            .await
        };

        let mut feasible_nodes = Vec::new();
        let mut rejections = Vec::new();

        for (node_name, (plugin, status)) in results {
            if status.is_success() {
                feasible_nodes.push(node_name);
            } else if status.is_unschedulable() {
                debug!(
                    "Node {} filtered out by {}: {}",
                    node_name,
                    plugin,
                    status.message()
                );
                rejections.push(format!("{}: {}", node_name, status.message()));
            } else {
                return Err(SchedulerError::scheduling_failed(
                    format!(
                        "filter plugin {} failed for pod {} on node {}: {}",
                        plugin,
                        pod_name,
                        node_name,
                        status.message()
                    ),
                    "The pod will be retried in a later scheduling cycle",
                ));
            }
        }

        // Phase 2: Select a node
        let node_name = match feasible_nodes.into_iter().next() {
            Some(name) => name,
            None => {
                let reason = if rejections.is_empty() {
                    "no nodes available".to_string()
                } else {
                    rejections.join("; ")
                };
                return Err(SchedulerError::no_suitable_nodes(pod_name, reason));
            }
        };

        info!("Selected node {} for pod {}", node_name, pod_name);

        // Phase 3: Reserve
        let mut reserved: Vec<&str> = Vec::with_capacity(self.reservers.len());
        for plugin in &self.reservers {
            let status = plugin.reserve(&mut state, pod, &node_name).await;
            if !status.is_success() {
                // The failing plugin reserved nothing and is not unreserved
                self.run_unreserve_plugins(&state, pod, &node_name, &reserved)
                    .await;
                return Err(rejected(plugin.name(), "reserve", &pod_name, &status));
            }
            reserved.push(plugin.name());
        }

        // Phase 4: PreBind
        for plugin in &self.pre_binders {
            let status = plugin.pre_bind(&state, pod, &node_name).await;
            if !status.is_success() {
                self.run_unreserve_plugins(&state, pod, &node_name, &reserved)
                    .await;
                return Err(rejected(plugin.name(), "pre-bind", &pod_name, &status));
            }
        }

        // Phase 5: Bind pod to node
        let mut bound = pod.clone();
        bound.spec.get_or_insert_with(Default::default).node_name = Some(node_name.clone());
        info!("Successfully bound pod {} to node {}", pod_name, node_name);

        // Phase 6: PostBind
        for plugin in &self.post_binders {
            plugin.post_bind(&state, &bound, &node_name).await;
        }

        Ok(ScheduleOutcome {
            node_name,
            pod: bound,
        })
    }

    /// Run every filter on one node, stopping at the first rejection.
    /// Returns the deciding plugin's name with its status.
    async fn run_filter_plugins(
        &self,
        state: &CycleState,
        pod: &Pod,
        node_info: &NodeInfo,
    ) -> (String, Status) {
        for plugin in &self.filters {
            let status = plugin.filter(state, pod, node_info).await;
            if !status.is_success() {
                return (plugin.name().to_string(), status);
            }
        }
        (String::new(), Status::success())
    }

    /// Unreserve the plugins named in `reserved`, in reverse registration order
    async fn run_unreserve_plugins(
        &self,
        state: &CycleState,
        pod: &Pod,
        node_name: &str,
        reserved: &[&str],
    ) {
        for plugin in self.unreservers.iter().rev() {
            if reserved.contains(&plugin.name()) {
                plugin.unreserve(state, pod, node_name).await;
            }
        }
    }
}

fn rejected(plugin: &str, phase: &str, pod_name: &str, status: &Status) -> SchedulerError {
    warn!(
        "Plugin {} rejected pod {} at {}: {}",
        plugin, pod_name, phase, status
    );
    SchedulerError::scheduling_failed(
        format!(
            "{} plugin {} rejected pod {}: {}",
            phase,
            plugin,
            pod_name,
            status.message()
        ),
        "The pod will be retried in a later scheduling cycle",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{MockBinderConfig, MockVolumeBinder};
    use crate::framework::{Code, Plugin};
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{PersistentVolumeClaimVolumeSource, PodSpec, Volume};
    use std::time::Duration;

    fn create_test_node(name: &str) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node
    }

    fn create_test_pod(name: &str, claim: Option<&str>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod.spec = Some(PodSpec {
            volumes: claim.map(|c| {
                vec![Volume {
                    name: "data".to_string(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: c.to_string(),
                        read_only: None,
                    }),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        });
        pod
    }

    fn scheduler_with(config: MockBinderConfig) -> (Scheduler, MockVolumeBinder) {
        let binder = MockVolumeBinder::with_config(Duration::from_secs(600), config);
        let mut scheduler = Scheduler::new();
        scheduler.register_volume_binding(Arc::new(VolumeBinding::from_volume_binder(Arc::new(
            binder.clone(),
        ))));
        (scheduler, binder)
    }

    struct BrokenFilter;

    impl Plugin for BrokenFilter {
        fn name(&self) -> &str {
            "BrokenFilter"
        }
    }

    #[async_trait]
    impl FilterPlugin for BrokenFilter {
        async fn filter(&self, _: &CycleState, _: &Pod, _: &NodeInfo) -> Status {
            Status::new(Code::Error)
        }
    }

    #[tokio::test]
    async fn test_schedule_pod_success() {
        let (scheduler, binder) = scheduler_with(MockBinderConfig::default());
        let nodes = vec![create_test_node("node1"), create_test_node("node2")];
        let pod = create_test_pod("test-pod", Some("data"));

        let outcome = scheduler.schedule_pod(&pod, &nodes).await.unwrap();

        assert_eq!(outcome.node_name, "node1");
        assert_eq!(
            outcome.pod.spec.as_ref().unwrap().node_name.as_deref(),
            Some("node1")
        );
        let calls = binder.calls().await;
        assert_eq!(calls.find, 2);
        assert_eq!(calls.assume, 1);
        assert_eq!(calls.bind, 1);
        assert_eq!(calls.delete, 1);
        assert_eq!(binder.binding_count().await, 0);
    }

    #[tokio::test]
    async fn test_schedule_pod_skips_rejected_node() {
        let mut config = MockBinderConfig::default();
        config.node_reasons.insert(
            "node1".to_string(),
            vec!["node(s) had volume node affinity conflict".to_string()],
        );
        let (scheduler, _binder) = scheduler_with(config);
        let nodes = vec![create_test_node("node1"), create_test_node("node2")];
        let pod = create_test_pod("test-pod", Some("data"));

        let outcome = scheduler.schedule_pod(&pod, &nodes).await.unwrap();
        assert_eq!(outcome.node_name, "node2");
    }

    #[tokio::test]
    async fn test_schedule_pod_no_suitable_nodes() {
        let mut config = MockBinderConfig::default();
        config.node_reasons.insert(
            "node1".to_string(),
            vec!["node(s) didn't find available persistent volumes to bind".to_string()],
        );
        let (scheduler, binder) = scheduler_with(config);
        let nodes = vec![create_test_node("node1")];
        let pod = create_test_pod("test-pod", Some("data"));

        let err = scheduler.schedule_pod(&pod, &nodes).await.unwrap_err();
        match err {
            SchedulerError::NoSuitableNodes { reason, .. } => {
                assert!(reason.contains("node1: node(s) didn't find available persistent volumes"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(binder.calls().await.assume, 0);
    }

    #[tokio::test]
    async fn test_schedule_pod_filter_error_aborts() {
        let (mut scheduler, binder) = scheduler_with(MockBinderConfig::default());
        scheduler.add_filter_plugin(Arc::new(BrokenFilter));
        let nodes = vec![create_test_node("node1")];
        let pod = create_test_pod("test-pod", None);

        let err = scheduler.schedule_pod(&pod, &nodes).await.unwrap_err();
        assert!(matches!(err, SchedulerError::SchedulingFailed { .. }));
        assert_eq!(binder.calls().await.assume, 0);
    }

    #[tokio::test]
    async fn test_schedule_pod_reserve_failure_skips_own_unreserve() {
        let config = MockBinderConfig {
            assume_error: Some("volume pv-1 already assumed".to_string()),
            ..Default::default()
        };
        let (scheduler, binder) = scheduler_with(config);
        let nodes = vec![create_test_node("node1")];
        let pod = create_test_pod("test-pod", Some("data"));

        let err = scheduler.schedule_pod(&pod, &nodes).await.unwrap_err();
        assert!(err.to_string().contains("volume pv-1 already assumed"));

        let calls = binder.calls().await;
        assert_eq!(calls.assume, 1);
        assert_eq!(calls.bind, 0);
        assert_eq!(calls.delete, 0);
    }

    #[tokio::test]
    async fn test_schedule_pod_bind_failure_unreserves() {
        let config = MockBinderConfig {
            bind_error: Some("api server unavailable".to_string()),
            ..Default::default()
        };
        let (scheduler, binder) = scheduler_with(config);
        let nodes = vec![create_test_node("node1")];
        let pod = create_test_pod("test-pod", Some("data"));

        let err = scheduler.schedule_pod(&pod, &nodes).await.unwrap_err();
        assert!(err.to_string().contains("api server unavailable"));
        assert_eq!(binder.calls().await.delete, 1);
        assert_eq!(binder.binding_count().await, 0);
    }

    #[tokio::test]
    async fn test_schedule_pod_without_nodes() {
        let (scheduler, _binder) = scheduler_with(MockBinderConfig::default());
        let pod = create_test_pod("test-pod", None);

        let err = scheduler.schedule_pod(&pod, &[]).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NoSuitableNodes { .. }));
    }
}
