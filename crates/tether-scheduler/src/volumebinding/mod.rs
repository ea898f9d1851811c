//! VolumeBinding plugin
//!
//! Checks that a node can satisfy a pod's PersistentVolumeClaims and drives
//! the binding of those claims across the scheduling cycle:
//!
//! ```text
//! Filter    -> binder.find_pod_volumes     (per node, no side effects)
//! Reserve   -> binder.assume_pod_volumes   (records "all bound" in CycleState)
//! PreBind   -> binder.bind_pod_volumes     (skipped when all bound)
//! Unreserve -> binder.delete_pod_bindings
//! PostBind  -> binder.delete_pod_bindings
//! pod deleted -> binder.delete_pod_bindings (PodDeletionListener)
//! ```

mod args;
mod listener;

pub use args::{VolumeBindingArgs, DEFAULT_BIND_TIMEOUT_SECONDS};
pub use listener::{deleted_pod, PodDeletionListener};

use crate::binder::VolumeBinder;
use crate::framework::{
    Code, CycleState, FilterPlugin, FrameworkHandle, NodeInfo, Plugin, PostBindPlugin,
    PreBindPlugin, ReservePlugin, StateKey, Status, UnreservePlugin,
};
use crate::{Result, SchedulerError};
use async_trait::async_trait;
use std::sync::Arc;
use tether_core::{pod_has_pvcs, pod_key, Pod};
use tracing::{debug, info, warn};

/// Name of the plugin used in the registry and configurations
pub const NAME: &str = "VolumeBinding";

/// Cycle state key holding `AllBoundState`
pub const ALL_BOUND_STATE_KEY: StateKey = StateKey::new("volumebinding:all-bound");

/// Whether all of the pod's claims were already bound at Reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllBoundState(pub bool);

/// Plugin that binds pod volumes in scheduling
pub struct VolumeBinding {
    binder: Arc<dyn VolumeBinder>,
}

impl VolumeBinding {
    /// Initialize the plugin from its raw `args` and the framework handle
    ///
    /// Builds the volume binder with the configured bind timeout and starts
    /// the pod deletion listener on the current tokio runtime.
    pub fn new(args: &serde_json::Value, handle: &FrameworkHandle) -> Result<Self> {
        let args = VolumeBindingArgs::decode(args)?;
        args.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            SchedulerError::internal_error(format!(
                "{} needs a tokio runtime for its pod deletion listener: {}",
                NAME, e
            ))
        })?;

        let bind_timeout = args.bind_timeout();
        let binder = handle.volume_binder_factory().new_binder(bind_timeout);

        // Binding records are released at Unreserve and PostBind, but a pod
        // that fails before Reserve and is deleted later never gets there.
        PodDeletionListener::new(binder.clone()).spawn_on(
            &runtime,
            handle.subscribe(),
            handle.shutdown_token(),
        );

        info!(
            "Initialized {} plugin with bind timeout {}s",
            NAME,
            bind_timeout.as_secs()
        );

        Ok(Self { binder })
    }

    /// Initialize the plugin from an existing volume binder
    pub fn from_volume_binder(binder: Arc<dyn VolumeBinder>) -> Self {
        Self { binder }
    }
}

impl Plugin for VolumeBinding {
    fn name(&self) -> &str {
        NAME
    }
}

#[async_trait]
impl FilterPlugin for VolumeBinding {
    /// Evaluates whether the pod's volumes fit the node.
    ///
    /// Bound claims must have volumes whose node affinity matches the node;
    /// unbound claims must be matchable with an available, node-compatible
    /// volume. The matching itself is the binder's job.
    async fn filter(&self, _state: &CycleState, pod: &Pod, node_info: &NodeInfo) -> Status {
        let node = match node_info.node() {
            Some(node) => node,
            None => return Status::error("node not found"),
        };

        if !pod_has_pvcs(pod) {
            return Status::success();
        }

        match self.binder.find_pod_volumes(pod, node).await {
            Err(e) => Status::error(e.to_string()),
            Ok(reasons) if reasons.is_empty() => Status::success(),
            Ok(reasons) => {
                let mut status = Status::new(Code::UnschedulableAndUnresolvable);
                for reason in reasons {
                    status.append_reason(reason);
                }
                status
            }
        }
    }
}

#[async_trait]
impl ReservePlugin for VolumeBinding {
    async fn reserve(&self, state: &mut CycleState, pod: &Pod, node_name: &str) -> Status {
        match self.binder.assume_pod_volumes(pod, node_name).await {
            Ok(all_bound) => {
                state.write(ALL_BOUND_STATE_KEY, AllBoundState(all_bound));
                Status::success()
            }
            Err(e) => Status::error(e.to_string()),
        }
    }
}

#[async_trait]
impl PreBindPlugin for VolumeBinding {
    /// Commits the assumed bindings and waits for the volume controller to
    /// finish them. Errors, timeouts and undone bindings reject the pod so
    /// that it is retried in a later cycle.
    async fn pre_bind(&self, state: &CycleState, pod: &Pod, _node_name: &str) -> Status {
        let all_bound = match state.read::<AllBoundState>(ALL_BOUND_STATE_KEY) {
            Ok(AllBoundState(all_bound)) => *all_bound,
            Err(e) => return Status::error(e.to_string()),
        };
        if all_bound {
            return Status::success();
        }

        let key = pod_key(pod);
        debug!("Trying to bind volumes for pod \"{}\"", key);
        if let Err(e) = self.binder.bind_pod_volumes(pod).await {
            warn!("Failed to bind volumes for pod \"{}\": {}", key, e);
            return Status::error(e.to_string());
        }
        debug!("Success binding volumes for pod \"{}\"", key);
        Status::success()
    }
}

#[async_trait]
impl UnreservePlugin for VolumeBinding {
    async fn unreserve(&self, _state: &CycleState, pod: &Pod, _node_name: &str) {
        self.binder.delete_pod_bindings(pod).await;
    }
}

#[async_trait]
impl PostBindPlugin for VolumeBinding {
    async fn post_bind(&self, _state: &CycleState, pod: &Pod, _node_name: &str) {
        self.binder.delete_pod_bindings(pod).await;
    }
}
