mod mock;

pub use mock::{BindingRecord, CallCounts, MockBinderConfig, MockVolumeBinder};

use crate::error::BinderError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{Node, Pod};

/// Matches a pod's volume claims against volumes and manages the
/// reserve/commit lifecycle of the resulting bindings
///
/// One binder is shared by all concurrent scheduling cycles, so
/// implementations synchronize internally. Binding records are keyed by pod
/// identity (namespace/name).
#[async_trait]
pub trait VolumeBinder: Send + Sync {
    /// Check whether the pod's claims can be satisfied on `node`.
    ///
    /// Returns the reasons the node does not fit; an empty list means it fits.
    /// Must not change any reservation.
    async fn find_pod_volumes(&self, pod: &Pod, node: &Node) -> Result<Vec<String>, BinderError>;

    /// Optimistically reserve the pod's volumes on `node_name` and record
    /// the bindings. Returns true if every claim was already bound.
    async fn assume_pod_volumes(&self, pod: &Pod, node_name: &str) -> Result<bool, BinderError>;

    /// Commit the assumed bindings and wait until they are complete.
    ///
    /// Blocks for at most the binder's bind timeout. Fails if the commit
    /// errors, times out, or is undone while waiting.
    async fn bind_pod_volumes(&self, pod: &Pod) -> Result<(), BinderError>;

    /// Forget the pod's binding record and release its reservation.
    ///
    /// Idempotent: deleting a record that does not exist is a no-op.
    async fn delete_pod_bindings(&self, pod: &Pod);
}

/// Builds the volume binder a plugin uses, given the effective bind timeout
pub trait VolumeBinderFactory: Send + Sync {
    fn new_binder(&self, bind_timeout: Duration) -> Arc<dyn VolumeBinder>;
}

impl<F> VolumeBinderFactory for F
where
    F: Fn(Duration) -> Arc<dyn VolumeBinder> + Send + Sync,
{
    fn new_binder(&self, bind_timeout: Duration) -> Arc<dyn VolumeBinder> {
        self(bind_timeout)
    }
}
