use crate::binder::VolumeBinder;
use crate::error::BinderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{pod_key, Node, Pod};
use tokio::sync::RwLock;
use tracing::debug;

/// Scripted behaviour of a `MockVolumeBinder`
#[derive(Debug, Clone, Default)]
pub struct MockBinderConfig {
    /// Reasons `find_pod_volumes` reports per node name; unlisted nodes fit
    pub node_reasons: HashMap<String, Vec<String>>,
    /// Make `find_pod_volumes` fail with this message
    pub find_error: Option<String>,
    /// Make `assume_pod_volumes` fail with this message
    pub assume_error: Option<String>,
    /// What `assume_pod_volumes` reports for "all claims already bound"
    pub all_bound: bool,
    /// Make the commit fail with this message
    pub bind_error: Option<String>,
    /// How long the commit takes to complete
    pub bind_latency: Duration,
    /// Report the commit as undone with this reason
    pub undo_reason: Option<String>,
}

/// A binding record held between assume and delete
#[derive(Debug, Clone, PartialEq)]
pub struct BindingRecord {
    pub node_name: String,
    pub all_bound: bool,
    pub assumed_at: DateTime<Utc>,
    /// Set once the commit completed
    pub bound_at: Option<DateTime<Utc>>,
}

/// Number of calls made to each binder operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub find: usize,
    pub assume: usize,
    pub bind: usize,
    pub delete: usize,
}

/// In-memory volume binder for tests and local runs
///
/// Matching is scripted through `MockBinderConfig` instead of looking at
/// real volumes. Binding records and call counts live behind shared locks,
/// so clones observe the same state.
#[derive(Debug, Clone)]
pub struct MockVolumeBinder {
    bind_timeout: Duration,
    config: MockBinderConfig,
    bindings: Arc<RwLock<HashMap<String, BindingRecord>>>,
    calls: Arc<RwLock<CallCounts>>,
}

impl MockVolumeBinder {
    pub fn new(bind_timeout: Duration) -> Self {
        Self::with_config(bind_timeout, MockBinderConfig::default())
    }

    pub fn with_config(bind_timeout: Duration, config: MockBinderConfig) -> Self {
        Self {
            bind_timeout,
            config,
            bindings: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(CallCounts::default())),
        }
    }

    /// Same shared state, different bind timeout
    pub fn with_bind_timeout(mut self, bind_timeout: Duration) -> Self {
        self.bind_timeout = bind_timeout;
        self
    }

    pub fn bind_timeout(&self) -> Duration {
        self.bind_timeout
    }

    pub async fn calls(&self) -> CallCounts {
        self.calls.read().await.clone()
    }

    /// Binding record of the pod with the given "namespace/name" key
    pub async fn binding(&self, key: &str) -> Option<BindingRecord> {
        self.bindings.read().await.get(key).cloned()
    }

    pub async fn binding_count(&self) -> usize {
        self.bindings.read().await.len()
    }

    async fn commit(&self, key: &str) -> Result<(), BinderError> {
        if !self.config.bind_latency.is_zero() {
            tokio::time::sleep(self.config.bind_latency).await;
        }

        if let Some(reason) = &self.config.undo_reason {
            return Err(BinderError::binding_undone(key, reason.clone()));
        }
        if let Some(message) = &self.config.bind_error {
            return Err(BinderError::bind_failed(key, message.clone()));
        }

        let mut bindings = self.bindings.write().await;
        match bindings.get_mut(key) {
            Some(record) => {
                record.bound_at = Some(Utc::now());
                Ok(())
            }
            // Deleted while the commit was in flight
            None => Err(BinderError::binding_undone(
                key,
                "binding record was deleted during commit",
            )),
        }
    }
}

#[async_trait]
impl VolumeBinder for MockVolumeBinder {
    async fn find_pod_volumes(&self, pod: &Pod, node: &Node) -> Result<Vec<String>, BinderError> {
        self.calls.write().await.find += 1;

        let key = pod_key(pod);
        if let Some(message) = &self.config.find_error {
            return Err(BinderError::find_failed(key, message.clone()));
        }

        let node_name = node.metadata.name.as_deref().unwrap_or_default();
        let reasons = self
            .config
            .node_reasons
            .get(node_name)
            .cloned()
            .unwrap_or_default();
        debug!(
            "Mock: find volumes for pod {} on node {}: {} reason(s)",
            key,
            node_name,
            reasons.len()
        );
        Ok(reasons)
    }

    async fn assume_pod_volumes(&self, pod: &Pod, node_name: &str) -> Result<bool, BinderError> {
        self.calls.write().await.assume += 1;

        let key = pod_key(pod);
        if let Some(message) = &self.config.assume_error {
            return Err(BinderError::assume_failed(key, node_name, message.clone()));
        }

        let record = BindingRecord {
            node_name: node_name.to_string(),
            all_bound: self.config.all_bound,
            assumed_at: Utc::now(),
            bound_at: None,
        };
        self.bindings.write().await.insert(key.clone(), record);
        debug!(
            "Mock: assumed volumes for pod {} on node {} (all bound: {})",
            key, node_name, self.config.all_bound
        );
        Ok(self.config.all_bound)
    }

    async fn bind_pod_volumes(&self, pod: &Pod) -> Result<(), BinderError> {
        self.calls.write().await.bind += 1;

        let key = pod_key(pod);
        if !self.bindings.read().await.contains_key(&key) {
            return Err(BinderError::NotAssumed { pod: key });
        }

        match tokio::time::timeout(self.bind_timeout, self.commit(&key)).await {
            Ok(result) => result,
            Err(_) => Err(BinderError::BindTimeout {
                pod: key,
                timeout: self.bind_timeout,
            }),
        }
    }

    async fn delete_pod_bindings(&self, pod: &Pod) {
        self.calls.write().await.delete += 1;

        let key = pod_key(pod);
        if self.bindings.write().await.remove(&key).is_some() {
            debug!("Mock: deleted binding record for pod {}", key);
        } else {
            debug!("Mock: no binding record for pod {}", key);
        }
    }
}
