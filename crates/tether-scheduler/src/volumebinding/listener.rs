use crate::binder::VolumeBinder;
use std::sync::Arc;
use tether_core::{DeletedFinalStateUnknown, Pod, ResourceEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Releases volume binding records of pods deleted from the cluster
///
/// Unreserve and PostBind release records for pods that reached Reserve.
/// A pod that failed earlier and was deleted afterwards is only seen here.
pub struct PodDeletionListener {
    binder: Arc<dyn VolumeBinder>,
}

impl PodDeletionListener {
    pub fn new(binder: Arc<dyn VolumeBinder>) -> Self {
        Self { binder }
    }

    /// Run the listener on its own task of `runtime`
    pub fn spawn_on(
        self,
        runtime: &tokio::runtime::Handle,
        events: broadcast::Receiver<ResourceEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        runtime.spawn(async move { self.run(events, shutdown).await })
    }

    /// Consume events until the bus closes or `shutdown` is cancelled
    pub async fn run(
        &self,
        events: broadcast::Receiver<ResourceEvent>,
        shutdown: CancellationToken,
    ) {
        info!("Starting pod deletion listener");
        let mut stream = BroadcastStream::new(events);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Pod deletion listener shutting down");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => self.handle_event(&event).await,
                    Some(Err(BroadcastStreamRecvError::Lagged(n))) => {
                        warn!(dropped = n, "Pod deletion listener lagged; binding records of missed deletions may leak");
                    }
                    None => {
                        debug!("Event bus closed, stopping pod deletion listener");
                        break;
                    }
                },
            }
        }
    }

    /// Release the binding record of the pod an event reports deleted
    pub async fn handle_event(&self, event: &ResourceEvent) {
        if !event.is_pod_deletion() {
            return;
        }

        match deleted_pod(event) {
            Ok(pod) => {
                debug!(
                    "Pod {}/{} deleted, releasing volume bindings",
                    pod.metadata.namespace.as_deref().unwrap_or_default(),
                    pod.metadata.name.as_deref().unwrap_or_default()
                );
                self.binder.delete_pod_bindings(&pod).await;
            }
            Err(message) => error!("{}", message),
        }
    }
}

/// Recover the deleted pod from a deletion event
///
/// Tombstones are unwrapped to the last known object. When the object is
/// missing, has no name or does not decode, a bare Pod is built from the
/// tombstone key or the event's resource key. Objects of another kind are
/// rejected.
pub fn deleted_pod(event: &ResourceEvent) -> Result<Pod, String> {
    let (object, tombstone_key) = if event.final_state_unknown {
        match serde_json::from_value::<DeletedFinalStateUnknown>(event.object.clone()) {
            Ok(tombstone) => (tombstone.obj, Some(tombstone.key)),
            Err(e) => {
                warn!(
                    "Unable to decode tombstone for {}: {}",
                    event.resource_key, e
                );
                (serde_json::Value::Null, None)
            }
        }
    } else {
        (event.object.clone(), None)
    };

    if let Some(kind) = object.get("kind").and_then(|k| k.as_str()) {
        if kind != "Pod" {
            return Err(format!(
                "unable to convert object of kind {} for {} to Pod",
                kind, event.resource_key
            ));
        }
    }

    let decoded = if object.is_null() {
        None
    } else {
        match serde_json::from_value::<Pod>(object) {
            Ok(pod) => Some(pod),
            Err(e) => {
                warn!(
                    "Unable to convert object for {} to Pod: {}",
                    event.resource_key, e
                );
                None
            }
        }
    };

    let mut pod = decoded.unwrap_or_default();
    if pod.metadata.name.is_some() {
        return Ok(pod);
    }

    let (namespace, name) = tombstone_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .map(split_cache_key)
        .or_else(|| {
            (!event.resource_key.name.is_empty()).then(|| {
                (
                    event.resource_key.namespace.clone(),
                    event.resource_key.name.clone(),
                )
            })
        })
        .ok_or_else(|| {
            format!(
                "unable to identify deleted pod from event for {}",
                event.resource_key
            )
        })?;

    debug!(
        "Resolved deleted pod {}/{} from its key only",
        namespace, name
    );
    pod.metadata.name = Some(name);
    pod.metadata.namespace = Some(namespace);
    Ok(pod)
}

/// Split a "{namespace}/{name}" cache key; keys without a slash are cluster-scoped
fn split_cache_key(key: &str) -> (String, String) {
    match key.split_once('/') {
        Some((namespace, name)) => (namespace.to_string(), name.to_string()),
        None => (String::new(), key.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::MockVolumeBinder;
    use serde_json::json;
    use std::time::Duration;
    use tether_core::{GroupVersionKind, ResourceKey};

    fn pod_json(name: &str) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": "default"}
        })
    }

    fn pod_key(name: &str) -> ResourceKey {
        ResourceKey::new(GroupVersionKind::pod(), "default", name)
    }

    async fn assumed_binder(names: &[&str]) -> MockVolumeBinder {
        let binder = MockVolumeBinder::new(Duration::from_secs(600));
        for name in names {
            let pod: Pod = serde_json::from_value(pod_json(name)).unwrap();
            binder.assume_pod_volumes(&pod, "node-a").await.unwrap();
        }
        binder
    }

    #[test]
    fn test_deleted_pod_plain_payload() {
        let event = ResourceEvent::deleted(pod_key("web"), pod_json("web"), "4".into());
        let pod = deleted_pod(&event).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("web"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn test_deleted_pod_tombstone_payload() {
        let event =
            ResourceEvent::deleted_final_state_unknown(pod_key("web"), pod_json("web"), "5".into());
        let pod = deleted_pod(&event).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("web"));
    }

    #[test]
    fn test_deleted_pod_falls_back_to_resource_key() {
        let event = ResourceEvent::deleted(pod_key("web"), json!({}), "6".into());
        let pod = deleted_pod(&event).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("web"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn test_deleted_pod_tombstone_without_obj() {
        let mut event =
            ResourceEvent::deleted(pod_key("web"), json!({"key": "default/web"}), "13".into());
        event.final_state_unknown = true;
        let pod = deleted_pod(&event).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("web"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("default"));

        // The tombstone key wins over the event's resource key
        let mut event = ResourceEvent::deleted(
            pod_key("stale"),
            json!({"key": "shop/web-0", "obj": null}),
            "14".into(),
        );
        event.final_state_unknown = true;
        let pod = deleted_pod(&event).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("web-0"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("shop"));
    }

    #[test]
    fn test_deleted_pod_undecodable_payload_uses_resource_key() {
        let event = ResourceEvent::deleted(pod_key("web"), json!("garbage"), "8".into());
        let pod = deleted_pod(&event).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("web"));

        let mut event = ResourceEvent::deleted(pod_key("web"), json!(42), "9".into());
        event.final_state_unknown = true;
        let pod = deleted_pod(&event).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("web"));
    }

    #[test]
    fn test_deleted_pod_unresolvable() {
        let node = json!({"apiVersion": "v1", "kind": "Node", "metadata": {"name": "node-a"}});
        let event = ResourceEvent::deleted_final_state_unknown(pod_key("web"), node, "7".into());
        assert!(deleted_pod(&event).is_err());

        let nameless = ResourceKey::new(GroupVersionKind::pod(), "default", "");
        let mut event = ResourceEvent::deleted(nameless, json!("garbage"), "8".into());
        assert!(deleted_pod(&event).is_err());

        event.final_state_unknown = true;
        assert!(deleted_pod(&event).is_err());
    }

    #[tokio::test]
    async fn test_handle_event_deletes_record_once() {
        let binder = assumed_binder(&["web", "db"]).await;
        let listener = PodDeletionListener::new(Arc::new(binder.clone()));

        let event = ResourceEvent::deleted(pod_key("web"), pod_json("web"), "9".into());
        listener.handle_event(&event).await;
        listener.handle_event(&event).await;

        assert!(binder.binding("default/web").await.is_none());
        assert!(binder.binding("default/db").await.is_some());
        assert_eq!(binder.calls().await.delete, 2);
    }

    #[tokio::test]
    async fn test_handle_event_tombstone_without_obj_releases_record() {
        let binder = assumed_binder(&["web"]).await;
        let listener = PodDeletionListener::new(Arc::new(binder.clone()));

        let mut event =
            ResourceEvent::deleted(pod_key("web"), json!({"key": "default/web"}), "12".into());
        event.final_state_unknown = true;
        listener.handle_event(&event).await;

        assert!(binder.binding("default/web").await.is_none());
        assert_eq!(binder.calls().await.delete, 1);
    }

    #[tokio::test]
    async fn test_handle_event_ignores_other_events() {
        let binder = assumed_binder(&["web"]).await;
        let listener = PodDeletionListener::new(Arc::new(binder.clone()));

        let modified = ResourceEvent::modified(pod_key("web"), pod_json("web"), "10".into());
        listener.handle_event(&modified).await;

        let nameless = ResourceKey::new(GroupVersionKind::pod(), "default", "");
        let garbage = ResourceEvent::deleted(nameless, json!(42), "11".into());
        listener.handle_event(&garbage).await;

        assert!(binder.binding("default/web").await.is_some());
        assert_eq!(binder.calls().await.delete, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let binder = assumed_binder(&["web"]).await;
        let (tx, rx) = broadcast::channel(16);
        let shutdown = CancellationToken::new();

        let handle = PodDeletionListener::new(Arc::new(binder.clone())).spawn_on(
            &tokio::runtime::Handle::current(),
            rx,
            shutdown.clone(),
        );

        tx.send(ResourceEvent::deleted_final_state_unknown(
            pod_key("web"),
            pod_json("web"),
            "12".into(),
        ))
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while binder.binding_count().await > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_when_bus_closes() {
        let binder = MockVolumeBinder::new(Duration::from_secs(600));
        let (tx, rx) = broadcast::channel::<ResourceEvent>(16);
        let listener = PodDeletionListener::new(Arc::new(binder));

        drop(tx);
        tokio::time::timeout(
            Duration::from_secs(5),
            listener.run(rx, CancellationToken::new()),
        )
        .await
        .unwrap();
    }
}
