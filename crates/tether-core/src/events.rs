use crate::types::{GroupVersionKind, ResourceKey};
use serde::{Deserialize, Serialize};

/// Watch event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Error,
}

/// Placeholder delivered in place of a deleted object whose final state was
/// missed while the watch was disconnected.
///
/// `obj` holds the last state the watcher had seen, which may be stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedFinalStateUnknown {
    /// Cache key of the deleted object ({namespace}/{name})
    #[serde(default)]
    pub key: String,
    /// Last known state of the object; null when it was never observed
    #[serde(default)]
    pub obj: serde_json::Value,
}

/// A resource event emitted on object mutations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// Type of watch event (ADDED, MODIFIED, DELETED)
    pub event_type: WatchEventType,
    /// GroupVersionKind of the resource
    pub gvk: GroupVersionKind,
    /// Full resource key (gvk + namespace + name)
    pub resource_key: ResourceKey,
    /// The serialized resource object, or a serialized
    /// `DeletedFinalStateUnknown` when `final_state_unknown` is set
    pub object: serde_json::Value,
    /// Resource version at the time of the event
    pub resource_version: String,
    /// Set on deletions observed only through a relist
    #[serde(default)]
    pub final_state_unknown: bool,
}

impl ResourceEvent {
    fn new(
        event_type: WatchEventType,
        resource_key: ResourceKey,
        object: serde_json::Value,
        resource_version: String,
    ) -> Self {
        Self {
            event_type,
            gvk: resource_key.gvk.clone(),
            resource_key,
            object,
            resource_version,
            final_state_unknown: false,
        }
    }

    /// Create an ADDED event
    pub fn added(
        resource_key: ResourceKey,
        object: serde_json::Value,
        resource_version: String,
    ) -> Self {
        Self::new(WatchEventType::Added, resource_key, object, resource_version)
    }

    /// Create a MODIFIED event
    pub fn modified(
        resource_key: ResourceKey,
        object: serde_json::Value,
        resource_version: String,
    ) -> Self {
        Self::new(WatchEventType::Modified, resource_key, object, resource_version)
    }

    /// Create a DELETED event
    pub fn deleted(
        resource_key: ResourceKey,
        object: serde_json::Value,
        resource_version: String,
    ) -> Self {
        Self::new(WatchEventType::Deleted, resource_key, object, resource_version)
    }

    /// Create a DELETED event carrying a tombstone instead of the final object
    pub fn deleted_final_state_unknown(
        resource_key: ResourceKey,
        last_known: serde_json::Value,
        resource_version: String,
    ) -> Self {
        let tombstone = DeletedFinalStateUnknown {
            key: resource_key.cache_key(),
            obj: last_known,
        };
        // A struct of a String and a Value always serializes
        let object = serde_json::to_value(&tombstone).unwrap_or_default();

        let mut event = Self::new(WatchEventType::Deleted, resource_key, object, resource_version);
        event.final_state_unknown = true;
        event
    }

    /// Whether this event reports the deletion of a Pod
    pub fn is_pod_deletion(&self) -> bool {
        self.event_type == WatchEventType::Deleted && self.gvk == GroupVersionKind::pod()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_event_serde_roundtrip() {
        let key = ResourceKey::new(GroupVersionKind::pod(), "default", "nginx");
        let object =
            serde_json::json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "nginx"}});

        let event = ResourceEvent::deleted(key, object.clone(), "abc123".to_string());

        let serialized = serde_json::to_string(&event).unwrap();
        assert!(serialized.contains("\"DELETED\""));
        let deserialized: ResourceEvent = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.event_type, WatchEventType::Deleted);
        assert_eq!(deserialized.resource_key.name, "nginx");
        assert_eq!(deserialized.object, object);
        assert!(!deserialized.final_state_unknown);
        assert!(deserialized.is_pod_deletion());
    }

    #[test]
    fn test_tombstone_event() {
        let key = ResourceKey::new(GroupVersionKind::pod(), "default", "nginx");
        let last_known = serde_json::json!({"metadata": {"name": "nginx", "namespace": "default"}});

        let event = ResourceEvent::deleted_final_state_unknown(key, last_known.clone(), "7".into());
        assert!(event.final_state_unknown);
        assert!(event.is_pod_deletion());

        let tombstone: DeletedFinalStateUnknown =
            serde_json::from_value(event.object.clone()).unwrap();
        assert_eq!(tombstone.key, "default/nginx");
        assert_eq!(tombstone.obj, last_known);
    }

    #[test]
    fn test_is_pod_deletion() {
        let pod_key = ResourceKey::new(GroupVersionKind::pod(), "default", "nginx");
        let added = ResourceEvent::added(pod_key, serde_json::json!({}), "1".into());
        assert!(!added.is_pod_deletion());

        let node = GroupVersionKind::from_api_version_kind("v1", "Node");
        let node_key = ResourceKey::new(node, "", "node-1");
        let deleted = ResourceEvent::deleted(node_key, serde_json::json!({}), "2".into());
        assert!(!deleted.is_pod_deletion());
    }

    #[test]
    fn test_final_state_unknown_defaults_when_absent() {
        let raw = serde_json::json!({
            "event_type": "DELETED",
            "gvk": {"group": "", "version": "v1", "kind": "Pod"},
            "resource_key": {
                "gvk": {"group": "", "version": "v1", "kind": "Pod"},
                "namespace": "default",
                "name": "nginx"
            },
            "object": {},
            "resource_version": "3"
        });
        let event: ResourceEvent = serde_json::from_value(raw).unwrap();
        assert!(!event.final_state_unknown);
    }
}
