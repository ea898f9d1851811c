use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// GroupVersionKind uniquely identifies a Kubernetes resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// API group (e.g., "", "apps", "storage.k8s.io")
    pub group: String,
    /// API version (e.g., "v1", "v1beta1")
    pub version: String,
    /// Resource kind (e.g., "Pod", "Node")
    pub kind: String,
}

impl GroupVersionKind {
    /// Create a GVK from apiVersion and kind
    /// apiVersion format: "v1" or "group/version"
    pub fn from_api_version_kind(api_version: &str, kind: &str) -> Self {
        let (group, version) = if let Some(idx) = api_version.find('/') {
            let (g, v) = api_version.split_at(idx);
            (g.to_string(), v[1..].to_string())
        } else {
            (String::new(), api_version.to_string())
        };

        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }

    /// GVK of core/v1 Pods
    pub fn pod() -> Self {
        Self::from_api_version_kind("v1", "Pod")
    }

    /// Get the apiVersion string (group/version or just version)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// ResourceKey uniquely identifies a specific resource instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// GroupVersionKind of the resource
    pub gvk: GroupVersionKind,
    /// Namespace (empty for cluster-scoped resources)
    pub namespace: String,
    /// Resource name
    pub name: String,
}

impl ResourceKey {
    /// Create a new ResourceKey
    pub fn new(gvk: GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a Pod object
    pub fn for_pod(pod: &Pod) -> Self {
        Self::new(
            GroupVersionKind::pod(),
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        )
    }

    /// Check if this is a namespaced resource
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Get the cache key used by informers: {namespace}/{name} or {name}
    pub fn cache_key(&self) -> String {
        if self.is_namespaced() {
            format!("{}/{}", self.namespace, self.name)
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_namespaced() {
            write!(f, "{}/{}/{}", self.gvk, self.namespace, self.name)
        } else {
            write!(f, "{}/{}", self.gvk, self.name)
        }
    }
}

/// Identity of a pod as "{namespace}/{name}"
///
/// Missing fields render as empty strings so the key is always defined.
pub fn pod_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or_default(),
        pod.metadata.name.as_deref().unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gvk_from_api_version() {
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Pod");
        assert_eq!(gvk.api_version(), "v1");

        let gvk = GroupVersionKind::from_api_version_kind("storage.k8s.io/v1", "StorageClass");
        assert_eq!(gvk.group, "storage.k8s.io");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "StorageClass");
        assert_eq!(gvk.api_version(), "storage.k8s.io/v1");
    }

    #[test]
    fn test_resource_key_cache_key() {
        let key = ResourceKey::new(GroupVersionKind::pod(), "default", "nginx");
        assert_eq!(key.cache_key(), "default/nginx");
        assert_eq!(key.to_string(), "v1/Pod/default/nginx");

        let node = GroupVersionKind::from_api_version_kind("v1", "Node");
        let key = ResourceKey::new(node, "", "node-1");
        assert_eq!(key.cache_key(), "node-1");
        assert_eq!(key.to_string(), "v1/Node/node-1");
    }

    #[test]
    fn test_pod_key() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("web-0".to_string());
        pod.metadata.namespace = Some("shop".to_string());
        assert_eq!(pod_key(&pod), "shop/web-0");
        assert_eq!(ResourceKey::for_pod(&pod).cache_key(), "shop/web-0");

        pod.metadata.namespace = None;
        assert_eq!(pod_key(&pod), "/web-0");
    }
}
