//! Tether Core - Fundamental types shared by the Tether scheduler crates
//!
//! This crate provides:
//! - Kubernetes object re-exports (Pod, Node) and pod helpers
//! - Error types with miette diagnostics
//! - Type-safe resource keys and identifiers
//! - Watch events, including tombstones for missed deletions
//! - Serialization helpers

pub mod error;
pub mod events;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use events::{DeletedFinalStateUnknown, ResourceEvent, WatchEventType};
pub use types::{pod_key, GroupVersionKind, ResourceKey};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod};

/// Returns true if any volume of the pod references a PersistentVolumeClaim
pub fn pod_has_pvcs(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .map(|spec| {
            spec.volumes
                .iter()
                .flatten()
                .any(|vol| vol.persistent_volume_claim.is_some())
        })
        .unwrap_or(false)
}

/// Serialize a resource to a JSON value
pub fn to_json_value<T: serde::Serialize>(resource: &T) -> Result<serde_json::Value> {
    serde_json::to_value(resource).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Split a multi-document YAML stream into JSON values, skipping empty documents
pub fn from_yaml_documents(data: &str) -> Result<Vec<serde_json::Value>> {
    use serde::Deserialize;

    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(data) {
        let value = serde_json::Value::deserialize(document).map_err(|e| {
            CoreError::serialization_error(
                format!("Failed to deserialize YAML document: {}", e),
                Some(Box::new(e)),
            )
        })?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        PersistentVolumeClaimVolumeSource, PodSpec, Volume,
    };

    #[test]
    fn test_json_serialization() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("nginx".to_string());

        let value = to_json_value(&pod).unwrap();
        assert_eq!(value["kind"], "Pod");
        assert_eq!(value["metadata"]["name"], "nginx");
    }

    #[test]
    fn test_yaml_documents() {
        let data = r#"
apiVersion: v1
kind: Node
metadata:
  name: node-1
---
---
apiVersion: v1
kind: Pod
metadata:
  name: web
  namespace: default
"#;
        let docs = from_yaml_documents(data).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], "Node");
        assert_eq!(docs[1]["metadata"]["name"], "web");
    }

    #[test]
    fn test_pod_has_pvcs() {
        let mut pod = Pod::default();
        assert!(!pod_has_pvcs(&pod));

        pod.spec = Some(PodSpec {
            volumes: Some(vec![Volume {
                name: "scratch".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        assert!(!pod_has_pvcs(&pod));

        pod.spec.as_mut().unwrap().volumes.as_mut().unwrap().push(Volume {
            name: "data".to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: "data-claim".to_string(),
                read_only: None,
            }),
            ..Default::default()
        });
        assert!(pod_has_pvcs(&pod));
    }
}
