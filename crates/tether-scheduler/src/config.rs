use crate::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Arguments for one plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin name, e.g. "VolumeBinding"
    pub name: String,
    /// Plugin-specific arguments, decoded by the plugin itself
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Scheduler configuration file
///
/// ```yaml
/// pluginConfig:
///   - name: VolumeBinding
///     args:
///       bindTimeoutSeconds: 300
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfiguration {
    #[serde(default)]
    pub plugin_config: Vec<PluginConfig>,
}

impl SchedulerConfiguration {
    /// Parse a configuration from YAML (JSON is valid YAML)
    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(tether_core::from_yaml(data)?)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::config_error(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&data)
    }

    /// Raw arguments of the named plugin, or `null` if it has no entry
    pub fn plugin_args(&self, name: &str) -> serde_json::Value {
        self.plugin_config
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.args.clone())
            .unwrap_or(serde_json::Value::Null)
    }
}
