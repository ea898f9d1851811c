use crate::volumebinding::NAME;
use crate::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bind timeout used when `bindTimeoutSeconds` is not set
pub const DEFAULT_BIND_TIMEOUT_SECONDS: i64 = 600;

/// Arguments of the VolumeBinding plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VolumeBindingArgs {
    /// How long PreBind waits for the volume commit to complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_timeout_seconds: Option<i64>,
}

impl VolumeBindingArgs {
    /// Decode the plugin's `args` entry; `null` yields the defaults
    pub fn decode(raw: &serde_json::Value) -> Result<Self> {
        if raw.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(raw.clone())
            .map_err(|e| SchedulerError::invalid_args(NAME, e.to_string()))
    }

    /// An explicitly set timeout must be strictly positive
    pub fn validate(&self) -> Result<()> {
        match self.bind_timeout_seconds {
            Some(seconds) if seconds <= 0 => Err(SchedulerError::invalid_args(
                NAME,
                format!(
                    "invalid BindTimeoutSeconds: {}, must be positive integer",
                    seconds
                ),
            )),
            _ => Ok(()),
        }
    }

    /// The bind timeout to hand to the volume binder
    pub fn bind_timeout(&self) -> Duration {
        let seconds = self
            .bind_timeout_seconds
            .unwrap_or(DEFAULT_BIND_TIMEOUT_SECONDS);
        // validate() rejects non-positive values before this is used
        Duration::from_secs(seconds.max(1) as u64)
    }
}
