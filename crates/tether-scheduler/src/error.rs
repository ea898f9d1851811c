// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// No suitable nodes found
    #[error("No suitable nodes found for pod {pod_name}: {reason}")]
    #[diagnostic(
        code(scheduler::no_suitable_nodes),
        help("Check the pod's volume claims and the nodes they can be satisfied on")
    )]
    NoSuitableNodes {
        pod_name: String,
        reason: String,
    },

    /// Scheduling failed
    #[error("Scheduling failed: {message}")]
    #[diagnostic(
        code(scheduler::scheduling_failed),
        help("{suggestion}")
    )]
    SchedulingFailed {
        message: String,
        suggestion: String,
    },

    /// Plugin arguments failed to decode or validate
    #[error("Invalid arguments for plugin {plugin}: {message}")]
    #[diagnostic(
        code(scheduler::invalid_args),
        help("Fix the plugin's entry under pluginConfig in the scheduler configuration")
    )]
    InvalidArgs {
        plugin: String,
        message: String,
    },

    /// Cycle state has no value under the requested key
    #[error("{key}: not found")]
    #[diagnostic(
        code(scheduler::state_not_found),
        help("The plugin that writes this key did not run earlier in the cycle")
    )]
    StateNotFound {
        key: String,
    },

    /// Cycle state holds a value of another type under the requested key
    #[error("unable to convert state into {expected}")]
    #[diagnostic(
        code(scheduler::state_type_mismatch),
        help("Two plugins are writing different types under key {key}")
    )]
    StateTypeMismatch {
        key: String,
        expected: String,
    },

    /// Configuration file could not be loaded
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(scheduler::config_error),
        help("Check that the scheduler configuration file exists and is valid YAML or JSON")
    )]
    ConfigError {
        message: String,
    },

    /// Core error
    #[error("Core error: {0}")]
    #[diagnostic(
        code(scheduler::core_error),
        help("This is an internal error")
    )]
    CoreError(#[from] tether_core::CoreError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    InternalError {
        message: String,
    },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a NoSuitableNodes error
    pub fn no_suitable_nodes(pod_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoSuitableNodes {
            pod_name: pod_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a SchedulingFailed error
    pub fn scheduling_failed(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::SchedulingFailed {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an InvalidArgs error
    pub fn invalid_args(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgs {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a StateNotFound error
    pub fn state_not_found(key: impl Into<String>) -> Self {
        Self::StateNotFound { key: key.into() }
    }

    /// Create a StateTypeMismatch error
    pub fn state_type_mismatch(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::StateTypeMismatch {
            key: key.into(),
            expected: expected.into(),
        }
    }

    /// Create a ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

/// Errors reported by a volume binder
#[derive(Error, Debug, Diagnostic)]
pub enum BinderError {
    /// Claims or volumes needed for matching could not be looked up
    #[error("failed to find volumes for pod {pod}: {message}")]
    #[diagnostic(code(binder::find_failed))]
    FindFailed {
        pod: String,
        message: String,
    },

    /// Volumes could not be assumed on the chosen node
    #[error("failed to assume volumes for pod {pod} on node {node}: {message}")]
    #[diagnostic(
        code(binder::assume_failed),
        help("Another pod may have claimed the same volumes in a concurrent cycle")
    )]
    AssumeFailed {
        pod: String,
        node: String,
        message: String,
    },

    /// The bind phase was entered without a prior assume
    #[error("no assumed bindings found for pod {pod}")]
    #[diagnostic(
        code(binder::not_assumed),
        help("Reserve must succeed before PreBind is called")
    )]
    NotAssumed {
        pod: String,
    },

    /// Committing the bindings failed
    #[error("failed to bind volumes for pod {pod}: {message}")]
    #[diagnostic(code(binder::bind_failed))]
    BindFailed {
        pod: String,
        message: String,
    },

    /// The commit did not complete within the bind timeout
    #[error("binding volumes for pod {pod} timed out after {timeout:?}")]
    #[diagnostic(
        code(binder::bind_timeout),
        help("Raise bindTimeoutSeconds or check the volume controller")
    )]
    BindTimeout {
        pod: String,
        timeout: Duration,
    },

    /// The commit was undone while waiting for it to complete
    #[error("binding volumes for pod {pod} was undone: {reason}")]
    #[diagnostic(
        code(binder::binding_undone),
        help("The pod will be retried in a later scheduling cycle")
    )]
    BindingUndone {
        pod: String,
        reason: String,
    },
}

impl BinderError {
    /// Create a FindFailed error
    pub fn find_failed(pod: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FindFailed {
            pod: pod.into(),
            message: message.into(),
        }
    }

    /// Create an AssumeFailed error
    pub fn assume_failed(
        pod: impl Into<String>,
        node: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AssumeFailed {
            pod: pod.into(),
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a BindFailed error
    pub fn bind_failed(pod: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BindFailed {
            pod: pod.into(),
            message: message.into(),
        }
    }

    /// Create a BindingUndone error
    pub fn binding_undone(pod: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BindingUndone {
            pod: pod.into(),
            reason: reason.into(),
        }
    }
}
