//! Tether Scheduler - volume-aware pod scheduling
//!
//! This crate provides:
//! - A plugin framework (Filter, Reserve, PreBind, Unreserve, PostBind)
//! - The VolumeBinding plugin and its pod deletion listener
//! - The volume binder contract with an in-memory implementation
//! - A scheduler that runs one pod at a time through the plugins

pub mod binder;
pub mod config;
pub mod error;
pub mod framework;
pub mod scheduler;
pub mod volumebinding;

// Re-export commonly used types
pub use binder::{MockVolumeBinder, VolumeBinder, VolumeBinderFactory};
pub use config::{PluginConfig, SchedulerConfiguration};
pub use error::{BinderError, Result, SchedulerError};
pub use framework::{CycleState, FrameworkHandle, Status};
pub use scheduler::{ScheduleOutcome, Scheduler};
pub use volumebinding::{VolumeBinding, VolumeBindingArgs};
