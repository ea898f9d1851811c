//! Scheduling framework primitives shared by plugins and the scheduler
//!
//! Plugins implement one or more extension-point traits and communicate
//! within a scheduling attempt through the typed `CycleState`.

mod cycle_state;
mod handle;
mod interface;
mod status;

pub use cycle_state::{CycleState, StateData, StateKey};
pub use handle::{EventBusConfig, FrameworkHandle};
pub use interface::{
    FilterPlugin, NodeInfo, Plugin, PostBindPlugin, PreBindPlugin, ReservePlugin,
    UnreservePlugin,
};
pub use status::{Code, Status};
