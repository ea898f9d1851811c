use crate::binder::VolumeBinderFactory;
use crate::{Result, SchedulerError};
use std::sync::Arc;
use tether_core::ResourceEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of the broadcast channel
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

/// Services the framework hands to plugins at construction time
#[derive(Clone)]
pub struct FrameworkHandle {
    /// Broadcast channel carrying cluster object events
    event_tx: broadcast::Sender<ResourceEvent>,
    binder_factory: Arc<dyn VolumeBinderFactory>,
    /// Cancelled when the scheduler shuts down; background plugin tasks watch it
    shutdown: CancellationToken,
}

impl FrameworkHandle {
    /// Create a handle publishing on an existing event bus
    pub fn new(
        event_tx: broadcast::Sender<ResourceEvent>,
        binder_factory: Arc<dyn VolumeBinderFactory>,
    ) -> Self {
        Self {
            event_tx,
            binder_factory,
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a handle with its own event bus
    ///
    /// Fails if the bus capacity is zero.
    pub fn with_event_bus_config(
        config: EventBusConfig,
        binder_factory: Arc<dyn VolumeBinderFactory>,
    ) -> Result<Self> {
        if config.capacity == 0 {
            return Err(SchedulerError::config_error(
                "event bus capacity must be greater than zero",
            ));
        }
        let (event_tx, _) = broadcast::channel(config.capacity);
        Ok(Self::new(event_tx, binder_factory))
    }

    /// Subscribe to cluster object events
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.event_tx.subscribe()
    }

    /// Sender side of the event bus
    pub fn event_sender(&self) -> broadcast::Sender<ResourceEvent> {
        self.event_tx.clone()
    }

    pub fn volume_binder_factory(&self) -> &Arc<dyn VolumeBinderFactory> {
        &self.binder_factory
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal background plugin tasks to stop
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
