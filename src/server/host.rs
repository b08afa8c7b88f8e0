//! Server host for transport-agnostic hub state
//!
//! `HubHost` holds everything a connection handler needs: configuration, the
//! page registry, the command processor and the lifecycle event bus. It knows
//! nothing about WebSockets; exposures consume it to build their routers.

use crate::config::HubConfig;
use crate::core::command::{CommandProcessor, TextCommandProcessor};
use crate::core::events::EventBus;
use crate::core::registry::PageRegistry;
use std::sync::Arc;

/// Host context containing all hub state
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(HubHost::new(HubConfig::default()));
/// let app = WebSocketExposure::build_router(host.clone())?;
///
/// let mut events = host.event_bus().subscribe();
/// ```
pub struct HubHost {
    /// Configuration the hub was built with
    pub config: Arc<HubConfig>,

    /// Every page published by a host client
    pub registry: Arc<PageRegistry>,

    /// Applies `pageCommandFromHost` command strings
    pub commands: Arc<dyn CommandProcessor>,

    /// Lifecycle notifications (connections, pages, sessions)
    pub event_bus: Arc<EventBus>,
}

impl HubHost {
    /// Build a host with the built-in text command processor
    pub fn new(config: HubConfig) -> Self {
        Self::with_command_processor(config, Arc::new(TextCommandProcessor::new()))
    }

    pub fn with_command_processor(config: HubConfig, commands: Arc<dyn CommandProcessor>) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));
        Self {
            config: Arc::new(config),
            registry: Arc::new(PageRegistry::new()),
            commands,
            event_bus,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PageRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for HubHost {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
