//! Configuration loading and management

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when a connection's outbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to make room for the new one
    DropOldest,
    /// Discard the frame being enqueued
    DropNewest,
    /// Close the slow connection
    #[default]
    Disconnect,
}

/// Per-connection transport parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum inbound frame size in bytes
    pub max_message_size: usize,

    /// Idle-read deadline, re-armed on every read and pong
    pub read_timeout_ms: u64,

    /// Keepalive ping period (defaults to 9/10 of the read timeout)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_ms: Option<u64>,

    /// Deadline for a single socket write
    pub write_timeout_ms: u64,

    /// Capacity of each connection's outbound queue
    pub send_queue_capacity: usize,

    /// Policy applied when the outbound queue is full
    pub overflow_policy: OverflowPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: 512,
            read_timeout_ms: 60_000,
            ping_interval_ms: None,
            write_timeout_ms: 10_000,
            send_queue_capacity: 256,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl TransportConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Keepalive period; must stay below the read timeout
    pub fn ping_interval(&self) -> Duration {
        match self.ping_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_millis(self.read_timeout_ms * 9 / 10),
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Complete configuration for the hub
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Address the bundled server binds to
    pub listen_addr: String,

    /// Path of the WebSocket upgrade endpoint
    pub ws_path: String,

    /// Buffer size of the lifecycle event bus
    pub event_bus_capacity: usize,

    /// Transport parameters applied to every connection
    pub transport: TransportConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8550".to_string(),
            ws_path: "/ws".to_string(),
            event_bus_capacity: 1024,
            transport: TransportConfig::default(),
        }
    }
}

impl HubConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the connection pumps cannot honor
    pub fn validate(&self) -> Result<()> {
        let transport = &self.transport;

        if transport.max_message_size == 0 {
            bail!("transport.max_message_size must be greater than zero");
        }
        if transport.send_queue_capacity == 0 {
            bail!("transport.send_queue_capacity must be greater than zero");
        }
        if transport.write_timeout_ms == 0 {
            bail!("transport.write_timeout_ms must be greater than zero");
        }
        if transport.ping_interval().is_zero() {
            bail!("transport.ping_interval_ms must be greater than zero");
        }
        if transport.ping_interval() >= transport.read_timeout() {
            bail!(
                "transport.ping_interval_ms ({}ms) must be shorter than read_timeout_ms ({}ms)",
                transport.ping_interval().as_millis(),
                transport.read_timeout_ms
            );
        }
        if !self.ws_path.starts_with('/') {
            bail!("ws_path must start with '/', got '{}'", self.ws_path);
        }

        Ok(())
    }
}
