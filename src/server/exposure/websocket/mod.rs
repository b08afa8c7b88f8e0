//! WebSocket exposure of the hub
//!
//! A single upgrade endpoint (`ws_path`, `/ws` by default) accepts both host
//! clients and web clients; the role is decided by the first registration
//! message, not by the URL.
//!
//! # Architecture
//!
//! ```text
//! Client ──ws──▶ /ws ──▶ ws_handler() ──▶ read worker ──▶ ConnectionManager::dispatch()
//!                              │                                  │
//!                              └──────▶ write worker ◀── send queue ◀── fanout
//! ```
//!
//! # Protocol
//!
//! See [`protocol`] for the envelope and every payload shape.

mod fanout;
mod handler;
pub mod manager;
pub mod protocol;

pub use manager::ConnectionManager;

use crate::server::host::HubHost;
use anyhow::{Result, bail};
use axum::{Router, routing::get};
use std::sync::Arc;

/// WebSocket API exposure implementation
///
/// Consumes a `HubHost` and produces an Axum router with the upgrade
/// endpoint mounted at the configured path.
///
/// # Example
///
/// ```rust,ignore
/// use pagehub::server::{HubHost, WebSocketExposure};
/// use std::sync::Arc;
///
/// let host = Arc::new(HubHost::new(HubConfig::default()));
/// let app = WebSocketExposure::build_router(host)?;
///
/// axum::serve(listener, app).await?;
/// ```
pub struct WebSocketExposure;

impl WebSocketExposure {
    /// Build the WebSocket router from a host
    pub fn build_router(host: Arc<HubHost>) -> Result<Router> {
        Self::build_router_with_manager(host).map(|(_, router)| router)
    }

    /// Build the router and return the manager serving it
    ///
    /// Useful for monitoring live connections.
    pub fn build_router_with_manager(
        host: Arc<HubHost>,
    ) -> Result<(Arc<ConnectionManager>, Router)> {
        let path = host.config.ws_path.clone();
        if !path.starts_with('/') {
            bail!("WebSocket path must start with '/', got '{}'", path);
        }

        let manager = Arc::new(ConnectionManager::new(host));
        let router = Router::new()
            .route(&path, get(handler::ws_handler))
            .with_state(manager.clone());

        Ok((manager, router))
    }
}
