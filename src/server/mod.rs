//! Server module for building the hub's HTTP server
//!
//! This module provides:
//! - `HubHost`, the transport-agnostic hub state
//! - `HubBuilder`, which validates configuration and builds the router
//! - `WebSocketExposure`, the single upgrade endpoint clients connect to

pub mod builder;
pub mod exposure;
pub mod host;

pub use builder::HubBuilder;
pub use exposure::WebSocketExposure;
pub use exposure::websocket::ConnectionManager;
pub use host::HubHost;
