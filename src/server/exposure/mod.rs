//! API exposure modules
//!
//! Each exposure consumes a `HubHost` and produces a Router for its protocol.

pub mod websocket;

pub use websocket::WebSocketExposure;
