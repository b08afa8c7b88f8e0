//! # pagehub
//!
//! A real-time WebSocket hub connecting the processes that author UI pages
//! (host clients) with the browsers that view them (web clients).
//!
//! ## Features
//!
//! - **Shared pages**: one implicit session (`"0"`) seen by every viewer
//! - **App pages**: a fresh session per viewer, handed round-robin to the page's hosts
//! - **Command routing**: host commands edit the page's control tree; changes are pushed to viewers
//! - **Event routing**: viewer UI events reach exactly the hosts of the viewer's session
//! - **Bounded send queues**: a slow peer never stalls a broadcast
//! - **Keepalive**: idle connections are detected and torn down
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pagehub::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     HubBuilder::new()
//!         .with_config(HubConfig::from_yaml_file("pagehub.yaml")?)
//!         .serve()
//!         .await
//! }
//! ```

pub mod config;
pub mod core;
pub mod server;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        ClientRole, CommandOutcome, CommandProcessor, Connection, Control, EventBus, EventEnvelope,
        HubError, HubEvent, HubResult, Page, PageRegistry, Session, TextCommandProcessor,
    };

    // === Config ===
    pub use crate::config::{HubConfig, OverflowPolicy, TransportConfig};

    // === Server ===
    pub use crate::server::{ConnectionManager, HubBuilder, HubHost, WebSocketExposure};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
}
