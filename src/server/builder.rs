//! HubBuilder for fluent API to build the hub server

use super::exposure::WebSocketExposure;
use super::host::HubHost;
use crate::config::HubConfig;
use crate::core::command::{CommandProcessor, TextCommandProcessor};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Builder for the hub's HTTP server
///
/// # Example
///
/// ```ignore
/// HubBuilder::new()
///     .with_config(HubConfig::from_yaml_file("pagehub.yaml")?)
///     .serve()
///     .await?;
/// ```
pub struct HubBuilder {
    config: HubConfig,
    commands: Option<Arc<dyn CommandProcessor>>,
    custom_routes: Vec<Router>,
}

impl HubBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: HubConfig::default(),
            commands: None,
            custom_routes: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the built-in text command processor
    pub fn with_command_processor(mut self, processor: impl CommandProcessor + 'static) -> Self {
        self.commands = Some(Arc::new(processor));
        self
    }

    /// Add routes served next to the WebSocket endpoint (health checks, static files)
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    ///
    /// Fails when the configuration does not validate.
    pub fn build_host(&mut self) -> Result<HubHost> {
        self.config.validate()?;

        let commands = self
            .commands
            .take()
            .unwrap_or_else(|| Arc::new(TextCommandProcessor::new()));

        Ok(HubHost::with_command_processor(
            self.config.clone(),
            commands,
        ))
    }

    /// Build the router together with the host it serves
    ///
    /// Keep the host to observe its event bus or inspect its registry.
    pub fn build_with_host(mut self) -> Result<(Arc<HubHost>, Router)> {
        let host = Arc::new(self.build_host()?);

        let mut app = WebSocketExposure::build_router(host.clone())?;
        for routes in std::mem::take(&mut self.custom_routes) {
            app = app.merge(routes);
        }

        Ok((host, app.layer(TraceLayer::new_for_http())))
    }

    /// Build the final router
    pub fn build(self) -> Result<Router> {
        let (_, app) = self.build_with_host()?;
        Ok(app)
    }

    /// Serve the hub on the configured address with graceful shutdown
    ///
    /// This will:
    /// - Bind to `config.listen_addr`
    /// - Start serving WebSocket upgrades
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.listen_addr.clone();
        let app = self.build()?;
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("Hub listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Hub shutdown complete");
        Ok(())
    }
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::CommandOutcome;
    use crate::core::error::HubResult;
    use crate::core::page::Page;

    struct NoopProcessor;

    #[async_trait::async_trait]
    impl CommandProcessor for NoopProcessor {
        async fn execute(&self, _page: &Page, _command: &str) -> HubResult<CommandOutcome> {
            Ok(CommandOutcome::default())
        }
    }

    #[tokio::test]
    async fn test_default_builder_builds() {
        assert!(HubBuilder::new().build().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = HubConfig::default();
        config.transport.send_queue_capacity = 0;

        let result = HubBuilder::new().with_config(config).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_build_with_host_shares_config() {
        let mut config = HubConfig::default();
        config.ws_path = "/hub".to_string();

        let (host, _app) = HubBuilder::new()
            .with_config(config)
            .with_command_processor(NoopProcessor)
            .with_custom_routes(Router::new())
            .build_with_host()
            .unwrap();

        assert_eq!(host.config().ws_path, "/hub");
        assert!(host.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_custom_processor_is_installed() {
        let mut builder = HubBuilder::new().with_command_processor(NoopProcessor);
        let host = builder.build_host().unwrap();
        let page = Page::new("home", false);

        let outcome = host.commands.execute(&page, "add text").await.unwrap();

        assert!(!outcome.is_mutation());
        assert_eq!(page.control_count().await, 1);
    }
}
