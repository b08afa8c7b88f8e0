//! Connection manager for WebSocket clients
//!
//! The `ConnectionManager` tracks every live connection and routes each
//! inbound envelope to its handler. Handlers resolve pages and sessions
//! through the host's registry, snapshot the audience and queue frames on
//! the audience's connections.
//!
//! # Architecture
//!
//! ```text
//! read worker ──frame──▶ ConnectionManager::dispatch()
//!                              │
//!                     match envelope.action
//!                              │
//!        ┌──────────────┬──────┴───────────┬─────────────────┐
//!  registerWebClient  registerHostClient  pageCommandFromHost  pageEventFromWeb
//!        │                  │                  │                   │
//!   join session       join session /     CommandProcessor     session hosts
//!   (mint if app)      host pool               │                   │
//!        │                                web clients ◀──┘         ▼
//!   pick pool host ──▶ sessionCreated                        pageEventToHost
//! ```

use super::fanout;
use super::protocol::{
    Envelope, PageCommandRequest, PageCommandResponse, PageEventPush, PageEventRequest,
    PageUpdatePush, RegisterClientRequest, RegisterClientResponse, SessionPush, actions,
    encode_push,
};
use crate::config::TransportConfig;
use crate::core::connection::{ClientRole, Connection};
use crate::core::error::{HubError, HubResult};
use crate::core::events::HubEvent;
use crate::core::page::Page;
use crate::core::session::{Session, ZERO_SESSION_ID};
use crate::server::host::HubHost;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Manages all active WebSocket connections and routes their messages
pub struct ConnectionManager {
    host: Arc<HubHost>,
    /// All active connections indexed by connection ID
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionManager {
    pub fn new(host: Arc<HubHost>) -> Self {
        Self {
            host,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &Arc<HubHost> {
        &self.host
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.host.config.transport
    }

    /// Register a freshly accepted socket
    pub async fn connect(&self) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(self.transport()));

        self.connections
            .write()
            .await
            .insert(conn.id().to_string(), conn.clone());

        tracing::debug!(connection_id = %conn.id(), "WebSocket client connected");
        self.host.event_bus.publish(HubEvent::ClientConnected {
            connection_id: conn.id().to_string(),
        });

        conn
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(connection_id).cloned()
    }

    /// Route one inbound text frame
    ///
    /// Only a frame that is not a valid envelope fails here; the caller must
    /// then terminate the connection. Application errors are answered in the
    /// correlated response and unknown actions are ignored.
    pub async fn dispatch(&self, conn: &Arc<Connection>, frame: &str) -> HubResult<()> {
        let envelope = Envelope::decode(frame)?;

        tracing::debug!(
            connection_id = %conn.id(),
            action = %envelope.action,
            id = %envelope.id,
            "Message received"
        );

        match envelope.action.as_str() {
            actions::REGISTER_WEB_CLIENT => {
                let result = self.register_web_client(conn, &envelope).await;
                log_failure(conn, &envelope, &result);
                self.respond(conn, &envelope, &RegisterClientResponse::from(result));
            }
            actions::REGISTER_HOST_CLIENT => {
                let result = self.register_host_client(conn, &envelope).await;
                log_failure(conn, &envelope, &result);
                self.respond(conn, &envelope, &RegisterClientResponse::from(result));
            }
            actions::PAGE_COMMAND_FROM_HOST => {
                let result = self.page_command(conn, &envelope).await;
                log_failure(conn, &envelope, &result);
                self.respond(conn, &envelope, &PageCommandResponse::from(result));
            }
            actions::PAGE_EVENT_FROM_WEB => {
                if let Err(e) = self.page_event(conn, &envelope).await {
                    tracing::warn!(
                        connection_id = %conn.id(),
                        error_code = e.error_code(),
                        error = %e,
                        "Web event dropped"
                    );
                }
            }
            other => {
                tracing::debug!(
                    connection_id = %conn.id(),
                    action = %other,
                    "Ignoring unknown action"
                );
            }
        }

        Ok(())
    }

    fn respond<P: Serialize>(&self, conn: &Connection, envelope: &Envelope, payload: &P) {
        match envelope.reply(payload) {
            Ok(frame) => {
                fanout::deliver(conn, frame, &envelope.action);
            }
            Err(e) => {
                tracing::error!(
                    connection_id = %conn.id(),
                    action = %envelope.action,
                    error = %e,
                    "Failed to serialize response"
                );
            }
        }
    }

    // ── Registration ────────────────────────────────────────────────────

    async fn register_web_client(
        &self,
        conn: &Arc<Connection>,
        envelope: &Envelope,
    ) -> HubResult<String> {
        let request: RegisterClientRequest = envelope.payload_as()?;

        // A browser cannot author a page, so an unknown name never creates one
        let page = self
            .host
            .registry
            .get(&request.page_name)
            .await
            .ok_or_else(|| HubError::PageNotFound {
                page_name: request.page_name.clone(),
            })?;

        if conn.role() == ClientRole::WebClient && conn.session_count().await > 0 {
            return Err(HubError::AlreadyRegistered);
        }
        conn.claim_role(ClientRole::WebClient)?;

        let session = if page.is_app() {
            page.create_session().await
        } else {
            page.zero_session().await
        };

        if !session.join(conn).await {
            if page.is_app() {
                page.remove_session(session.id()).await;
            }
            return Err(HubError::QueueClosed);
        }

        if page.is_app() {
            self.host.event_bus.publish(HubEvent::SessionCreated {
                page_name: page.name().to_string(),
                session_id: session.id().to_string(),
            });
            self.assign_host(&page, &session).await;
        }

        tracing::debug!(
            connection_id = %conn.id(),
            page_name = %page.name(),
            session_id = %session.id(),
            "Web client registered"
        );
        self.host.event_bus.publish(HubEvent::ClientRegistered {
            connection_id: conn.id().to_string(),
            role: ClientRole::WebClient,
            page_name: page.name().to_string(),
            session_id: Some(session.id().to_string()),
        });

        Ok(session.id().to_string())
    }

    async fn register_host_client(
        &self,
        conn: &Arc<Connection>,
        envelope: &Envelope,
    ) -> HubResult<String> {
        let request: RegisterClientRequest = envelope.payload_as()?;
        conn.claim_role(ClientRole::HostClient)?;

        let (page, created) = self
            .host
            .registry
            .get_or_create(&request.page_name, request.is_app)
            .await;

        if created {
            self.host.event_bus.publish(HubEvent::PageCreated {
                page_name: page.name().to_string(),
                is_app: page.is_app(),
            });
        } else if page.is_app() != request.is_app {
            return Err(HubError::PageModeConflict {
                page_name: page.name().to_string(),
                is_app: page.is_app(),
            });
        }

        let session_id = if page.is_app() {
            if !page.join_host(conn).await {
                return Err(HubError::QueueClosed);
            }
            None
        } else {
            let session = page.zero_session().await;
            if !session.join(conn).await {
                return Err(HubError::QueueClosed);
            }
            Some(session.id().to_string())
        };

        tracing::debug!(
            connection_id = %conn.id(),
            page_name = %page.name(),
            is_app = page.is_app(),
            "Host client registered"
        );
        self.host.event_bus.publish(HubEvent::ClientRegistered {
            connection_id: conn.id().to_string(),
            role: ClientRole::HostClient,
            page_name: page.name().to_string(),
            session_id: session_id.clone(),
        });

        Ok(session_id.unwrap_or_default())
    }

    /// Hand an app session to the next host of the page's pool
    ///
    /// Hosts already on their way out refuse to join and are skipped. An
    /// empty pool leaves the session without a host.
    async fn assign_host(&self, page: &Page, session: &Arc<Session>) {
        let attempts = page.host_count().await;

        for _ in 0..attempts {
            let Some(host) = page.pick_host().await else {
                break;
            };
            if !session.join(&host).await {
                continue;
            }

            let push = SessionPush {
                page_name: page.name().to_string(),
                session_id: session.id().to_string(),
            };
            match encode_push(actions::SESSION_CREATED, &push) {
                Ok(frame) => {
                    fanout::deliver(&host, frame, actions::SESSION_CREATED);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize sessionCreated");
                }
            }

            tracing::debug!(
                connection_id = %host.id(),
                page_name = %page.name(),
                session_id = %session.id(),
                "Session assigned to host"
            );
            return;
        }

        tracing::debug!(
            page_name = %page.name(),
            session_id = %session.id(),
            "No host available for new session"
        );
    }

    // ── Commands and events ─────────────────────────────────────────────

    async fn page_command(&self, conn: &Arc<Connection>, envelope: &Envelope) -> HubResult<String> {
        let request: PageCommandRequest = envelope.payload_as()?;

        if conn.role() != ClientRole::HostClient {
            return Err(HubError::NotRegistered {
                required: ClientRole::HostClient,
            });
        }

        let not_found = || HubError::PageNotFound {
            page_name: request.page_name.clone(),
        };
        let page = self
            .host
            .registry
            .get(&request.page_name)
            .await
            .ok_or_else(not_found)?;
        if !conn.is_member_of_page(page.name()).await {
            return Err(not_found());
        }

        let session = self.command_session(&page, &request.session_id).await?;
        let outcome = self.host.commands.execute(&page, &request.command).await?;

        if outcome.is_mutation() {
            let push = PageUpdatePush {
                page_name: page.name().to_string(),
                session_id: session.id().to_string(),
                controls: outcome.changes,
                removed: outcome.removed,
            };
            let frame = encode_push(actions::PAGE_UPDATE_TO_WEB, &push)?;
            let audience = session.web_clients().await;
            let delivered = fanout::broadcast(&audience, &frame, actions::PAGE_UPDATE_TO_WEB);

            tracing::debug!(
                page_name = %page.name(),
                session_id = %session.id(),
                delivered,
                "Page update broadcast"
            );
        }

        Ok(outcome.result)
    }

    /// The session whose web clients see the effect of a command
    async fn command_session(&self, page: &Page, session_id: &str) -> HubResult<Arc<Session>> {
        let not_found = || HubError::SessionNotFound {
            page_name: page.name().to_string(),
            session_id: session_id.to_string(),
        };

        if page.is_app() {
            return page.get_session(session_id).await.ok_or_else(not_found);
        }
        if session_id.is_empty() || session_id == ZERO_SESSION_ID {
            return Ok(page.zero_session().await);
        }
        Err(not_found())
    }

    async fn page_event(&self, conn: &Arc<Connection>, envelope: &Envelope) -> HubResult<()> {
        let event: PageEventRequest = envelope.payload_as()?;

        let not_registered = || HubError::NotRegistered {
            required: ClientRole::WebClient,
        };
        if conn.role() != ClientRole::WebClient {
            return Err(not_registered());
        }
        let session = conn.web_session().await.ok_or_else(not_registered)?;

        let push = PageEventPush::new(session.page_name(), session.id(), event);
        let frame = encode_push(actions::PAGE_EVENT_TO_HOST, &push)?;
        let hosts = session.host_clients().await;
        let delivered = fanout::broadcast(&hosts, &frame, actions::PAGE_EVENT_TO_HOST);

        tracing::debug!(
            connection_id = %conn.id(),
            page_name = %session.page_name(),
            session_id = %session.id(),
            delivered,
            "Web event forwarded"
        );
        Ok(())
    }

    // ── Teardown ────────────────────────────────────────────────────────

    /// Remove a connection from every membership set and close its queue
    ///
    /// An app session left without viewers is closed; one left without a
    /// host goes to the next host of the pool. Safe to call for a connection
    /// that never registered, and more than once.
    pub async fn disconnect(&self, conn: &Arc<Connection>) {
        let memberships = conn.take_memberships().await;

        for page in &memberships.pages {
            page.unregister_host(conn.id()).await;
        }

        for session in &memberships.sessions {
            session.unregister_client(conn.id()).await;

            if session.is_zero() {
                continue;
            }
            match conn.role() {
                ClientRole::WebClient if !session.has_web_clients().await => {
                    self.close_session(session).await;
                }
                ClientRole::HostClient
                    if session.host_clients().await.is_empty()
                        && session.has_web_clients().await =>
                {
                    self.reassign_session(session).await;
                }
                _ => {}
            }
        }

        conn.close();

        if self.connections.write().await.remove(conn.id()).is_some() {
            tracing::debug!(connection_id = %conn.id(), "WebSocket client disconnected");
            self.host.event_bus.publish(HubEvent::ClientDisconnected {
                connection_id: conn.id().to_string(),
            });
        }
    }

    /// Hand an app session that lost its host to another host of the pool
    async fn reassign_session(&self, session: &Arc<Session>) {
        let Some(page) = self.host.registry.get(session.page_name()).await else {
            return;
        };
        if page.get_session(session.id()).await.is_none() {
            return;
        }
        self.assign_host(&page, session).await;
    }

    /// Evict an app session that lost its last viewer
    async fn close_session(&self, session: &Arc<Session>) {
        let Some(page) = self.host.registry.get(session.page_name()).await else {
            return;
        };
        if page.remove_session(session.id()).await.is_none() {
            return;
        }

        let hosts = session.host_clients().await;
        for host in &hosts {
            session.leave(host).await;
        }

        let push = SessionPush {
            page_name: page.name().to_string(),
            session_id: session.id().to_string(),
        };
        match encode_push(actions::SESSION_CLOSED, &push) {
            Ok(frame) => {
                fanout::broadcast(&hosts, &frame, actions::SESSION_CLOSED);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize sessionClosed");
            }
        }

        tracing::debug!(
            page_name = %page.name(),
            session_id = %session.id(),
            "Session closed"
        );
        self.host.event_bus.publish(HubEvent::SessionClosed {
            page_name: page.name().to_string(),
            session_id: session.id().to_string(),
        });
    }
}

fn log_failure<T>(conn: &Connection, envelope: &Envelope, result: &HubResult<T>) {
    if let Err(e) = result {
        tracing::debug!(
            connection_id = %conn.id(),
            action = %envelope.action,
            error_code = e.error_code(),
            error = %e,
            "Request failed"
        );
    }
}
