//! Sessions: the routing scope around one instance of a page's content
//!
//! A session holds the connections currently subscribed to it: zero or more
//! web clients and zero or more host clients. The session's membership table
//! is the source of truth for routing; a connection's own session set is kept
//! in step by [`Session::join`] and by teardown.

use crate::core::connection::{ClientRole, Connection, SessionKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Well-known ID of the single session of a shared page
pub const ZERO_SESSION_ID: &str = "0";

/// A set of connections interested in one instance of a page
pub struct Session {
    id: String,
    page_name: String,
    clients: RwLock<HashMap<String, Arc<Connection>>>,
}

impl Session {
    pub fn new(page_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            page_name: page_name.into(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// The zero session of a shared page
    pub fn zero(page_name: impl Into<String>) -> Self {
        Self::new(page_name, ZERO_SESSION_ID)
    }

    /// A session with a freshly minted random ID
    pub fn generate(page_name: impl Into<String>) -> Self {
        Self::new(page_name, Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn page_name(&self) -> &str {
        &self.page_name
    }

    pub fn is_zero(&self) -> bool {
        self.id == ZERO_SESSION_ID
    }

    pub fn key(&self) -> SessionKey {
        (self.page_name.clone(), self.id.clone())
    }

    /// Subscribe a connection, recording the membership on both sides
    ///
    /// Returns `false` when the connection is already being torn down; the
    /// session is left unchanged in that case.
    pub async fn join(self: &Arc<Self>, conn: &Arc<Connection>) -> bool {
        self.register_client(conn.clone()).await;
        if conn.add_session(self.clone()).await {
            return true;
        }
        self.unregister_client(conn.id()).await;
        false
    }

    /// Unsubscribe a connection on both sides
    pub async fn leave(&self, conn: &Connection) -> bool {
        let removed = self.unregister_client(conn.id()).await;
        conn.remove_session(&self.key()).await;
        removed
    }

    pub(crate) async fn register_client(&self, conn: Arc<Connection>) {
        self.clients
            .write()
            .await
            .insert(conn.id().to_string(), conn);
    }

    pub(crate) async fn unregister_client(&self, connection_id: &str) -> bool {
        self.clients.write().await.remove(connection_id).is_some()
    }

    /// Snapshot of the members with the given role
    pub async fn clients_with_role(&self, role: ClientRole) -> Vec<Arc<Connection>> {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.role() == role)
            .cloned()
            .collect()
    }

    pub async fn host_clients(&self) -> Vec<Arc<Connection>> {
        self.clients_with_role(ClientRole::HostClient).await
    }

    pub async fn web_clients(&self) -> Vec<Arc<Connection>> {
        self.clients_with_role(ClientRole::WebClient).await
    }

    pub async fn contains(&self, connection_id: &str) -> bool {
        self.clients.read().await.contains_key(connection_id)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn has_web_clients(&self) -> bool {
        self.clients
            .read()
            .await
            .values()
            .any(|c| c.role() == ClientRole::WebClient)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("page_name", &self.page_name)
            .finish_non_exhaustive()
    }
}
