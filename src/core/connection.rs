//! A single accepted WebSocket peer as seen by the registries
//!
//! The `Connection` owns no socket: the socket halves live in the connection's
//! read and write workers. What lives here is what the rest of the hub needs
//! to address the peer: its identity, its role, the sessions and pages it has
//! joined, and its bounded outbound queue.

use crate::config::TransportConfig;
use crate::core::error::{HubError, HubResult};
use crate::core::page::Page;
use crate::core::queue::{PushOutcome, SendQueue};
use crate::core::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Role a connection registers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    Unassigned,
    /// A browser viewing a page
    WebClient,
    /// An application process authoring a page
    HostClient,
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientRole::Unassigned => write!(f, "unassigned client"),
            ClientRole::WebClient => write!(f, "web client"),
            ClientRole::HostClient => write!(f, "host client"),
        }
    }
}

/// Key of a session membership. Zero sessions share the same ID across pages.
pub type SessionKey = (String, String);

/// Memberships released by [`Connection::take_memberships`]
#[derive(Default)]
pub struct Memberships {
    pub sessions: Vec<Arc<Session>>,
    pub pages: Vec<Arc<Page>>,
}

/// Addressable state of one connected peer
pub struct Connection {
    id: String,
    role: OnceLock<ClientRole>,
    connected_at: DateTime<Utc>,
    sessions: RwLock<HashMap<SessionKey, Arc<Session>>>,
    pages: RwLock<HashMap<String, Arc<Page>>>,
    queue: SendQueue,
    torn_down: AtomicBool,
}

impl Connection {
    pub fn new(transport: &TransportConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: OnceLock::new(),
            connected_at: Utc::now(),
            sessions: RwLock::new(HashMap::new()),
            pages: RwLock::new(HashMap::new()),
            queue: SendQueue::new(transport.send_queue_capacity, transport.overflow_policy),
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> ClientRole {
        self.role.get().copied().unwrap_or(ClientRole::Unassigned)
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Assign the role on first registration
    ///
    /// Claiming the role the connection already has succeeds; any other role
    /// is a `RoleConflict`.
    pub fn claim_role(&self, requested: ClientRole) -> HubResult<()> {
        let current = *self.role.get_or_init(|| requested);
        if current == requested {
            Ok(())
        } else {
            Err(HubError::RoleConflict { current, requested })
        }
    }

    /// Record a session membership on this side only
    ///
    /// Refused once teardown has started; the caller must then undo its side.
    pub(crate) async fn add_session(&self, session: Arc<Session>) -> bool {
        let mut sessions = self.sessions.write().await;
        if self.is_torn_down() {
            return false;
        }
        sessions.insert(session.key(), session);
        true
    }

    /// Drop a session membership on this side only
    pub(crate) async fn remove_session(&self, key: &SessionKey) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }

    pub(crate) async fn add_page(&self, page: Arc<Page>) -> bool {
        let mut pages = self.pages.write().await;
        if self.is_torn_down() {
            return false;
        }
        pages.insert(page.name().to_string(), page);
        true
    }

    /// Sessions this connection currently belongs to
    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// The single session of a web client, if it joined one
    pub async fn web_session(&self) -> Option<Arc<Session>> {
        self.sessions.read().await.values().next().cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether this connection joined the page's host pool or any of its sessions
    pub async fn is_member_of_page(&self, page_name: &str) -> bool {
        if self.pages.read().await.contains_key(page_name) {
            return true;
        }
        self.sessions
            .read()
            .await
            .keys()
            .any(|(name, _)| name == page_name)
    }

    /// Empty both membership sets, returning what was in them
    ///
    /// Only the first call returns anything, so teardown can run more than
    /// once without double-unregistering.
    pub(crate) async fn take_memberships(&self) -> Memberships {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Memberships::default();
        }

        let sessions = std::mem::take(&mut *self.sessions.write().await);
        let pages = std::mem::take(&mut *self.pages.write().await);

        Memberships {
            sessions: sessions.into_values().collect(),
            pages: pages.into_values().collect(),
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Hand a frame to the write worker without waiting
    pub fn send(&self, frame: String) -> HubResult<PushOutcome> {
        self.queue.push(frame)
    }

    pub(crate) fn queue(&self) -> &SendQueue {
        &self.queue
    }

    /// Close the outbound queue; the write worker exits after draining it
    pub fn close(&self) {
        self.queue.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role())
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;

    fn transport() -> TransportConfig {
        TransportConfig::default()
    }

    #[test]
    fn test_new_connection_is_unassigned() {
        let conn = Connection::new(&transport());

        assert_eq!(conn.role(), ClientRole::Unassigned);
        assert!(Uuid::parse_str(conn.id()).is_ok());
        assert!(!conn.is_torn_down());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Connection::new(&transport());
        let b = Connection::new(&transport());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_role_is_set_once() {
        let conn = Connection::new(&transport());

        conn.claim_role(ClientRole::HostClient).unwrap();
        conn.claim_role(ClientRole::HostClient).unwrap();

        let err = conn.claim_role(ClientRole::WebClient).unwrap_err();
        assert!(matches!(
            err,
            HubError::RoleConflict {
                current: ClientRole::HostClient,
                requested: ClientRole::WebClient
            }
        ));
        assert_eq!(conn.role(), ClientRole::HostClient);
    }

    #[tokio::test]
    async fn test_send_goes_through_queue() {
        let transport = TransportConfig {
            send_queue_capacity: 1,
            overflow_policy: OverflowPolicy::DropNewest,
            ..TransportConfig::default()
        };
        let conn = Connection::new(&transport);

        assert_eq!(conn.send("a".to_string()).unwrap(), PushOutcome::Queued);
        assert_eq!(
            conn.send("b".to_string()).unwrap(),
            PushOutcome::DroppedNewest
        );
        assert_eq!(conn.queue().next_batch().await, Some(vec!["a".to_string()]));
    }

    #[tokio::test]
    async fn test_take_memberships_is_idempotent() {
        let conn = Connection::new(&transport());
        let page = Arc::new(Page::new("home", true));
        assert!(conn.add_page(page.clone()).await);

        let first = conn.take_memberships().await;
        let second = conn.take_memberships().await;

        assert_eq!(first.pages.len(), 1);
        assert!(second.pages.is_empty());
        assert!(conn.is_torn_down());
        assert!(!conn.add_page(page).await);
    }

    #[tokio::test]
    async fn test_take_memberships_without_registration() {
        let conn = Connection::new(&transport());
        let released = conn.take_memberships().await;

        assert!(released.sessions.is_empty());
        assert!(released.pages.is_empty());
    }
}
