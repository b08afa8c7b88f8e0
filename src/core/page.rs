//! Pages: named, addressable documents
//!
//! A page owns three independently locked tables:
//!
//! - the control table (ID allocator + controls),
//! - the session set,
//! - the host pool (app pages only): hosts that serve any future session.
//!
//! No method holds more than one of these locks at a time.

use crate::core::connection::Connection;
use crate::core::control::{Control, ControlTable};
use crate::core::error::HubResult;
use crate::core::session::{Session, ZERO_SESSION_ID};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// A named document served to web clients
pub struct Page {
    name: String,
    is_app: bool,
    controls: RwLock<ControlTable>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// Host pool in join order, used round-robin for new app sessions
    hosts: RwLock<IndexMap<String, Arc<Connection>>>,
    next_host: AtomicUsize,
}

impl Page {
    /// Create a page; shared pages start with their zero session
    pub fn new(name: impl Into<String>, is_app: bool) -> Self {
        let name = name.into();

        let mut sessions = HashMap::new();
        if !is_app {
            sessions.insert(
                ZERO_SESSION_ID.to_string(),
                Arc::new(Session::zero(name.clone())),
            );
        }

        Self {
            name,
            is_app,
            controls: RwLock::new(ControlTable::new()),
            sessions: RwLock::new(sessions),
            hosts: RwLock::new(IndexMap::new()),
            next_host: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_app(&self) -> bool {
        self.is_app
    }

    // ── Sessions ────────────────────────────────────────────────────────

    /// The zero session, creating it if it does not exist yet
    pub async fn zero_session(&self) -> Arc<Session> {
        self.sessions
            .write()
            .await
            .entry(ZERO_SESSION_ID.to_string())
            .or_insert_with(|| Arc::new(Session::zero(self.name.clone())))
            .clone()
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Mint a new session with a random ID
    pub async fn create_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::generate(self.name.clone()));
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), session.clone());
        session
    }

    pub async fn remove_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    // ── Host pool ───────────────────────────────────────────────────────

    /// Add a host to the pool, recording the membership on both sides
    pub async fn join_host(self: &Arc<Self>, conn: &Arc<Connection>) -> bool {
        self.hosts
            .write()
            .await
            .insert(conn.id().to_string(), conn.clone());
        if conn.add_page(self.clone()).await {
            return true;
        }
        self.unregister_host(conn.id()).await;
        false
    }

    pub(crate) async fn unregister_host(&self, connection_id: &str) -> bool {
        self.hosts
            .write()
            .await
            .shift_remove(connection_id)
            .is_some()
    }

    /// Next host of the pool in round-robin order
    pub async fn pick_host(&self) -> Option<Arc<Connection>> {
        let hosts = self.hosts.read().await;
        if hosts.is_empty() {
            return None;
        }
        let index = self.next_host.fetch_add(1, Ordering::Relaxed) % hosts.len();
        hosts.get_index(index).map(|(_, conn)| conn.clone())
    }

    pub async fn host_count(&self) -> usize {
        self.hosts.read().await.len()
    }

    // ── Controls ────────────────────────────────────────────────────────

    /// Allocate an ID and insert a control in one critical section
    pub async fn add_control(
        &self,
        control_type: &str,
        parent_id: &str,
        attrs: BTreeMap<String, String>,
    ) -> HubResult<Control> {
        self.controls
            .write()
            .await
            .insert(control_type, parent_id, attrs)
    }

    pub async fn set_control_attrs(
        &self,
        control_id: &str,
        attrs: BTreeMap<String, String>,
    ) -> HubResult<Control> {
        self.controls.write().await.set_attrs(control_id, attrs)
    }

    /// Remove a control subtree; returns removed IDs and the updated parent
    pub async fn remove_control(&self, control_id: &str) -> HubResult<(Vec<String>, Control)> {
        self.controls.write().await.remove(control_id)
    }

    pub async fn control(&self, control_id: &str) -> Option<Control> {
        self.controls.read().await.get(control_id).cloned()
    }

    pub async fn control_count(&self) -> usize {
        self.controls.read().await.len()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("name", &self.name)
            .field("is_app", &self.is_app)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::core::connection::ClientRole;

    fn host() -> Arc<Connection> {
        let conn = Arc::new(Connection::new(&TransportConfig::default()));
        conn.claim_role(ClientRole::HostClient).unwrap();
        conn
    }

    #[tokio::test]
    async fn test_shared_page_starts_with_zero_session() {
        let page = Page::new("home", false);

        assert_eq!(page.session_count().await, 1);
        assert!(page.get_session(ZERO_SESSION_ID).await.is_some());
        assert_eq!(page.control_count().await, 1);
    }

    #[tokio::test]
    async fn test_app_page_starts_without_sessions() {
        let page = Page::new("dash", true);
        assert_eq!(page.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_zero_session_is_reused() {
        let page = Page::new("home", false);

        let a = page.zero_session().await;
        let b = page.zero_session().await;

        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_create_and_remove_session() {
        let page = Page::new("dash", true);

        let s1 = page.create_session().await;
        let s2 = page.create_session().await;
        assert_ne!(s1.id(), s2.id());
        assert_eq!(s1.page_name(), "dash");
        assert_eq!(page.session_count().await, 2);

        assert!(page.remove_session(s1.id()).await.is_some());
        assert!(page.get_session(s1.id()).await.is_none());
        assert_eq!(page.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_pick_host_round_robin() {
        let page = Arc::new(Page::new("dash", true));
        let h1 = host();
        let h2 = host();
        page.join_host(&h1).await;
        page.join_host(&h2).await;

        let picks: Vec<String> = {
            let mut picks = Vec::new();
            for _ in 0..4 {
                picks.push(page.pick_host().await.unwrap().id().to_string());
            }
            picks
        };

        assert_eq!(picks[0], h1.id());
        assert_eq!(picks[1], h2.id());
        assert_eq!(picks[2], h1.id());
        assert_eq!(picks[3], h2.id());
    }

    #[tokio::test]
    async fn test_pick_host_empty_pool() {
        let page = Page::new("dash", true);
        assert!(page.pick_host().await.is_none());
    }

    #[tokio::test]
    async fn test_unregister_host() {
        let page = Arc::new(Page::new("dash", true));
        let h1 = host();
        page.join_host(&h1).await;

        assert!(page.unregister_host(h1.id()).await);
        assert!(!page.unregister_host(h1.id()).await);
        assert_eq!(page.host_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_control_inserts_get_unique_ids() {
        let page = Arc::new(Page::new("home", false));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let page = page.clone();
            handles.push(tokio::spawn(async move {
                page.add_control("text", "0", BTreeMap::new())
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 32);
        assert_eq!(page.control_count().await, 33);
        assert_eq!(page.control("0").await.unwrap().child_ids.len(), 32);
    }

    #[tokio::test]
    async fn test_add_control_unknown_parent() {
        let page = Page::new("home", false);

        let result = page.add_control("text", "99", BTreeMap::new()).await;

        assert!(result.is_err());
        assert_eq!(page.control_count().await, 1);
    }
}
