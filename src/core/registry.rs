//! Process-wide registry of pages
//!
//! The only place a page name is resolved to a [`Page`]. Pages are created by
//! host registration and live for the rest of the process.

use crate::core::page::Page;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name → page map shared by every connection
#[derive(Default)]
pub struct PageRegistry {
    pages: RwLock<HashMap<String, Arc<Page>>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a page by name; never creates
    pub async fn get(&self, name: &str) -> Option<Arc<Page>> {
        self.pages.read().await.get(name).cloned()
    }

    /// Resolve a page, creating it with `is_app` if the name is unseen
    ///
    /// Lookup and insertion happen under one write lock, so concurrent callers
    /// always agree on a single page (first writer wins). The flag is only
    /// used on creation; callers compare it with [`Page::is_app`] themselves.
    /// Returns the page and whether this call created it.
    pub async fn get_or_create(&self, name: &str, is_app: bool) -> (Arc<Page>, bool) {
        let mut pages = self.pages.write().await;
        match pages.entry(name.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let page = Arc::new(Page::new(name, is_app));
                entry.insert(page.clone());
                tracing::debug!(page_name = %name, is_app, "Page created");
                (page, true)
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.pages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pages.read().await.is_empty()
    }

    /// Names of all registered pages, sorted
    pub async fn page_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pages.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
