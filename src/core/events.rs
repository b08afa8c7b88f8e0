//! Hub lifecycle events
//!
//! The EventBus uses `tokio::sync::broadcast` to let observers follow what the
//! hub does (connections opening and closing, pages and sessions appearing)
//! without the routing path ever depending on them.
//!
//! # Architecture
//!
//! ```text
//! ConnectionManager ──┐
//!                     ├──▶ EventBus::publish() ──▶ broadcast channel ──▶ observers
//! PageRegistry ───────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let event_bus = EventBus::new(1024);
//! let mut rx = event_bus.subscribe();
//!
//! event_bus.publish(HubEvent::PageCreated {
//!     page_name: "home".to_string(),
//!     is_app: false,
//! });
//!
//! if let Ok(envelope) = rx.recv().await {
//!     println!("Received: {:?}", envelope.event);
//! }
//! ```

use crate::core::connection::ClientRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Something that happened inside the hub
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HubEvent {
    /// A socket was accepted and its pumps started
    ClientConnected { connection_id: String },
    /// A connection completed registration
    ClientRegistered {
        connection_id: String,
        role: ClientRole,
        page_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// A host published a page name for the first time
    PageCreated { page_name: String, is_app: bool },
    /// A session was created on a page
    SessionCreated {
        page_name: String,
        session_id: String,
    },
    /// An app session lost its last web client and was evicted
    SessionClosed {
        page_name: String,
        session_id: String,
    },
    /// A connection was torn down and removed from every membership set
    ClientDisconnected { connection_id: String },
}

impl HubEvent {
    /// Short name of the event, matching its serialized tag
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::ClientConnected { .. } => "client_connected",
            HubEvent::ClientRegistered { .. } => "client_registered",
            HubEvent::PageCreated { .. } => "page_created",
            HubEvent::SessionCreated { .. } => "session_created",
            HubEvent::SessionClosed { .. } => "session_closed",
            HubEvent::ClientDisconnected { .. } => "client_disconnected",
        }
    }

    /// The page this event relates to, if any
    pub fn page_name(&self) -> Option<&str> {
        match self {
            HubEvent::ClientRegistered { page_name, .. }
            | HubEvent::PageCreated { page_name, .. }
            | HubEvent::SessionCreated { page_name, .. }
            | HubEvent::SessionClosed { page_name, .. } => Some(page_name),
            HubEvent::ClientConnected { .. } | HubEvent::ClientDisconnected { .. } => None,
        }
    }
}

/// Envelope wrapping a hub event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: HubEvent,
}

impl EventEnvelope {
    pub fn new(event: HubEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broadcast-based event bus for the hub
///
/// Cheap to clone (the sender is reference counted) and safe to share across
/// tasks.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    ///
    /// Receivers that fall more than `capacity` events behind get a `Lagged`
    /// error on their next `recv()`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Never blocks and never fails. Returns the number of receivers that will
    /// see the event.
    pub fn publish(&self, event: HubEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        // send() returns Err only if there are no receivers, which is fine
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tag() {
        let event = HubEvent::SessionCreated {
            page_name: "dash".to_string(),
            session_id: "abc".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "session_created");
        assert_eq!(json["page_name"], "dash");
        assert_eq!(event.name(), "session_created");
    }

    #[test]
    fn test_registered_event_omits_missing_session() {
        let event = HubEvent::ClientRegistered {
            connection_id: "c1".to_string(),
            role: ClientRole::HostClient,
            page_name: "dash".to_string(),
            session_id: None,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["role"], "host_client");
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_page_name_accessor() {
        let connected = HubEvent::ClientConnected {
            connection_id: "c1".to_string(),
        };
        let created = HubEvent::PageCreated {
            page_name: "home".to_string(),
            is_app: false,
        };

        assert_eq!(connected.page_name(), None);
        assert_eq!(created.page_name(), Some("home"));
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let receivers = bus.publish(HubEvent::ClientConnected {
            connection_id: "c1".to_string(),
        });
        assert_eq!(receivers, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.name(), "client_connected");
        assert!(!received.id.is_nil());
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.receiver_count(), 2);

        bus.publish(HubEvent::ClientDisconnected {
            connection_id: "c1".to_string(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.id, e2.id);
    }

    #[test]
    fn test_event_bus_publish_without_subscribers() {
        let bus = EventBus::default();

        let receivers = bus.publish(HubEvent::PageCreated {
            page_name: "home".to_string(),
            is_app: false,
        });
        assert_eq!(receivers, 0);
    }
}
