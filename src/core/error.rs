//! Typed error handling for the hub
//!
//! Errors fall into three groups that the connection pumps treat differently:
//!
//! - **Application errors** (page not found, parent control missing, command
//!   rejected, ...) are serialized into the `error` field of the correlated
//!   response. The connection stays open.
//! - **Protocol errors** (an inbound frame that is not a valid envelope) and
//!   **transport errors** (socket failure, deadline expiry) are fatal: the
//!   owning connection is torn down.
//! - **Queue errors** come from a connection's outbound queue refusing a frame.
//!   They never propagate into the handler that produced the frame.
//!
//! A routing miss (no audience member connected) is not an error at all.

use crate::core::connection::ClientRole;
use thiserror::Error;

/// Convenience alias used throughout the hub
pub type HubResult<T> = Result<T, HubError>;

/// The main error type for the hub
#[derive(Debug, Error)]
pub enum HubError {
    /// The page does not exist, or the caller is not allowed to touch it
    #[error("Page not found or access denied")]
    PageNotFound { page_name: String },

    /// A host tried to register an existing page with a different mode
    #[error("page '{page_name}' is already registered as {} page", mode_name(.is_app))]
    PageModeConflict { page_name: String, is_app: bool },

    #[error("session '{session_id}' not found on page '{page_name}'")]
    SessionNotFound {
        page_name: String,
        session_id: String,
    },

    #[error("parent control with id '{parent_id}' not found")]
    ParentNotFound { parent_id: String },

    #[error("control with id '{control_id}' not found")]
    ControlNotFound { control_id: String },

    /// The command string could not be applied
    #[error("command rejected: {message}")]
    CommandRejected { message: String },

    #[error("connection is registered as {current}, cannot register as {requested}")]
    RoleConflict {
        current: ClientRole,
        requested: ClientRole,
    },

    #[error("web client is already registered")]
    AlreadyRegistered,

    /// The action requires the connection to have registered with a given role
    #[error("action requires a registered {required}")]
    NotRegistered { required: ClientRole },

    /// The envelope was fine but its payload did not match the action
    #[error("invalid payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    /// The inbound frame is not a valid envelope
    #[error("malformed message: {0}")]
    Protocol(#[source] serde_json::Error),

    #[error("send queue is closed")]
    QueueClosed,

    #[error("send queue overflow")]
    QueueOverflow,

    #[error("transport error: {0}")]
    Transport(String),
}

fn mode_name(is_app: &bool) -> &'static str {
    if *is_app { "an app" } else { "a shared" }
}

impl HubError {
    /// Whether this error must terminate the owning connection
    pub fn is_fatal(&self) -> bool {
        matches!(self, HubError::Protocol(_) | HubError::Transport(_))
    }

    /// Stable code for structured logs
    pub fn error_code(&self) -> &'static str {
        match self {
            HubError::PageNotFound { .. } => "PAGE_NOT_FOUND",
            HubError::PageModeConflict { .. } => "PAGE_MODE_CONFLICT",
            HubError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            HubError::ParentNotFound { .. } => "PARENT_NOT_FOUND",
            HubError::ControlNotFound { .. } => "CONTROL_NOT_FOUND",
            HubError::CommandRejected { .. } => "COMMAND_REJECTED",
            HubError::RoleConflict { .. } => "ROLE_CONFLICT",
            HubError::AlreadyRegistered => "ALREADY_REGISTERED",
            HubError::NotRegistered { .. } => "NOT_REGISTERED",
            HubError::InvalidPayload(_) => "INVALID_PAYLOAD",
            HubError::Protocol(_) => "PROTOCOL_ERROR",
            HubError::QueueClosed => "QUEUE_CLOSED",
            HubError::QueueOverflow => "QUEUE_OVERFLOW",
            HubError::Transport(_) => "TRANSPORT_ERROR",
        }
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        HubError::CommandRejected {
            message: message.into(),
        }
    }
}

impl From<axum::Error> for HubError {
    fn from(err: axum::Error) -> Self {
        HubError::Transport(err.to_string())
    }
}
