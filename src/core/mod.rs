//! Core module containing the hub's data model and routing state

pub mod command;
pub mod connection;
pub mod control;
pub mod error;
pub mod events;
pub mod page;
pub mod queue;
pub mod registry;
pub mod session;

pub use command::{CommandOutcome, CommandProcessor, TextCommandProcessor};
pub use connection::{ClientRole, Connection, SessionKey};
pub use control::{Control, ControlTable, ROOT_CONTROL_ID};
pub use error::{HubError, HubResult};
pub use events::{EventBus, EventEnvelope, HubEvent};
pub use page::Page;
pub use queue::{PushOutcome, SendQueue};
pub use registry::PageRegistry;
pub use session::{Session, ZERO_SESSION_ID};
