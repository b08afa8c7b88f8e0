//! Delivery of outbound frames to an audience snapshot
//!
//! Callers snapshot the audience from a session or page (releasing that
//! membership lock) and then hand the encoded frame to each connection's
//! queue. Delivery is at-most-once and never waits on a slow peer; a member
//! that left mid-broadcast just misses the frame.

use crate::core::connection::Connection;
use crate::core::error::HubError;
use crate::core::queue::PushOutcome;
use std::sync::Arc;

/// Queue one frame on one connection, logging anything other than success
///
/// Returns whether the frame was queued.
pub(crate) fn deliver(conn: &Connection, frame: String, action: &str) -> bool {
    match conn.send(frame) {
        Ok(PushOutcome::Queued) => true,
        Ok(PushOutcome::DroppedOldest) => {
            tracing::warn!(
                connection_id = %conn.id(),
                action = %action,
                "Send queue full, dropped oldest frame"
            );
            true
        }
        Ok(PushOutcome::DroppedNewest) => {
            tracing::warn!(
                connection_id = %conn.id(),
                action = %action,
                "Send queue full, dropped frame"
            );
            false
        }
        Err(HubError::QueueOverflow) => {
            tracing::warn!(
                connection_id = %conn.id(),
                action = %action,
                "Send queue full, disconnecting slow client"
            );
            false
        }
        Err(e) => {
            tracing::debug!(
                connection_id = %conn.id(),
                action = %action,
                error = %e,
                "Frame not delivered (likely disconnected)"
            );
            false
        }
    }
}

/// Queue the same frame on every member of the audience
///
/// Returns how many connections accepted it.
pub(crate) fn broadcast(audience: &[Arc<Connection>], frame: &str, action: &str) -> usize {
    audience
        .iter()
        .filter(|conn| deliver(conn, frame.to_string(), action))
        .count()
}
