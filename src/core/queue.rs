//! Bounded outbound queue of a connection
//!
//! Many producers (any router handler that wants to reach this connection)
//! push serialized frames; a single consumer (the connection's write worker)
//! drains them. Pushing never waits: when the queue is full the configured
//! [`OverflowPolicy`] decides what gives.
//!
//! ```text
//! handler ──push()──┐
//! handler ──push()──┼──▶ [ f1 f2 f3 ... ] ──next_batch()──▶ write worker ──▶ socket
//! handler ──push()──┘
//! ```

use crate::config::OverflowPolicy;
use crate::core::error::{HubError, HubResult};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// What happened to a frame handed to [`SendQueue::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued without loss
    Queued,
    /// Queued after evicting the oldest frame
    DroppedOldest,
    /// Not queued; the queue was full
    DroppedNewest,
}

struct QueueState {
    frames: VecDeque<String>,
    closed: bool,
}

/// Bounded FIFO of serialized frames with a non-blocking producer side
pub struct SendQueue {
    capacity: usize,
    policy: OverflowPolicy,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl SendQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            policy,
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity.max(1)),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The critical sections below cannot leave the state half-updated
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a frame without waiting
    ///
    /// Under [`OverflowPolicy::Disconnect`] a full queue is closed and
    /// `QueueOverflow` is returned; the write worker then drains what is left
    /// and stops.
    pub fn push(&self, frame: String) -> HubResult<PushOutcome> {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return Err(HubError::QueueClosed);
            }

            if state.frames.len() < self.capacity {
                state.frames.push_back(frame);
                PushOutcome::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        state.frames.pop_front();
                        state.frames.push_back(frame);
                        PushOutcome::DroppedOldest
                    }
                    OverflowPolicy::DropNewest => PushOutcome::DroppedNewest,
                    OverflowPolicy::Disconnect => {
                        state.closed = true;
                        drop(state);
                        self.notify.notify_one();
                        return Err(HubError::QueueOverflow);
                    }
                }
            }
        };

        if outcome != PushOutcome::DroppedNewest {
            self.notify.notify_one();
        }
        Ok(outcome)
    }

    /// Wait for frames and take everything queued at that moment
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn next_batch(&self) -> Option<Vec<String>> {
        loop {
            // Register interest before checking, so a push between the check
            // and the await is not missed.
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if !state.frames.is_empty() {
                    return Some(state.frames.drain(..).collect());
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stop accepting frames and wake the consumer. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn frames(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_batch_takes_everything_in_order() {
        let queue = SendQueue::new(8, OverflowPolicy::Disconnect);
        queue.push("a".to_string()).unwrap();
        queue.push("b".to_string()).unwrap();
        queue.push("c".to_string()).unwrap();

        assert_eq!(queue.next_batch().await, Some(frames(&["a", "b", "c"])));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest_frames() {
        let queue = SendQueue::new(2, OverflowPolicy::DropOldest);
        queue.push("a".to_string()).unwrap();
        queue.push("b".to_string()).unwrap();

        let outcome = queue.push("c".to_string()).unwrap();

        assert_eq!(outcome, PushOutcome::DroppedOldest);
        assert_eq!(queue.next_batch().await, Some(frames(&["b", "c"])));
    }

    #[tokio::test]
    async fn test_drop_newest_discards_incoming_frame() {
        let queue = SendQueue::new(2, OverflowPolicy::DropNewest);
        queue.push("a".to_string()).unwrap();
        queue.push("b".to_string()).unwrap();

        let outcome = queue.push("c".to_string()).unwrap();

        assert_eq!(outcome, PushOutcome::DroppedNewest);
        assert_eq!(queue.next_batch().await, Some(frames(&["a", "b"])));
    }

    #[tokio::test]
    async fn test_disconnect_policy_closes_queue() {
        let queue = SendQueue::new(1, OverflowPolicy::Disconnect);
        queue.push("a".to_string()).unwrap();

        let err = queue.push("b".to_string()).unwrap_err();
        assert!(matches!(err, HubError::QueueOverflow));
        assert!(queue.is_closed());

        // What was already queued is still drained, then the consumer stops
        assert_eq!(queue.next_batch().await, Some(frames(&["a"])));
        assert_eq!(queue.next_batch().await, None);
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let queue = SendQueue::new(4, OverflowPolicy::DropOldest);
        queue.close();
        queue.close();

        assert!(matches!(
            queue.push("a".to_string()),
            Err(HubError::QueueClosed)
        ));
        assert_eq!(queue.next_batch().await, None);
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_push() {
        let queue = Arc::new(SendQueue::new(4, OverflowPolicy::Disconnect));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next_batch().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push("hello".to_string()).unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should wake up")
            .unwrap();
        assert_eq!(batch, Some(frames(&["hello"])));
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_close() {
        let queue = Arc::new(SendQueue::new(4, OverflowPolicy::Disconnect));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next_batch().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let batch = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should wake up")
            .unwrap();
        assert_eq!(batch, None);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = SendQueue::new(0, OverflowPolicy::DropNewest);
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.push("a".to_string()).unwrap(), PushOutcome::Queued);
    }
}
