//! Event types for the FBK event system
//!
//! Provides shared event definitions and the EventBus used both by
//! in-process backends (to publish change notices) and by a dashboard
//! session (to announce resyncs and finished submissions).

mod change_types;

pub use change_types::{ChangeKind, ResyncTrigger, SubmissionResolution};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::RecordId;

/// FBK event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedbackEvent {
    /// The backend record collection changed
    ///
    /// Carries no record payload: receivers resync the whole collection.
    RecordChanged {
        /// Kind of change reported by the backend
        kind: ChangeKind,
        /// When the change was observed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A full resync replaced the ordered view
    SnapshotReplaced {
        /// Records in the view after replacement
        record_count: usize,
        /// What caused the resync
        trigger: ResyncTrigger,
        /// When the snapshot was applied
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A submission ran to completion
    SubmissionFinished {
        /// Identity assigned by the backend (None when the insert failed)
        record_id: Option<RecordId>,
        /// How the submission resolved
        resolution: SubmissionResolution,
        /// When the submission finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The change feed was re-established after a disconnect
    ChangeFeedReconnected {
        /// Subscription attempts it took to reconnect
        attempts: u32,
        /// When the feed came back
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl FeedbackEvent {
    /// Get event type as string (for SSE event field)
    pub fn event_type(&self) -> &str {
        match self {
            FeedbackEvent::RecordChanged { .. } => "RecordChanged",
            FeedbackEvent::SnapshotReplaced { .. } => "SnapshotReplaced",
            FeedbackEvent::SubmissionFinished { .. } => "SubmissionFinished",
            FeedbackEvent::ChangeFeedReconnected { .. } => "ChangeFeedReconnected",
        }
    }

    /// Backend change notice with the current timestamp
    pub fn record_changed(kind: ChangeKind) -> Self {
        FeedbackEvent::RecordChanged {
            kind,
            timestamp: crate::time::now(),
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use fbk_common::events::{ChangeKind, EventBus, FeedbackEvent};
/// use std::sync::Arc;
///
/// let event_bus = Arc::new(EventBus::new(100));
///
/// // Subscribe to events
/// let mut rx = event_bus.subscribe();
///
/// // Emit an event
/// event_bus.emit(FeedbackEvent::record_changed(ChangeKind::Update)).ok();
///
/// let received = rx.try_recv().expect("event should be buffered");
/// assert_eq!(received.event_type(), "RecordChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FeedbackEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before the oldest are
    ///   dropped for lagging subscribers
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FeedbackEvent,
    ) -> Result<usize, broadcast::error::SendError<FeedbackEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: FeedbackEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
