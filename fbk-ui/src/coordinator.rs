//! Submission flow
//!
//! `submit` runs strictly in sequence:
//!
//! 1. Check a user is signed in and the draft fields are non-empty
//! 2. Insert the raw record in the `Pending` state
//! 3. Clear the draft
//! 4. Wait for enrichment
//!    - enriched: upsert the record into the view
//!    - window expired: full resync
//! 5. Report the outcome on the event bus
//!
//! A failed insert skips the wait. It is logged and reported as
//! [`SubmitOutcome::InsertFailed`], not as an error. Concurrent submissions
//! are not serialized; the in-flight count backs the busy flag the caller
//! uses to disable repeated submission.

use crate::remote::RemoteStore;
use crate::resync::Resync;
use crate::session::Session;
use crate::store::RecordStore;
use crate::waiter::EnrichmentWaiter;
use fbk_common::events::{EventBus, FeedbackEvent, ResyncTrigger, SubmissionResolution};
use fbk_common::{Error, NewRecord, Record, RecordId, Result};
use fbk_common::time::{self, duration_ms};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Form fields for a new record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    pub description: String,
}

impl Draft {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn clear(&mut self) {
        self.title.clear();
        self.description.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.description.is_empty()
    }
}

/// How a submission ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Enriched in time and merged into the view
    Enriched(Record),
    /// Not enriched in time; the view was resynced instead
    ResyncFallback { record_id: RecordId },
    /// The raw insert failed; nothing changed
    InsertFailed,
}

impl SubmitOutcome {
    pub fn resolution(&self) -> SubmissionResolution {
        match self {
            SubmitOutcome::Enriched(_) => SubmissionResolution::Enriched,
            SubmitOutcome::ResyncFallback { .. } => SubmissionResolution::ResyncFallback,
            SubmitOutcome::InsertFailed => SubmissionResolution::InsertFailed,
        }
    }

    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            SubmitOutcome::Enriched(record) => Some(record.id),
            SubmitOutcome::ResyncFallback { record_id } => Some(*record_id),
            SubmitOutcome::InsertFailed => None,
        }
    }
}

/// Decrements the in-flight count when a submission ends, however it ends
struct BusyGuard<'a> {
    in_flight: &'a watch::Sender<usize>,
}

impl<'a> BusyGuard<'a> {
    fn enter(in_flight: &'a watch::Sender<usize>) -> Self {
        in_flight.send_modify(|n| *n += 1);
        Self { in_flight }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Create → wait → merge-or-resync orchestration
pub struct SubmissionCoordinator {
    remote: Arc<dyn RemoteStore>,
    session: Arc<dyn Session>,
    waiter: EnrichmentWaiter,
    store: Arc<RecordStore>,
    resync: Resync,
    events: EventBus,
    in_flight: watch::Sender<usize>,
}

impl SubmissionCoordinator {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn Session>,
        waiter: EnrichmentWaiter,
        store: Arc<RecordStore>,
        resync: Resync,
        events: EventBus,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            remote,
            session,
            waiter,
            store,
            resync,
            events,
            in_flight,
        }
    }

    /// True while at least one submission is running
    pub fn is_busy(&self) -> bool {
        *self.in_flight.borrow() > 0
    }

    /// Receiver for the number of submissions in flight
    pub fn watch_busy(&self) -> watch::Receiver<usize> {
        self.in_flight.subscribe()
    }

    /// Submit the draft
    ///
    /// Errors only for a missing user or blank fields, in which case the
    /// draft is left as it was. Once the insert has been attempted the draft
    /// is cleared and the result is an outcome.
    pub async fn submit(&self, draft: &mut Draft) -> Result<SubmitOutcome> {
        let user = self
            .session
            .current_user()
            .ok_or_else(|| Error::Unauthenticated("sign in to submit feedback".to_string()))?;
        let new_record = NewRecord::pending(&draft.title, &draft.description, user)?;

        let _busy = BusyGuard::enter(&self.in_flight);
        let start = Instant::now();

        let inserted = self.remote.insert_record(&new_record).await;
        draft.clear();

        let outcome = match inserted {
            Err(e) => {
                warn!(user_id = %user, error = %e, "Insert failed, submission dropped");
                SubmitOutcome::InsertFailed
            }
            Ok(row) => {
                debug!(record_id = %row.id, "Inserted pending record");
                self.resolve(row.id).await
            }
        };

        info!(
            record_id = ?outcome.record_id(),
            resolution = %outcome.resolution(),
            elapsed_ms = duration_ms(start.elapsed()),
            "Submission finished"
        );
        self.events.emit_lossy(FeedbackEvent::SubmissionFinished {
            record_id: outcome.record_id(),
            resolution: outcome.resolution(),
            timestamp: time::now(),
        });
        Ok(outcome)
    }

    async fn resolve(&self, id: RecordId) -> SubmitOutcome {
        match self.waiter.await_enrichment(id).await {
            Some(record) => SubmitOutcome::Enriched(self.store.upsert_one(record)),
            None => {
                if let Err(e) = self.resync.run(ResyncTrigger::WaiterFallback).await {
                    warn!(record_id = %id, error = %e, "Fallback resync failed");
                }
                SubmitOutcome::ResyncFallback { record_id: id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemoteStore;
    use crate::resync::ResyncPolicy;
    use crate::session::StaticSession;
    use crate::waiter::WaitPolicy;
    use fbk_common::UserId;
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        remote: Arc<InMemoryRemoteStore>,
        store: Arc<RecordStore>,
        coordinator: SubmissionCoordinator,
    }

    fn fixture(session: StaticSession) -> Fixture {
        let remote = Arc::new(InMemoryRemoteStore::default());
        let store = Arc::new(RecordStore::new());
        let events = EventBus::new(16);
        let resync = Resync::new(
            remote.clone(),
            store.clone(),
            events.clone(),
            ResyncPolicy::default(),
        );
        let coordinator = SubmissionCoordinator::new(
            remote.clone(),
            Arc::new(session),
            EnrichmentWaiter::new(remote.clone(), WaitPolicy::default()),
            store.clone(),
            resync,
            events,
        );
        Fixture {
            remote,
            store,
            coordinator,
        }
    }

    fn signed_in() -> StaticSession {
        StaticSession::signed_in(UserId(Uuid::new_v4()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_signed_in_user() {
        let fx = fixture(StaticSession::anonymous());
        let mut draft = Draft::new("Title", "Body");

        let err = fx.coordinator.submit(&mut draft).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated(_)));
        assert_eq!(draft, Draft::new("Title", "Body"));
        assert!(fx.remote.pending_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_fields_are_rejected_without_insert() {
        let fx = fixture(signed_in());
        let mut draft = Draft::new("   ", "Body");

        let err = fx.coordinator.submit(&mut draft).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(draft.description, "Body");
        assert!(fx.remote.pending_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_failure_skips_waiter_and_clears_draft() {
        let fx = fixture(signed_in());
        fx.remote.fail_next_inserts(1);
        let mut draft = Draft::new("Title", "Body");

        let outcome = fx.coordinator.submit(&mut draft).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::InsertFailed);
        assert!(draft.is_empty());
        assert_eq!(fx.remote.fetch_record_calls(), 0);
        assert_eq!(fx.remote.fetch_all_calls(), 0);
        assert!(!fx.coordinator.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unenriched_submission_falls_back_to_resync() {
        let fx = fixture(signed_in());
        let mut draft = Draft::new("Title", "Body");

        let outcome = fx.coordinator.submit(&mut draft).await.unwrap();
        let id = outcome.record_id().unwrap();
        assert_eq!(outcome, SubmitOutcome::ResyncFallback { record_id: id });
        assert_eq!(fx.remote.fetch_record_calls(), 3);
        assert_eq!(fx.remote.fetch_all_calls(), 1);
        assert!(fx.store.get(id).unwrap().is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enriched_submission_is_upserted() {
        let fx = fixture(signed_in());
        let remote = fx.remote.clone();
        let enricher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let id = remote.pending_ids().await[0];
            remote.enrich(id, "Bug", "High").await.unwrap();
        });

        let mut draft = Draft::new("Crash", "on save");
        let outcome = fx.coordinator.submit(&mut draft).await.unwrap();
        enricher.await.unwrap();

        match outcome {
            SubmitOutcome::Enriched(record) => {
                assert_eq!(record.category.as_deref(), Some("Bug"));
                assert_eq!(fx.store.snapshot()[0].id, record.id);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(fx.remote.fetch_all_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_while_submission_in_flight() {
        let fx = Arc::new(fixture(signed_in()));
        let mut busy = fx.coordinator.watch_busy();
        assert!(!fx.coordinator.is_busy());

        let task = {
            let fx = fx.clone();
            tokio::spawn(async move {
                let mut draft = Draft::new("Title", "Body");
                fx.coordinator.submit(&mut draft).await.unwrap()
            })
        };

        busy.changed().await.unwrap();
        assert_eq!(*busy.borrow(), 1);
        assert!(fx.coordinator.is_busy());

        task.await.unwrap();
        assert!(!fx.coordinator.is_busy());
    }
}
