//! Full resynchronization of the record view
//!
//! Shared by the initial load, the invalidation listener and the waiter
//! fallback. One run:
//!
//! 1. Take a fetch ticket from the store
//! 2. Fetch the whole collection
//! 3. Apply it under that ticket (stale results are discarded by the store)
//!
//! Transient fetch errors are retried with a fixed delay up to
//! `max_attempts`; any other error, or exhaustion, is returned to the caller.

use crate::remote::RemoteStore;
use crate::store::RecordStore;
use fbk_common::config::ResyncConfig;
use fbk_common::events::{EventBus, FeedbackEvent, ResyncTrigger};
use fbk_common::Result;
use fbk_common::time::{self, duration_ms};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Retry behavior for a full fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ResyncPolicy {
    fn default() -> Self {
        Self::from(&ResyncConfig::default())
    }
}

impl From<&ResyncConfig> for ResyncPolicy {
    fn from(config: &ResyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }
}

/// Refetches the collection into a [`RecordStore`]
#[derive(Clone)]
pub struct Resync {
    remote: Arc<dyn RemoteStore>,
    store: Arc<RecordStore>,
    events: EventBus,
    policy: ResyncPolicy,
}

impl Resync {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        store: Arc<RecordStore>,
        events: EventBus,
        policy: ResyncPolicy,
    ) -> Self {
        Self {
            remote,
            store,
            events,
            policy,
        }
    }

    /// Fetch everything and replace the view
    ///
    /// Returns the number of records in the view afterwards.
    pub async fn run(&self, trigger: ResyncTrigger) -> Result<usize> {
        let start = Instant::now();
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let ticket = self.store.begin_fetch();

            match self.remote.fetch_all().await {
                Ok(records) => {
                    let fetched = records.len();
                    let applied = self.store.apply_snapshot(ticket, records);
                    let record_count = self.store.len();

                    if applied {
                        info!(
                            %trigger,
                            fetched,
                            records = record_count,
                            attempt,
                            elapsed_ms = duration_ms(start.elapsed()),
                            "Resync applied"
                        );
                        self.events.emit_lossy(FeedbackEvent::SnapshotReplaced {
                            record_count,
                            trigger,
                            timestamp: time::now(),
                        });
                    } else {
                        debug!(%trigger, fetched, "Resync superseded by a fresher snapshot");
                    }
                    return Ok(record_count);
                }
                Err(err) if err.is_transient() && attempt < attempts => {
                    debug!(
                        %trigger,
                        attempt,
                        error = %err,
                        "Resync fetch failed, retrying"
                    );
                    sleep(self.policy.retry_delay).await;
                }
                Err(err) => {
                    warn!(
                        %trigger,
                        attempt,
                        elapsed_ms = duration_ms(start.elapsed()),
                        error = %err,
                        "Resync failed"
                    );
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemoteStore;
    use fbk_common::{NewRecord, UserId};
    use uuid::Uuid;

    fn setup() -> (Arc<InMemoryRemoteStore>, Arc<RecordStore>, EventBus, Resync) {
        let remote = Arc::new(InMemoryRemoteStore::default());
        let store = Arc::new(RecordStore::new());
        let events = EventBus::new(16);
        let resync = Resync::new(
            remote.clone(),
            store.clone(),
            events.clone(),
            ResyncPolicy::default(),
        );
        (remote, store, events, resync)
    }

    async fn insert(remote: &InMemoryRemoteStore, title: &str) {
        let record = NewRecord::pending(title, "details", UserId(Uuid::new_v4())).unwrap();
        remote.insert_record(&record).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_replaces_view_and_emits_event() {
        let (remote, store, events, resync) = setup();
        let mut rx = events.subscribe();
        insert(&remote, "First").await;
        insert(&remote, "Second").await;

        let count = resync.run(ResyncTrigger::Manual).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.snapshot()[0].title, "Second");

        match rx.try_recv().unwrap() {
            FeedbackEvent::SnapshotReplaced {
                record_count,
                trigger,
                ..
            } => {
                assert_eq!(record_count, 2);
                assert_eq!(trigger, ResyncTrigger::Manual);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let (remote, store, _events, resync) = setup();
        insert(&remote, "Only").await;
        remote.fail_next_fetches(2);

        let start = Instant::now();
        assert_eq!(resync.run(ResyncTrigger::ChangeNotice).await.unwrap(), 1);
        assert_eq!(remote.fetch_all_calls(), 3);
        assert_eq!(store.len(), 1);
        assert!(start.elapsed() >= ResyncPolicy::default().retry_delay * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_error_and_keeps_view() {
        let (remote, store, _events, resync) = setup();
        insert(&remote, "Kept").await;
        resync.run(ResyncTrigger::Initial).await.unwrap();

        remote.fail_next_fetches(10);
        assert!(resync.run(ResyncTrigger::ChangeNotice).await.is_err());
        assert_eq!(remote.fetch_all_calls(), 1 + 3);
        assert_eq!(store.len(), 1);
    }
}
