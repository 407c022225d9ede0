//! In-process remote store
//!
//! Behaves like the hosted backend from the client's point of view: the
//! store assigns identity and `created_at`, lists newest first, and
//! broadcasts a change event on every write, of which subscriptions deliver
//! only the updates. Used by the test suites and by
//! the binary's demo mode, together with [`SimulatedPipeline`] standing in for
//! the external enrichment worker.
//!
//! Fault injection hooks let tests fail inserts or fetches and sever the
//! change feed.

use super::{ChangeNotice, ChangeSubscription, RemoteStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fbk_common::events::{ChangeKind, EventBus, FeedbackEvent};
use fbk_common::{EnrichmentState, Error, NewRecord, Record, RecordId, Result};
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// Status label written by the simulated pipeline
pub const PROCESSED_STATUS: &str = "Processed";

#[derive(Debug, Default)]
struct Faults {
    failing_inserts: u32,
    failing_fetches: u32,
    failing_subscribes: u32,
}

/// In-memory backend with a broadcast change feed
pub struct InMemoryRemoteStore {
    rows: RwLock<Vec<Record>>,
    feed: Mutex<EventBus>,
    feed_capacity: usize,
    faults: Mutex<Faults>,
    last_created_at: Mutex<Option<DateTime<Utc>>>,
    fetch_all_calls: AtomicUsize,
    fetch_record_calls: AtomicUsize,
}

impl InMemoryRemoteStore {
    /// Create an empty store whose change feed buffers `feed_capacity` notices
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            feed: Mutex::new(EventBus::new(feed_capacity)),
            feed_capacity,
            faults: Mutex::new(Faults::default()),
            last_created_at: Mutex::new(None),
            fetch_all_calls: AtomicUsize::new(0),
            fetch_record_calls: AtomicUsize::new(0),
        }
    }

    /// Place a row directly, as if written by another client (no notice)
    pub async fn seed(&self, record: Record) {
        self.rows.write().await.push(record);
    }

    /// Stand-in for the enrichment worker: classify a row and flip its status
    pub async fn enrich(&self, id: RecordId, category: &str, priority: &str) -> Result<Record> {
        let updated = {
            let mut rows = self.rows.write().await;
            let row = rows
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| Error::NotFound(format!("record {}", id)))?;
            row.category = Some(category.to_string());
            row.priority = Some(priority.to_string());
            row.status = EnrichmentState::Enriched(PROCESSED_STATUS.to_string());
            row.clone()
        };

        debug!(record_id = %id, category, priority, "Record enriched");
        self.notify(ChangeKind::Update);
        Ok(updated)
    }

    /// Broadcast a change notice without touching any row
    pub fn notify(&self, kind: ChangeKind) {
        self.lock_feed().emit_lossy(FeedbackEvent::record_changed(kind));
    }

    /// Fail the next `count` inserts with a 503
    pub fn fail_next_inserts(&self, count: u32) {
        self.lock_faults().failing_inserts = count;
    }

    /// Fail the next `count` fetches (single or full) with a 503
    pub fn fail_next_fetches(&self, count: u32) {
        self.lock_faults().failing_fetches = count;
    }

    /// Refuse the next `count` change feed subscriptions with a 503
    pub fn fail_next_subscribes(&self, count: u32) {
        self.lock_faults().failing_subscribes = count;
    }

    /// Close every open change subscription, as a dropped connection would
    pub fn sever_change_feed(&self) {
        let mut feed = self.lock_feed();
        info!(
            subscribers = feed.subscriber_count(),
            "Severing in-memory change feed"
        );
        *feed = EventBus::new(self.feed_capacity);
    }

    /// Every write event, including the inserts the change feed filters out
    fn raw_feed(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.lock_feed().subscribe()
    }

    /// Open change subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.lock_feed().subscriber_count()
    }

    /// Number of full-collection fetches served (including failed ones)
    pub fn fetch_all_calls(&self) -> usize {
        self.fetch_all_calls.load(Ordering::SeqCst)
    }

    /// Number of single-record fetches served (including failed ones)
    pub fn fetch_record_calls(&self) -> usize {
        self.fetch_record_calls.load(Ordering::SeqCst)
    }

    /// Rows still awaiting enrichment
    pub async fn pending_ids(&self) -> Vec<RecordId> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|r| r.is_pending())
            .map(|r| r.id)
            .collect()
    }

    fn take_fetch_fault(&self) -> Result<()> {
        let mut faults = self.lock_faults();
        if faults.failing_fetches > 0 {
            faults.failing_fetches -= 1;
            return Err(unavailable("fetch"));
        }
        Ok(())
    }

    /// Strictly increasing creation timestamps, even within one clock tick
    fn next_created_at(&self) -> DateTime<Utc> {
        let mut last = self
            .last_created_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut now = Utc::now();
        if let Some(previous) = *last {
            if now <= previous {
                now = previous + ChronoDuration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    fn lock_feed(&self) -> MutexGuard<'_, EventBus> {
        self.feed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new(64)
    }
}

fn unavailable(operation: &str) -> Error {
    Error::Backend {
        status: 503,
        message: format!("injected {} failure", operation),
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert_record(&self, record: &NewRecord) -> Result<Record> {
        {
            let mut faults = self.lock_faults();
            if faults.failing_inserts > 0 {
                faults.failing_inserts -= 1;
                return Err(unavailable("insert"));
            }
        }

        let row = Record {
            id: RecordId::new_v4(),
            title: record.title.clone(),
            description: record.description.clone(),
            category: None,
            priority: None,
            status: record.status.clone(),
            created_at: self.next_created_at(),
            user_id: Some(record.user_id),
        };
        self.rows.write().await.push(row.clone());

        debug!(record_id = %row.id, "Record inserted");
        self.notify(ChangeKind::Insert);
        Ok(row)
    }

    async fn fetch_record(&self, id: RecordId) -> Result<Option<Record>> {
        self.fetch_record_calls.fetch_add(1, Ordering::SeqCst);
        self.take_fetch_fault()?;
        Ok(self.rows.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn fetch_all(&self) -> Result<Vec<Record>> {
        self.fetch_all_calls.fetch_add(1, Ordering::SeqCst);
        self.take_fetch_fault()?;
        let mut rows = self.rows.read().await.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn subscribe(&self) -> Result<ChangeSubscription> {
        {
            let mut faults = self.lock_faults();
            if faults.failing_subscribes > 0 {
                faults.failing_subscribes -= 1;
                return Err(unavailable("subscribe"));
            }
        }

        let rx = self.lock_feed().subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|item| async move {
            match item {
                Ok(FeedbackEvent::RecordChanged { kind, .. }) if kind.invalidates_view() => {
                    Some(ChangeNotice { kind })
                }
                Ok(FeedbackEvent::RecordChanged { kind, .. }) => {
                    debug!(%kind, "Ignoring change feed event");
                    None
                }
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    // Missed events may have included updates
                    warn!(missed, "Change feed receiver lagged");
                    Some(ChangeNotice {
                        kind: ChangeKind::Update,
                    })
                }
            }
        });
        Ok(ChangeSubscription::new("memory", stream))
    }
}

/// Classification the simulated worker assigns from the record text
pub fn classify(title: &str, description: &str) -> (&'static str, &'static str) {
    let text = format!("{} {}", title, description).to_lowercase();
    if ["bug", "error", "crash", "broken", "fail"]
        .iter()
        .any(|k| text.contains(k))
    {
        ("Bug", "High")
    } else if ["feature", "add", "request", "would like", "support"]
        .iter()
        .any(|k| text.contains(k))
    {
        ("Feature Request", "Medium")
    } else {
        ("General", "Low")
    }
}

/// Background worker that enriches every pending row after a delay
pub struct SimulatedPipeline {
    task: JoinHandle<()>,
}

impl SimulatedPipeline {
    /// Start enriching rows of `store` `delay` after each insert
    pub fn spawn(store: Arc<InMemoryRemoteStore>, delay: Duration) -> Self {
        let mut feed = store.raw_feed();
        let task = tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(FeedbackEvent::RecordChanged {
                        kind: ChangeKind::Insert,
                        ..
                    }) => {}
                    Ok(_) => continue,
                    // A missed event may have been an insert
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                tokio::time::sleep(delay).await;

                for id in store.pending_ids().await {
                    let row = match store.fetch_record(id).await {
                        Ok(Some(row)) => row,
                        _ => continue,
                    };
                    let (category, priority) = classify(&row.title, &row.description);
                    if let Err(e) = store.enrich(id, category, priority).await {
                        warn!(record_id = %id, error = %e, "Simulated enrichment failed");
                    }
                }
            }
            debug!("Simulated pipeline stopped: change feed closed");
        });

        info!(delay_ms = delay.as_millis() as u64, "Simulated enrichment pipeline started");
        Self { task }
    }

    /// Stop the worker
    pub fn stop(self) {
        self.task.abort();
    }
}
