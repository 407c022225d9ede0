//! Dashboard session
//!
//! Composition root for one signed-in session. Opening a dashboard:
//!
//! 1. Requires a signed-in user
//! 2. Subscribes to the change feed
//! 3. Performs the initial full load
//! 4. Starts the invalidation listener on the subscription from step 2
//!
//! Subscribing before the initial load means a change landing between the
//! two still produces a notice. Failures in steps 2 and 3 are logged and
//! leave the listener to recover; the dashboard opens either way.
//!
//! Closing (or dropping) the dashboard stops the listener and releases the
//! subscription.

use crate::coordinator::{Draft, SubmissionCoordinator, SubmitOutcome};
use crate::listener::{InvalidationListener, ListenerHandle, ReconnectPolicy};
use crate::remote::RemoteStore;
use crate::resync::{Resync, ResyncPolicy};
use crate::session::Session;
use crate::store::{RecordStore, Snapshot};
use crate::waiter::{EnrichmentWaiter, WaitPolicy};
use fbk_common::config::ClientConfig;
use fbk_common::events::{EventBus, FeedbackEvent, ResyncTrigger};
use fbk_common::{Error, Result, UserId};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Event bus capacity when not configured
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Tunables for one dashboard session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardSettings {
    pub wait: WaitPolicy,
    pub resync: ResyncPolicy,
    pub reconnect: ReconnectPolicy,
    pub event_capacity: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            wait: WaitPolicy::default(),
            resync: ResyncPolicy::default(),
            reconnect: ReconnectPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl DashboardSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            wait: WaitPolicy::from(&config.enrichment),
            resync: ResyncPolicy::from(&config.resync),
            reconnect: ReconnectPolicy::from(&config.invalidation),
            event_capacity: config.invalidation.channel_capacity.max(1),
        }
    }
}

/// Live view plus submit action for one session
pub struct Dashboard {
    user: UserId,
    store: Arc<RecordStore>,
    coordinator: SubmissionCoordinator,
    resync: Resync,
    events: EventBus,
    listener: Option<ListenerHandle>,
}

impl Dashboard {
    pub async fn open(
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn Session>,
        settings: DashboardSettings,
    ) -> Result<Self> {
        let user = session
            .current_user()
            .ok_or_else(|| Error::Unauthenticated("no signed-in user".to_string()))?;

        let store = Arc::new(RecordStore::new());
        let events = EventBus::new(settings.event_capacity.max(1));
        let resync = Resync::new(
            Arc::clone(&remote),
            Arc::clone(&store),
            events.clone(),
            settings.resync,
        );

        let subscription = match remote.subscribe().await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(error = %e, "Change feed unavailable at open, listener will retry");
                None
            }
        };

        if let Err(e) = resync.run(ResyncTrigger::Initial).await {
            warn!(error = %e, "Initial load failed, view starts empty");
        }

        let listener = InvalidationListener::new(
            Arc::clone(&remote),
            resync.clone(),
            settings.reconnect,
            events.clone(),
        )
        .spawn(subscription);

        let coordinator = SubmissionCoordinator::new(
            Arc::clone(&remote),
            session,
            EnrichmentWaiter::new(Arc::clone(&remote), settings.wait),
            Arc::clone(&store),
            resync.clone(),
            events.clone(),
        );

        info!(
            user_id = %user,
            backend = remote.name(),
            records = store.len(),
            "Dashboard opened"
        );

        Ok(Self {
            user,
            store,
            coordinator,
            resync,
            events,
            listener: Some(listener),
        })
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    /// Current ordered view
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Receiver notified whenever the view changes
    pub fn watch_snapshots(&self) -> watch::Receiver<Snapshot> {
        self.store.subscribe()
    }

    /// Session events (resyncs, finished submissions, reconnects)
    pub fn subscribe_events(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.events.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.coordinator.is_busy()
    }

    pub fn watch_busy(&self) -> watch::Receiver<usize> {
        self.coordinator.watch_busy()
    }

    pub async fn submit(&self, draft: &mut Draft) -> Result<SubmitOutcome> {
        self.coordinator.submit(draft).await
    }

    /// Explicit full reload
    pub async fn refresh(&self) -> Result<usize> {
        self.resync.run(ResyncTrigger::Manual).await
    }

    /// Stop the listener and wait for it to release the change feed
    pub async fn close(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
        info!(user_id = %self.user, "Dashboard closed");
    }
}
