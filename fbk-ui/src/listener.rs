//! Change feed listener
//!
//! Runs as one background task per dashboard session:
//!
//! ```text
//! wait for notice ──► drain queued notices ──► full resync ──┐
//!       ▲                                                     │
//!       └─────────────────────────────────────────────────────┘
//! feed ended ──► backoff ──► resubscribe ──► resync(Reconnect)
//! ```
//!
//! Notices carry no trusted payload; every one (or every batch already
//! queued) becomes a single full resync. When the feed ends the listener
//! resubscribes with exponential backoff and performs one resync once the
//! feed is back, covering anything missed during the gap.
//!
//! The task stops when its [`ListenerHandle`] is shut down or dropped, and
//! releases the subscription on the way out.

use crate::remote::{ChangeSubscription, RemoteStore};
use crate::resync::Resync;
use fbk_common::config::InvalidationConfig;
use fbk_common::events::{EventBus, FeedbackEvent, ResyncTrigger};
use fbk_common::time;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Resubscription backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first resubscribe attempt
    pub initial: Duration,
    /// Cap for the doubled delay
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&InvalidationConfig::default())
    }
}

impl From<&InvalidationConfig> for ReconnectPolicy {
    fn from(config: &InvalidationConfig) -> Self {
        Self {
            initial: config.reconnect_initial(),
            max: config.reconnect_max().max(config.reconnect_initial()),
        }
    }
}

impl ReconnectPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

/// Turns change notices into full resyncs
pub struct InvalidationListener {
    remote: Arc<dyn RemoteStore>,
    resync: Resync,
    policy: ReconnectPolicy,
    events: EventBus,
}

impl InvalidationListener {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        resync: Resync,
        policy: ReconnectPolicy,
        events: EventBus,
    ) -> Self {
        Self {
            remote,
            resync,
            policy,
            events,
        }
    }

    /// Start the listener task
    ///
    /// `subscription` is a feed opened by the caller before its initial load.
    /// With `None` the task starts by (re)subscribing under backoff.
    pub fn spawn(self, subscription: Option<ChangeSubscription>) -> ListenerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(subscription, cancel.clone()));
        ListenerHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, subscription: Option<ChangeSubscription>, cancel: CancellationToken) {
        let mut subscription = match subscription {
            Some(subscription) => subscription,
            None => match self.reconnect(&cancel).await {
                Some(subscription) => subscription,
                None => return,
            },
        };
        info!(backend = self.remote.name(), "Invalidation listener started");

        loop {
            let notice = tokio::select! {
                _ = cancel.cancelled() => break,
                notice = subscription.next_notice() => notice,
            };

            let mut feed_ended = notice.is_none();
            if let Some(notice) = notice {
                let (coalesced, ended) = subscription.drain_ready();
                feed_ended = ended;
                debug!(kind = %notice.kind, coalesced, "Change notice received");

                if !self.resync_or_cancel(ResyncTrigger::ChangeNotice, &cancel).await {
                    break;
                }
            }

            if feed_ended {
                warn!(backend = self.remote.name(), "Change feed disconnected");
                drop(subscription);
                subscription = match self.reconnect(&cancel).await {
                    Some(subscription) => subscription,
                    None => break,
                };
            }
        }

        info!("Invalidation listener stopped");
    }

    /// Run one resync unless cancelled first; `false` means stop
    async fn resync_or_cancel(&self, trigger: ResyncTrigger, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            result = self.resync.run(trigger) => {
                if let Err(e) = result {
                    debug!(%trigger, error = %e, "Resync after change notice failed");
                }
                true
            }
        }
    }

    /// Resubscribe with exponential backoff, then resync once
    ///
    /// Returns `None` only when cancelled.
    async fn reconnect(&self, cancel: &CancellationToken) -> Option<ChangeSubscription> {
        let mut delay = self.policy.initial;
        let mut attempts: u32 = 0;

        let subscription = loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = sleep(delay) => {}
            }
            attempts += 1;

            let result = tokio::select! {
                _ = cancel.cancelled() => return None,
                result = self.remote.subscribe() => result,
            };
            match result {
                Ok(subscription) => break subscription,
                Err(e) => {
                    let next = self.policy.next_delay(delay);
                    warn!(
                        attempt = attempts,
                        retry_in_ms = next.as_millis() as u64,
                        error = %e,
                        "Change feed resubscribe failed"
                    );
                    delay = next;
                }
            }
        };

        info!(attempts, "Change feed reconnected");
        self.events.emit_lossy(FeedbackEvent::ChangeFeedReconnected {
            attempts,
            timestamp: time::now(),
        });

        if !self.resync_or_cancel(ResyncTrigger::Reconnect, cancel).await {
            return None;
        }
        Some(subscription)
    }
}

/// Owner of a running listener task
///
/// Dropping the handle cancels the task; [`ListenerHandle::shutdown`] also
/// waits for it to finish.
pub struct ListenerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancel the task and wait until it has released its subscription
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Invalidation listener task failed");
                }
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
