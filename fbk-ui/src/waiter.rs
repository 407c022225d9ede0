//! Bounded wait for a just-inserted record to be enriched
//!
//! After a raw insert the external pipeline gets a fixed window to classify
//! the record. The waiter polls the single row by identity:
//!
//! 1. Fetch the row (bounded by `fetch_timeout`)
//! 2. If it is no longer `Pending`, return it immediately
//! 3. Otherwise, if attempts remain, sleep `interval` and go to 1
//! 4. After the last attempt, return `None`
//!
//! A failed or timed-out fetch counts as "not enriched yet". `None` tells the
//! caller to fall back to a full resync; it is never reported as an error.
//!
//! Worst case: `max_attempts * fetch_timeout + (max_attempts - 1) * interval`.

use crate::remote::RemoteStore;
use fbk_common::config::EnrichmentConfig;
use fbk_common::{Record, RecordId};
use fbk_common::time::duration_ms;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};

/// Polling window for [`EnrichmentWaiter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Fetch attempts (at least 1)
    pub max_attempts: u32,
    /// Delay between attempts
    pub interval: Duration,
    /// Upper bound on one fetch
    pub fetch_timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from(&EnrichmentConfig::default())
    }
}

impl From<&EnrichmentConfig> for WaitPolicy {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            interval: config.poll_interval(),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

impl WaitPolicy {
    /// Longest time `await_enrichment` can take
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        self.fetch_timeout * attempts + self.interval * (attempts - 1)
    }
}

/// Polls the remote store until a record leaves the `Pending` state
pub struct EnrichmentWaiter {
    remote: Arc<dyn RemoteStore>,
    policy: WaitPolicy,
}

impl EnrichmentWaiter {
    pub fn new(remote: Arc<dyn RemoteStore>, policy: WaitPolicy) -> Self {
        Self { remote, policy }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Wait for `id` to be enriched; `None` when the window expires
    pub async fn await_enrichment(&self, id: RecordId) -> Option<Record> {
        let start = Instant::now();
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match timeout(self.policy.fetch_timeout, self.remote.fetch_record(id)).await {
                Ok(Ok(Some(record))) if !record.is_pending() => {
                    debug!(
                        record_id = %id,
                        attempt,
                        elapsed_ms = duration_ms(start.elapsed()),
                        "Record enriched"
                    );
                    return Some(record);
                }
                Ok(Ok(Some(_))) => {
                    debug!(record_id = %id, attempt, "Record still pending");
                }
                Ok(Ok(None)) => {
                    debug!(record_id = %id, attempt, "Record not visible yet");
                }
                Ok(Err(e)) => {
                    debug!(record_id = %id, attempt, error = %e, "Enrichment poll failed, will retry");
                }
                Err(_) => {
                    debug!(
                        record_id = %id,
                        attempt,
                        timeout_ms = self.policy.fetch_timeout.as_millis() as u64,
                        "Enrichment poll timed out"
                    );
                }
            }

            if attempt < attempts {
                sleep(self.policy.interval).await;
            }
        }

        info!(
            record_id = %id,
            attempts,
            elapsed_ms = duration_ms(start.elapsed()),
            "Enrichment window expired"
        );
        None
    }
}
