//! Remote entity store abstraction
//!
//! The backend is an opaque store of feedback rows plus a change feed. Each
//! component receives it explicitly as `Arc<dyn RemoteStore>`.
//!
//! Implementations:
//! - [`rest::RestRemoteStore`]: HTTP row API with an SSE change feed
//! - [`memory::InMemoryRemoteStore`]: in-process store for tests and demo mode

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use fbk_common::events::ChangeKind;
use fbk_common::{NewRecord, Record, RecordId, Result};
use futures::future::FutureExt;
use futures::stream::{BoxStream, Fuse, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

pub use memory::{InMemoryRemoteStore, SimulatedPipeline};
pub use rest::RestRemoteStore;

/// Backend row store consumed by the reconciliation core
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short backend name for logging
    fn name(&self) -> &'static str;

    /// Insert a raw record; the backend returns the stored row
    async fn insert_record(&self, record: &NewRecord) -> Result<Record>;

    /// Fetch one record by identity (`Ok(None)` when not found)
    async fn fetch_record(&self, id: RecordId) -> Result<Option<Record>>;

    /// Fetch the whole collection, newest first
    async fn fetch_all(&self) -> Result<Vec<Record>>;

    /// Open the change feed for the record collection
    ///
    /// Only update events become notices; inserts and deletes are dropped.
    async fn subscribe(&self) -> Result<ChangeSubscription>;
}

/// "Something changed" signal from the backend
///
/// The kind is informational only; receivers resync the whole collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice {
    pub kind: ChangeKind,
}

/// Live change feed handle
///
/// A lazy, non-restartable stream of [`ChangeNotice`]s. The stream ends when
/// the backend closes the feed. Dropping the handle (or calling
/// [`ChangeSubscription::unsubscribe`]) releases the underlying channel.
pub struct ChangeSubscription {
    source: &'static str,
    stream: Fuse<BoxStream<'static, ChangeNotice>>,
}

impl ChangeSubscription {
    pub fn new<S>(source: &'static str, stream: S) -> Self
    where
        S: Stream<Item = ChangeNotice> + Send + 'static,
    {
        debug!(source, "Change subscription opened");
        Self {
            source,
            stream: stream.boxed().fuse(),
        }
    }

    /// Next notice; `None` once the feed has ended
    pub async fn next_notice(&mut self) -> Option<ChangeNotice> {
        self.stream.next().await
    }

    /// Take every notice that is already queued without waiting
    ///
    /// Returns the number drained and whether the feed ended meanwhile.
    pub fn drain_ready(&mut self) -> (usize, bool) {
        let mut drained = 0;
        loop {
            match self.stream.next().now_or_never() {
                Some(Some(_)) => drained += 1,
                Some(None) => return (drained, true),
                None => return (drained, false),
            }
        }
    }

    /// Explicit teardown
    pub fn unsubscribe(self) {}
}

impl Stream for ChangeSubscription {
    type Item = ChangeNotice;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        debug!(source = self.source, "Change subscription released");
    }
}
