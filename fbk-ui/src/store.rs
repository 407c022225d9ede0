//! Ordered in-memory record view
//!
//! `RecordStore` is the single source of truth the presentation layer
//! renders. It is mutated only through two whole-operation entry points,
//! [`RecordStore::replace_all`] (full refetch) and [`RecordStore::upsert_one`]
//! (single enriched record), and publishes an immutable snapshot after each.
//!
//! # Invariants
//! - At most one entry per identity.
//! - Entries are ordered by `created_at` descending; among equal timestamps
//!   the most recently inserted entry comes first.
//! - An `Enriched` entry is never replaced by a `Pending` payload, whether
//!   the payload comes from an upsert or a snapshot.
//! - Readers only ever see complete snapshots.
//!
//! # Snapshot freshness
//! A full refetch takes a [`FetchTicket`] before it starts fetching. Applying
//! the result with an older ticket than the last applied one is a no-op, and
//! entries upserted after the ticket was issued survive a snapshot that does
//! not contain them yet.

use fbk_common::{Record, RecordId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

/// Immutable ordered view handed to readers
pub type Snapshot = Arc<[Record]>;

/// Position of a full fetch relative to other fetches and upserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
    version: u64,
}

#[derive(Debug)]
struct Entry {
    record: Record,
    /// Upsert version that last wrote this entry (0 = only seen in snapshots)
    touched: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<Entry>,
    /// Bumped on every upsert
    version: u64,
    /// Last ticket handed out
    issued: u64,
    /// Last ticket whose snapshot was applied
    applied: u64,
}

/// Ordered, deduplicated record collection
pub struct RecordStore {
    inner: Mutex<Inner>,
    snapshots: watch::Sender<Snapshot>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(Snapshot::from(Vec::new()));
        Self {
            inner: Mutex::new(Inner::default()),
            snapshots,
        }
    }

    /// Current ordered view
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored record for `id`, if any
    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.lock()
            .entries
            .iter()
            .find(|e| e.record.id == id)
            .map(|e| e.record.clone())
    }

    /// Reserve a ticket for a full fetch that is about to start
    pub fn begin_fetch(&self) -> FetchTicket {
        let mut inner = self.lock();
        inner.issued += 1;
        FetchTicket {
            seq: inner.issued,
            version: inner.version,
        }
    }

    /// Replace the whole view with a freshly fetched collection
    ///
    /// Equivalent to taking a ticket now and applying `records` with it.
    pub fn replace_all(&self, records: Vec<Record>) {
        let ticket = self.begin_fetch();
        self.apply_snapshot(ticket, records);
    }

    /// Apply a fetched collection taken under `ticket`
    ///
    /// Returns `false` when a fresher snapshot was already applied and this
    /// one was discarded.
    pub fn apply_snapshot(&self, ticket: FetchTicket, records: Vec<Record>) -> bool {
        let mut inner = self.lock();
        if ticket.seq <= inner.applied {
            debug!(
                ticket = ticket.seq,
                applied = inner.applied,
                "Discarding stale snapshot"
            );
            return false;
        }
        inner.applied = ticket.seq;

        let mut previous: HashMap<RecordId, (usize, Entry)> = inner
            .entries
            .drain(..)
            .enumerate()
            .map(|(pos, e)| (e.record.id, (pos, e)))
            .collect();

        let mut next: Vec<Entry> = Vec::with_capacity(records.len());
        let mut index: HashMap<RecordId, usize> = HashMap::with_capacity(records.len());
        for record in records {
            if let Some(&at) = index.get(&record.id) {
                // Duplicate identity inside one snapshot
                next[at].record = next[at].record.merged_with(record);
                continue;
            }
            let entry = match previous.remove(&record.id) {
                Some((_, existing)) => Entry {
                    record: existing.record.merged_with(record),
                    touched: existing.touched,
                },
                None => Entry { record, touched: 0 },
            };
            index.insert(entry.record.id, next.len());
            next.push(entry);
        }

        // Stable: equal timestamps keep snapshot order
        next.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));

        // Upserted after the fetch began: the snapshot cannot know about them
        // yet. Reinserted back to front, each ahead of equal timestamps, so
        // they keep the slots `upsert_one` gave them.
        let mut retained: Vec<(usize, Entry)> = previous
            .into_values()
            .filter(|(_, e)| e.touched > ticket.version)
            .collect();
        retained.sort_by(|a, b| b.0.cmp(&a.0));
        let retained_count = retained.len();
        for (_, entry) in retained {
            let at = next
                .iter()
                .position(|e| e.record.created_at <= entry.record.created_at)
                .unwrap_or(next.len());
            next.insert(at, entry);
        }
        inner.entries = next;

        debug!(
            ticket = ticket.seq,
            records = inner.entries.len(),
            retained = retained_count,
            "Applied snapshot"
        );
        self.publish(&inner);
        true
    }

    /// Insert or merge a single record; returns the stored result
    ///
    /// A new identity is placed at its temporal slot (the head, for a record
    /// just created). An existing identity is merged in place and keeps its
    /// position.
    pub fn upsert_one(&self, record: Record) -> Record {
        let mut inner = self.lock();
        inner.version += 1;
        let version = inner.version;

        let stored = match inner.entries.iter().position(|e| e.record.id == record.id) {
            Some(pos) => {
                let merged = inner.entries[pos].record.merged_with(record);
                inner.entries[pos] = Entry {
                    record: merged.clone(),
                    touched: version,
                };
                merged
            }
            None => {
                let at = inner
                    .entries
                    .iter()
                    .position(|e| e.record.created_at <= record.created_at)
                    .unwrap_or(inner.entries.len());
                inner.entries.insert(
                    at,
                    Entry {
                        record: record.clone(),
                        touched: version,
                    },
                );
                record
            }
        };

        debug!(record_id = %stored.id, pending = stored.is_pending(), "Upserted record");
        self.publish(&inner);
        stored
    }

    fn publish(&self, inner: &Inner) {
        let snapshot: Snapshot = inner.entries.iter().map(|e| e.record.clone()).collect();
        self.snapshots.send_replace(snapshot);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No mutation leaves Inner half-written, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
