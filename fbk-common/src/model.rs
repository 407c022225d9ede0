//! Feedback record model
//!
//! A record is created by the client in the `Pending` state and later
//! classified by an external pipeline, which fills in `category` and
//! `priority` and moves `status` off `"Pending"`.
//!
//! # Invariants
//! - `id` is assigned by the backend and never changes.
//! - Enrichment only moves forward: `Pending -> Enriched`.
//! - Merging two payloads for the same identity keeps the more advanced
//!   state, whichever arrived last.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Backend status string for records awaiting enrichment
pub const PENDING_STATUS: &str = "Pending";

/// Backend-assigned record identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Generate a fresh identity (used by in-process backends)
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("invalid record id `{}`: {}", s, e)))
    }
}

/// Identity of the signed-in user who submits records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("invalid user id `{}`: {}", s, e)))
    }
}

/// Enrichment progress of a record
///
/// The backend stores a free-form status string. `"Pending"` means the
/// pipeline has not run yet; any other value means it has.
///
/// Progress is ranked by [`EnrichmentState::rank`]: `Pending` ranks below
/// every `Enriched` label, and all `Enriched` labels rank equally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnrichmentState {
    /// Raw insert, not yet classified
    Pending,
    /// Classified by the pipeline; carries the backend status label
    Enriched(String),
}

impl EnrichmentState {
    pub fn is_pending(&self) -> bool {
        matches!(self, EnrichmentState::Pending)
    }

    /// Position along the `Pending -> Enriched` transition
    pub fn rank(&self) -> u8 {
        match self {
            EnrichmentState::Pending => 0,
            EnrichmentState::Enriched(_) => 1,
        }
    }

    /// Backend status label
    pub fn label(&self) -> &str {
        match self {
            EnrichmentState::Pending => PENDING_STATUS,
            EnrichmentState::Enriched(label) => label,
        }
    }
}

impl From<String> for EnrichmentState {
    fn from(status: String) -> Self {
        if status == PENDING_STATUS {
            EnrichmentState::Pending
        } else {
            EnrichmentState::Enriched(status)
        }
    }
}

impl From<EnrichmentState> for String {
    fn from(state: EnrichmentState) -> Self {
        match state {
            EnrichmentState::Pending => PENDING_STATUS.to_string(),
            EnrichmentState::Enriched(label) => label,
        }
    }
}

impl fmt::Display for EnrichmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A feedback record as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    pub status: EnrichmentState,
    pub created_at: DateTime<Utc>,
    /// Submitting user (absent on rows created outside the client)
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl Record {
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    /// Merge a newer payload for the same identity into this record
    ///
    /// The more advanced enrichment state wins regardless of arrival order:
    /// a `Pending` payload never overwrites an `Enriched` one. When the
    /// incoming payload is taken, optional fields it lacks are kept from the
    /// existing record, and `created_at` keeps its original value so the
    /// record does not move in the ordered view.
    pub fn merged_with(&self, incoming: Record) -> Record {
        debug_assert_eq!(self.id, incoming.id, "merge across identities");

        if incoming.status.rank() < self.status.rank() {
            return self.clone();
        }

        Record {
            category: incoming.category.or_else(|| self.category.clone()),
            priority: incoming.priority.or_else(|| self.priority.clone()),
            user_id: incoming.user_id.or(self.user_id),
            created_at: self.created_at,
            ..incoming
        }
    }
}

/// Fields for a raw insert
///
/// The backend assigns `id` and `created_at`; the pipeline fills the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRecord {
    pub title: String,
    pub description: String,
    pub user_id: UserId,
    pub status: EnrichmentState,
}

impl NewRecord {
    /// Build a `Pending` insert, rejecting blank required fields
    ///
    /// Fields are stored as typed; whitespace only matters for the blank check.
    pub fn pending(title: &str, description: &str, user_id: UserId) -> Result<Self> {
        if title.trim().is_empty() {
            return Err(Error::InvalidInput("title is required".to_string()));
        }
        if description.trim().is_empty() {
            return Err(Error::InvalidInput("description is required".to_string()));
        }

        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
            user_id,
            status: EnrichmentState::Pending,
        })
    }
}
