//! Change and submission type definitions
//!
//! Supporting types for backend change notices and submission outcomes.

use serde::{Deserialize, Serialize};

/// Kind of backend-side change carried by a change notice
///
/// Only updates invalidate the client view: a client learns about its own
/// inserts through the submission flow, and anything else is picked up by
/// the next full resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Parse the SSE event name used by the backend change feed
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }

    /// Whether a change of this kind should trigger a view resync
    pub fn invalidates_view(self) -> bool {
        matches!(self, ChangeKind::Update)
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Update => write!(f, "UPDATE"),
            ChangeKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// How a submission resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SubmissionResolution {
    /// Enriched record arrived within the polling window and was merged
    Enriched,
    /// Polling window expired; a full resync was run instead
    ResyncFallback,
    /// Raw insert failed; nothing was merged
    InsertFailed,
}

impl std::fmt::Display for SubmissionResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionResolution::Enriched => write!(f, "Enriched"),
            SubmissionResolution::ResyncFallback => write!(f, "ResyncFallback"),
            SubmissionResolution::InsertFailed => write!(f, "InsertFailed"),
        }
    }
}

/// What triggered a full resync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ResyncTrigger {
    /// First load when a session opens
    Initial,
    /// Change notice from the backend feed
    ChangeNotice,
    /// Change feed was re-established after a gap
    Reconnect,
    /// Enrichment polling window expired
    WaiterFallback,
    /// Explicit refresh request
    Manual,
}

impl std::fmt::Display for ResyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResyncTrigger::Initial => write!(f, "Initial"),
            ResyncTrigger::ChangeNotice => write!(f, "ChangeNotice"),
            ResyncTrigger::Reconnect => write!(f, "Reconnect"),
            ResyncTrigger::WaiterFallback => write!(f, "WaiterFallback"),
            ResyncTrigger::Manual => write!(f, "Manual"),
        }
    }
}
