//! # FBK Common Library
//!
//! Shared code for the feedback reconciliation client including:
//! - Record model (identity, enrichment state, merge rule)
//! - Event types (FeedbackEvent enum) and the EventBus
//! - Bootstrap configuration loading
//! - Server-Sent Events frame decoding
//! - Utility functions

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use model::{EnrichmentState, NewRecord, Record, RecordId, UserId};
