//! fbk-ui library - feedback reconciliation core
//!
//! Keeps a client-held, ordered view of feedback records consistent with a
//! backend that writes each record twice: a raw `Pending` insert, then a
//! delayed enrichment by an external pipeline.
//!
//! - [`store::RecordStore`]: ordered, deduplicated view
//! - [`waiter::EnrichmentWaiter`]: bounded polling for one record
//! - [`listener::InvalidationListener`]: change feed → full resync
//! - [`coordinator::SubmissionCoordinator`]: insert → wait → merge or resync
//! - [`dashboard::Dashboard`]: wires the above together for one session

pub mod coordinator;
pub mod dashboard;
pub mod listener;
pub mod remote;
pub mod resync;
pub mod session;
pub mod store;
pub mod view;
pub mod waiter;

pub use coordinator::{Draft, SubmissionCoordinator, SubmitOutcome};
pub use dashboard::{Dashboard, DashboardSettings};
pub use remote::{ChangeNotice, ChangeSubscription, RemoteStore};
pub use session::{Session, StaticSession};
pub use store::{RecordStore, Snapshot};
