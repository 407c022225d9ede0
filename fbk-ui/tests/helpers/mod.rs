//! Test helper modules for fbk-ui integration tests
//!
//! - FakeBackend: local REST + SSE backend for the HTTP remote store

pub mod fake_backend;

pub use fake_backend::{FakeBackend, API_KEY};
