//! Firestore REST API client.
//!
//! The subset of Firestore the job system writes to: service-account or
//! emulator authentication, masked document merges with retry, and the
//! project repository the stitching worker updates.

pub mod client;
pub mod error;
pub mod metrics;
pub mod projects;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use projects::ProjectRepository;
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
