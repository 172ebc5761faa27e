//! Google Cloud provider for Converge
//!
//! Drives Google Cloud REST resources with a bearer token obtained
//! through the gcloud CLI (`auth activate-service-account` followed by
//! `auth print-access-token`). Mutations that answer with an operation
//! body are polled to `done`; listings paginate with `nextPageToken`.

pub mod auth;
pub mod error;
pub mod provider;

// Re-exports
pub use auth::GcloudAuth;
pub use error::GcpError;
pub use provider::{is_operation, GcpProvider};
