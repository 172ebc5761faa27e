//! Azure Resource Manager provider for Converge
//!
//! Drives ARM resources with client-credentials bearer tokens. Resource
//! identity is URL-encoded; mutations follow the ARM async conventions
//! (202 + `Location` operation URLs, `provisioningState` on the resource
//! body) and list pagination follows `nextLink`.

pub mod api;
pub mod auth;
pub mod error;
pub mod provider;

// Re-exports
pub use api::{ArmClient, ARM_API_BASE};
pub use auth::{acquire_token, AzureCredentials, ARM_SCOPE};
pub use error::AzureError;
pub use provider::AzureProvider;
