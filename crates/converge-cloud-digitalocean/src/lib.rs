//! DigitalOcean provider for Converge
//!
//! Drives DigitalOcean resources through the v2 REST API with an API
//! token from `DIGITALOCEAN_TOKEN`. Responses arrive in envelopes keyed
//! by the resource name; collections paginate with `links.pages.next`.

pub mod api;
pub mod error;
pub mod provider;

// Re-exports
pub use api::{next_page_url, unwrap_collection, unwrap_resource, DigitalOceanApi, DO_API_BASE};
pub use error::DigitalOceanError;
pub use provider::DigitalOceanProvider;
