//! Microsoft Entra provider for Converge
//!
//! Drives directory resources (applications, groups, users, service
//! principals) through the Microsoft Graph API with client-credentials
//! bearer tokens. Graph models polymorphic objects as a flat enum field
//! plus type-specific siblings, so this adapter leans on the
//! discriminator metadata in the property usage map.

pub mod error;
pub mod graph;
pub mod provider;

// Re-exports
pub use error::EntraError;
pub use graph::{
    acquire_token, strip_odata_metadata, EntraCredentials, GraphClient, GRAPH_API_BASE,
    GRAPH_SCOPE,
};
pub use provider::EntraProvider;
