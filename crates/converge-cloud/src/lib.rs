//! Converge Cloud Reconciliation Engine
//!
//! This crate is the provider-agnostic core of Converge: it takes a
//! component (the generic description of one infrastructure resource) and
//! drives it toward its desired state against a cloud provider, or runs
//! the reverse direction and imports resources that already exist
//! upstream.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                External runner                   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               converge-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │         Provider Abstraction              │   │
//! │  │  trait ResourceProvider { ... }           │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌───────────┐ ┌──────────┐ ┌──────────────┐   │
//! │  │ Transform │ │ Retry/LRO│ │ Diff/Discover│   │
//! │  └───────────┘ └──────────┘ └──────────────┘   │
//! └───────┬───────────┬───────────┬────────────────┘
//!         │           │           │
//! ┌───────▼───┐ ┌─────▼─────┐ ┌──▼────────────┐
//! │    aws    │ │ azure /   │ │ gcp /         │
//! │  adapter  │ │ entra     │ │ digitalocean  │
//! └───────────┘ └───────────┘ └───────────────┘
//! ```
//!
//! Data flows one way per invocation: adapter → payload transformer
//! (build request) → retry controller → transport → LRO poller (when the
//! provider answered asynchronously) → payload transformer (normalize
//! response) → result back to the caller.

pub mod component;
pub mod discovery;
pub mod error;
pub mod patch;
pub mod poll;
pub mod propmap;
pub mod prune;
pub mod provider;
pub mod result;
pub mod retry;
pub mod secrets;
pub mod transform;
pub mod transport;
pub mod value;

// Re-exports
pub use component::{Component, ProviderConfig, ResourceStatus, ResourceView, SiMetadata};
pub use discovery::{refinement_from_domain, refinement_matches, run_discovery, Candidate, Page};
pub use error::{CallError, CloudError, Result};
pub use patch::{compute_patch, default_atomic_sub_objects, AtomicSubObject};
pub use poll::{next_state, poll_operation, PollState, PollVerdict};
pub use propmap::{
    Discriminator, PayloadKind, PropUsageMap, ScalarPropertyMap, SecretUse, DEFAULT_SCALAR_KEYS,
};
pub use provider::ResourceProvider;
pub use result::{
    catch_discovery_error, catch_provider_error, ActionDelta, DiscoveryOps, DiscoveryResult,
    ImportProperties, ImportSpec, OperationResult, OperationStatus,
};
pub use retry::{with_retry, RetryPolicy, Sleeper, TokioSleeper};
pub use secrets::{SecretStore, StaticSecrets};
pub use transform::{
    clean_payload, inject_secrets, normalize_resource, project_domain,
};
pub use transport::{CliOutput, CliRunner, RestClient, RestResponse};
