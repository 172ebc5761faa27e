//! Resource provider trait definition

use crate::component::{Component, ProviderConfig};
use crate::error::Result;
use crate::result::{DiscoveryResult, OperationResult};
use async_trait::async_trait;

/// Cloud provider abstraction trait
///
/// All provider adapters (AWS CloudControl, Azure ARM, Microsoft Graph,
/// Google Cloud, DigitalOcean) implement this trait to expose the five
/// reconciliation verbs behind a uniform interface.
///
/// Each call is one independent, stateless unit of work: the adapter is
/// invoked once per requested operation and runs to completion or
/// failure. Configuration problems are hard errors; precondition
/// violations and terminal provider failures come back as error results
/// carrying the provider's own message and the best available payload.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Returns the provider name (e.g. "aws", "azure")
    fn name(&self) -> &str;

    /// Create the upstream resource described by the component's domain.
    async fn create(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult>;

    /// Read the current upstream state of an existing resource.
    async fn refresh(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult>;

    /// Drive an existing resource toward the component's desired state.
    async fn update(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult>;

    /// Delete an existing resource.
    async fn delete(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult>;

    /// List upstream resources matching the component's refinement and
    /// emit import operations for them.
    async fn discover(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<DiscoveryResult>;
}
