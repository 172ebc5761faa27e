//! Component model
//!
//! A component is the unit of reconciliation: the provider-agnostic record
//! of one infrastructure resource, carrying its desired state (`domain`)
//! and its last-known upstream state (`resource`).

use crate::error::{CloudError, Result};
use crate::propmap::{PropUsageMap, ScalarPropertyMap};
use crate::result::OperationResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Identity metadata for a component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiMetadata {
    /// Upstream identifier. Empty until the resource has been created.
    #[serde(default)]
    pub resource_id: Option<String>,

    pub name: String,
}

/// Health of the last-known upstream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Ok,
    Warning,
    Error,
}

/// Last-known upstream state of a component's resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceView {
    /// Raw normalized upstream object.
    pub payload: Value,

    pub status: ResourceStatus,
}

impl ResourceView {
    pub fn ok(payload: Value) -> Self {
        Self {
            payload,
            status: ResourceStatus::Ok,
        }
    }
}

/// The unit of reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Schema kind this component was authored from (e.g. the upstream
    /// resource type name).
    pub kind: String,

    pub si: SiMetadata,

    /// Desired-state attributes as understood by the generic model.
    pub domain: Value,

    /// Last-known upstream state; `None` before creation and after a
    /// successful delete.
    #[serde(default)]
    pub resource: Option<ResourceView>,

    /// Attribute sources (subscriptions to other components) keyed by
    /// `/domain/...` path, carried forward during discovery.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Component {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            si: SiMetadata {
                resource_id: None,
                name: name.into(),
            },
            domain: Value::Object(Default::default()),
            resource: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Precondition for create: no upstream resource may exist yet.
    ///
    /// Violations are reported as error results (with the existing payload
    /// attached) without any provider call being made.
    pub fn require_absent(&self) -> std::result::Result<(), OperationResult> {
        match &self.resource {
            Some(view) => Err(OperationResult::error(
                "Resource already exists",
                Some(view.payload.clone()),
            )),
            None => Ok(()),
        }
    }

    /// Precondition for update/delete/refresh: the upstream resource must
    /// exist and have an identifier.
    pub fn require_existing(
        &self,
        verb: &str,
    ) -> std::result::Result<(&ResourceView, &str), OperationResult> {
        let Some(resource) = &self.resource else {
            return Err(OperationResult::error(
                format!("Resource must exist to be {verb}"),
                None,
            ));
        };
        match self.si.resource_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => Ok((resource, id)),
            None => Err(OperationResult::error(
                format!("Resource has no identifier and cannot be {verb}"),
                Some(resource.payload.clone()),
            )),
        }
    }
}

/// Provider wiring for one component, constructed once at schema-load time
/// and passed explicitly to every adapter call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider resource type (e.g. `AWS::EC2::VPC`,
    /// `Microsoft.Network/virtualNetworks`, `droplets`).
    pub resource_type: String,

    pub region: Option<String>,
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,

    /// Provider endpoint or collection path, where the provider routes by
    /// URL rather than by type name.
    pub endpoint: Option<String>,

    pub api_version: Option<String>,

    pub prop_usage: PropUsageMap,
    pub scalar_props: ScalarPropertyMap,
}

impl ProviderConfig {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn require_region(&self) -> Result<&str> {
        self.region
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CloudError::Configuration("missing region".into()))
    }

    pub fn require_subscription_id(&self) -> Result<&str> {
        self.subscription_id
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CloudError::Configuration("missing subscription id".into()))
    }

    pub fn require_resource_group(&self) -> Result<&str> {
        self.resource_group
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CloudError::Configuration("missing resource group".into()))
    }

    pub fn require_endpoint(&self) -> Result<&str> {
        self.endpoint
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CloudError::Configuration("missing endpoint".into()))
    }

    pub fn require_api_version(&self) -> Result<&str> {
        self.api_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CloudError::Configuration("missing api version".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_precondition() {
        let mut component = Component::new("AWS::EC2::VPC", "vpc-main");
        assert!(component.require_absent().is_ok());

        component.resource = Some(ResourceView::ok(json!({"VpcId": "vpc-123"})));
        let result = component.require_absent().unwrap_err();
        assert_eq!(result.message.as_deref(), Some("Resource already exists"));
        assert_eq!(result.payload, Some(json!({"VpcId": "vpc-123"})));
    }

    #[test]
    fn test_existing_precondition() {
        let mut component = Component::new("AWS::EC2::VPC", "vpc-main");
        let result = component.require_existing("updated").unwrap_err();
        assert_eq!(
            result.message.as_deref(),
            Some("Resource must exist to be updated")
        );

        component.resource = Some(ResourceView::ok(json!({"VpcId": "vpc-123"})));
        component.si.resource_id = Some("vpc-123".into());
        let (view, id) = component.require_existing("updated").unwrap();
        assert_eq!(id, "vpc-123");
        assert_eq!(view.payload["VpcId"], "vpc-123");
    }

    #[test]
    fn test_config_requirements() {
        let config = ProviderConfig::new("AWS::EC2::VPC");
        assert!(config.require_region().is_err());

        let config = ProviderConfig {
            region: Some("us-east-1".into()),
            ..ProviderConfig::new("AWS::EC2::VPC")
        };
        assert_eq!(config.require_region().unwrap(), "us-east-1");
    }
}
