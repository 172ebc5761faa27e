//! Uniform operation results
//!
//! Every adapter verb returns the same shape: a status, the best available
//! upstream payload, and a human-readable message carrying the provider's
//! own error detail verbatim. Discovery returns a batch of component
//! creations plus action queue deltas.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Ok,
    Error,
}

/// Result of a single-resource verb (create, refresh, update, delete).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,

    /// Last-known upstream payload, attached on success and, when
    /// available, on failure too so the caller can reconcile its view of
    /// what upstream actually has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(rename = "resourceId", skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl OperationResult {
    pub fn ok(payload: Value) -> Self {
        Self {
            status: OperationStatus::Ok,
            payload: Some(payload),
            message: None,
            resource_id: None,
        }
    }

    pub fn ok_with_id(payload: Value, resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: Some(resource_id.into()),
            ..Self::ok(payload)
        }
    }

    /// Success with no remaining upstream state (delete).
    pub fn deleted() -> Self {
        Self {
            status: OperationStatus::Ok,
            payload: None,
            message: None,
            resource_id: None,
        }
    }

    pub fn error(message: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            status: OperationStatus::Error,
            payload,
            message: Some(message.into()),
            resource_id: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OperationStatus::Ok
    }
}

/// Convert a verb outcome into the uniform result shape.
///
/// Configuration errors stay hard failures; every other error becomes an
/// error result carrying the provider's message and the best available
/// payload.
pub fn catch_provider_error(
    outcome: Result<OperationResult>,
    fallback_payload: Option<&Value>,
) -> Result<OperationResult> {
    match outcome {
        Ok(result) => Ok(result),
        Err(CloudError::Configuration(message)) => Err(CloudError::Configuration(message)),
        Err(err) => Ok(OperationResult::error(
            err.to_string(),
            fallback_payload.cloned(),
        )),
    }
}

/// Follow-up action queue delta for one imported component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionDelta {
    #[serde(default)]
    pub add: Vec<String>,

    #[serde(default)]
    pub remove: Vec<String>,
}

/// Properties of a component emitted by discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportProperties {
    pub si: crate::component::SiMetadata,
    pub domain: Value,
    pub resource: crate::component::ResourceView,
}

/// One "create this component" operation emitted by discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSpec {
    pub kind: String,
    pub properties: ImportProperties,

    /// Attribute sources carried forward from the importing component,
    /// minus anything create-only (a pre-existing resource cannot have its
    /// immutable fields re-driven).
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

/// Batch operations emitted by discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryOps {
    pub create: BTreeMap<String, ImportSpec>,
    pub actions: BTreeMap<String, ActionDelta>,
}

/// Result of a discovery verb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub status: OperationStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub ops: DiscoveryOps,
}

impl DiscoveryResult {
    pub fn ok(message: impl Into<String>, ops: DiscoveryOps) -> Self {
        Self {
            status: OperationStatus::Ok,
            message: Some(message.into()),
            ops,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Error,
            message: Some(message.into()),
            ops: DiscoveryOps::default(),
        }
    }
}

/// Discovery analogue of [`catch_provider_error`].
pub fn catch_discovery_error(outcome: Result<DiscoveryResult>) -> Result<DiscoveryResult> {
    match outcome {
        Ok(result) => Ok(result),
        Err(CloudError::Configuration(message)) => Err(CloudError::Configuration(message)),
        Err(err) => Ok(DiscoveryResult::error(err.to_string())),
    }
}
