//! AWS CloudControl provider implementation
//!
//! Every mutating verb is asynchronous upstream: the CLI answers with a
//! progress event whose request token is polled to a terminal status, and
//! a successful mutation is followed by a fresh read so the returned
//! payload reflects what AWS actually materialized.

use crate::cloudcontrol::{parse_properties, CloudControlCli};
use async_trait::async_trait;
use converge_cloud::{
    catch_discovery_error, catch_provider_error, clean_payload, compute_patch,
    default_atomic_sub_objects, inject_secrets, poll_operation, run_discovery, with_retry,
    AtomicSubObject, Candidate, CloudError, Component, DiscoveryResult, OperationResult, Page,
    PayloadKind, PollVerdict, ProviderConfig, ResourceProvider, Result, RetryPolicy, SecretStore,
    Sleeper, TokioSleeper,
};
use serde_json::Value;
use std::sync::Arc;

/// Properties CloudControl reports as strings even though the schema
/// types them as integers, keyed by resource type. Patches must not flip
/// the scalar type, and returned payloads are parsed back to numbers.
#[derive(Debug, Clone)]
pub struct StringTypedProps {
    pub resource_type: String,
    pub properties: Vec<String>,
}

pub fn default_string_typed_props() -> Vec<StringTypedProps> {
    vec![StringTypedProps {
        resource_type: "AWS::AutoScaling::AutoScalingGroup".into(),
        properties: vec![
            "MaxSize".into(),
            "MinSize".into(),
            "Cooldown".into(),
            "DesiredCapacity".into(),
        ],
    }]
}

fn classify_progress(body: &Value) -> PollVerdict {
    match body
        .pointer("/ProgressEvent/OperationStatus")
        .and_then(Value::as_str)
    {
        Some("FAILED") => PollVerdict::Failed(
            body.pointer("/ProgressEvent/StatusMessage")
                .and_then(Value::as_str)
                .or_else(|| {
                    body.pointer("/ProgressEvent/ErrorCode")
                        .and_then(Value::as_str)
                })
                .unwrap_or("operation failed")
                .to_string(),
        ),
        Some("CANCEL_COMPLETE") => {
            PollVerdict::Cancelled("Operation Canceled by API or AWS.".into())
        }
        Some("SUCCESS") => PollVerdict::Complete,
        _ => PollVerdict::Pending,
    }
}

/// AWS CloudControl provider
pub struct AwsCloudControlProvider {
    secrets: Arc<dyn SecretStore>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    atomics: Vec<AtomicSubObject>,
    string_typed: Vec<StringTypedProps>,
}

impl AwsCloudControlProvider {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            secrets,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            atomics: default_atomic_sub_objects(),
            string_typed: default_string_typed_props(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_atomic_sub_objects(mut self, rows: Vec<AtomicSubObject>) -> Self {
        self.atomics = rows;
        self
    }

    fn cli(&self, config: &ProviderConfig) -> Result<CloudControlCli> {
        Ok(CloudControlCli::new(config.require_region()?))
    }

    fn string_typed_for(&self, resource_type: &str) -> &[String] {
        self.string_typed
            .iter()
            .find(|row| row.resource_type == resource_type)
            .map(|row| row.properties.as_slice())
            .unwrap_or(&[])
    }

    /// Match the desired value's scalar type to what AWS reported, so the
    /// patch never flips a string to a number.
    fn align_string_typed(&self, desired: &mut Value, current: &Value, resource_type: &str) {
        for prop in self.string_typed_for(resource_type) {
            let desired_is_number = desired.get(prop).is_some_and(Value::is_number);
            let current_is_string = current.get(prop).is_some_and(Value::is_string);
            if desired_is_number && current_is_string {
                let as_string = desired[prop.as_str()].to_string();
                desired[prop.as_str()] = Value::String(as_string);
            }
        }
    }

    /// Parse numeric strings in a returned payload back to numbers.
    fn coerce_string_typed(&self, payload: &mut Value, resource_type: &str) {
        for prop in self.string_typed_for(resource_type) {
            if let Some(Value::String(raw)) = payload.get(prop) {
                if let Ok(parsed) = raw.parse::<i64>() {
                    payload[prop.as_str()] = Value::Number(parsed.into());
                }
            }
        }
    }

    fn request_token(progress: &Value) -> Result<String> {
        progress
            .pointer("/ProgressEvent/RequestToken")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                CloudError::OperationFailed(format!(
                    "missing request token in progress event: {progress}"
                ))
            })
    }

    async fn drive_to_completion(&self, cli: &CloudControlCli, token: &str) -> Result<Value> {
        poll_operation(
            &self.policy,
            self.sleeper.as_ref(),
            "aws request status",
            || cli.request_status(token),
            classify_progress,
        )
        .await
    }

    async fn read_payload(
        &self,
        cli: &CloudControlCli,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<Value> {
        let response = with_retry(
            &self.policy,
            self.sleeper.as_ref(),
            "aws get-resource",
            || cli.get_resource(&config.resource_type, identifier),
        )
        .await?;
        let mut payload = parse_properties(&response)?;
        self.coerce_string_typed(&mut payload, &config.resource_type);
        Ok(payload)
    }

    async fn try_create(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult> {
        let cli = self.cli(config)?;
        let usage = &config.prop_usage;

        let mut desired = clean_payload(&component.domain, usage, PayloadKind::Create)?;
        inject_secrets(&mut desired, usage, self.secrets.as_ref())?;

        let progress = with_retry(
            &self.policy,
            self.sleeper.as_ref(),
            "aws create-resource",
            || cli.create_resource(&config.resource_type, &desired),
        )
        .await?;
        let token = Self::request_token(&progress)?;

        tracing::info!(
            "created {} via CloudControl, polling request token",
            config.resource_type
        );
        let final_event = self.drive_to_completion(&cli, &token).await?;

        let identifier = final_event
            .pointer("/ProgressEvent/Identifier")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                CloudError::OperationFailed(format!(
                    "create finished without an identifier: {final_event}"
                ))
            })?;

        let payload = self.read_payload(&cli, config, &identifier).await?;
        Ok(OperationResult::ok_with_id(payload, identifier))
    }

    async fn try_refresh(
        &self,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let cli = self.cli(config)?;
        let payload = self.read_payload(&cli, config, identifier).await?;
        Ok(OperationResult::ok_with_id(payload, identifier))
    }

    async fn try_update(
        &self,
        component: &Component,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let cli = self.cli(config)?;
        let usage = &config.prop_usage;

        // fetch fresh state immediately before patching
        let current = self.read_payload(&cli, config, identifier).await?;

        let mut desired = clean_payload(&component.domain, usage, PayloadKind::Update)?;
        inject_secrets(&mut desired, usage, self.secrets.as_ref())?;
        self.align_string_typed(&mut desired, &current, &config.resource_type);

        let patch = compute_patch(&current, &desired, &config.resource_type, &self.atomics)?;
        if patch.0.is_empty() {
            tracing::info!("{identifier}: upstream already matches, nothing to patch");
            return Ok(OperationResult::ok_with_id(current, identifier));
        }
        let patch_document = serde_json::to_string(&patch)?;
        tracing::info!("{identifier}: applying patch {patch_document}");

        let progress = with_retry(
            &self.policy,
            self.sleeper.as_ref(),
            "aws update-resource",
            || cli.update_resource(&config.resource_type, identifier, &patch_document),
        )
        .await?;
        let token = Self::request_token(&progress)?;
        let final_event = self.drive_to_completion(&cli, &token).await?;

        let updated_id = final_event
            .pointer("/ProgressEvent/Identifier")
            .and_then(Value::as_str)
            .unwrap_or(identifier)
            .to_string();

        let payload = self.read_payload(&cli, config, &updated_id).await?;
        Ok(OperationResult::ok_with_id(payload, updated_id))
    }

    async fn try_delete(
        &self,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let cli = self.cli(config)?;

        let progress = with_retry(
            &self.policy,
            self.sleeper.as_ref(),
            "aws delete-resource",
            || cli.delete_resource(&config.resource_type, identifier),
        )
        .await?;
        let token = Self::request_token(&progress)?;
        self.drive_to_completion(&cli, &token).await?;

        Ok(OperationResult::deleted())
    }

    async fn try_discover(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<DiscoveryResult> {
        let cli = self.cli(config)?;
        let type_name = config.resource_type.as_str();

        // CloudControl list responses are known-incomplete, so every
        // import also queues a refresh.
        run_discovery(
            component,
            config,
            &["refresh"],
            |token| {
                let cli = &cli;
                async move {
                    let body = with_retry(
                        &self.policy,
                        self.sleeper.as_ref(),
                        "aws list-resources",
                        || cli.list_resources(type_name, token.as_deref()),
                    )
                    .await?;
                    let items = body
                        .get("ResourceDescriptions")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    let next = body
                        .get("NextToken")
                        .and_then(Value::as_str)
                        .map(String::from);
                    Ok(Page { items, next })
                }
            },
            |item| {
                let cli = &cli;
                async move {
                    let identifier = item
                        .get("Identifier")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .ok_or_else(|| {
                            CloudError::OperationFailed(format!(
                                "list item missing Identifier: {item}"
                            ))
                        })?;
                    let response = with_retry(
                        &self.policy,
                        self.sleeper.as_ref(),
                        "aws get-resource",
                        || cli.get_resource(type_name, &identifier),
                    )
                    .await?;
                    let resource = parse_properties(&response)?;
                    Ok(Candidate {
                        resource_id: identifier,
                        resource,
                    })
                }
            },
        )
        .await
    }
}

#[async_trait]
impl ResourceProvider for AwsCloudControlProvider {
    fn name(&self) -> &str {
        "aws"
    }

    async fn create(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult> {
        if let Err(result) = component.require_absent() {
            return Ok(result);
        }
        catch_provider_error(self.try_create(component, config).await, None)
    }

    async fn refresh(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult> {
        let (view, identifier) = match component.require_existing("refreshed") {
            Ok(existing) => existing,
            Err(result) => return Ok(result),
        };
        catch_provider_error(
            self.try_refresh(config, identifier).await,
            Some(&view.payload),
        )
    }

    async fn update(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult> {
        let (view, identifier) = match component.require_existing("updated") {
            Ok(existing) => existing,
            Err(result) => return Ok(result),
        };
        catch_provider_error(
            self.try_update(component, config, identifier).await,
            Some(&view.payload),
        )
    }

    async fn delete(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult> {
        let (view, identifier) = match component.require_existing("deleted") {
            Ok(existing) => existing,
            Err(result) => return Ok(result),
        };
        catch_provider_error(
            self.try_delete(config, identifier).await,
            Some(&view.payload),
        )
    }

    async fn discover(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<DiscoveryResult> {
        catch_discovery_error(self.try_discover(component, config).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_cloud::{OperationStatus, ResourceView, StaticSecrets};
    use serde_json::json;

    fn provider() -> AwsCloudControlProvider {
        AwsCloudControlProvider::new(Arc::new(StaticSecrets::new()))
    }

    #[tokio::test]
    async fn test_create_with_existing_resource_never_calls_aws() {
        let mut component = Component::new("AWS::EC2::VPC", "vpc-main");
        component.resource = Some(ResourceView::ok(json!({"VpcId": "vpc-123"})));
        let config = ProviderConfig {
            region: Some("us-east-1".into()),
            ..ProviderConfig::new("AWS::EC2::VPC")
        };

        let result = provider().create(&component, &config).await.unwrap();
        assert_eq!(result.status, OperationStatus::Error);
        assert_eq!(result.message.as_deref(), Some("Resource already exists"));
        assert_eq!(result.payload, Some(json!({"VpcId": "vpc-123"})));
    }

    #[tokio::test]
    async fn test_update_without_resource_is_a_precondition_error() {
        let component = Component::new("AWS::EC2::VPC", "vpc-main");
        let config = ProviderConfig {
            region: Some("us-east-1".into()),
            ..ProviderConfig::new("AWS::EC2::VPC")
        };

        let result = provider().update(&component, &config).await.unwrap();
        assert_eq!(result.status, OperationStatus::Error);
        assert_eq!(
            result.message.as_deref(),
            Some("Resource must exist to be updated")
        );
    }

    #[tokio::test]
    async fn test_missing_region_is_a_configuration_error() {
        let component = Component::new("AWS::EC2::VPC", "vpc-main");
        let config = ProviderConfig::new("AWS::EC2::VPC");

        let outcome = provider().create(&component, &config).await;
        assert!(matches!(outcome, Err(CloudError::Configuration(_))));
    }

    #[test]
    fn test_progress_classification() {
        let success = json!({"ProgressEvent": {"OperationStatus": "SUCCESS", "Identifier": "i"}});
        assert!(matches!(classify_progress(&success), PollVerdict::Complete));

        let failed = json!({"ProgressEvent": {
            "OperationStatus": "FAILED",
            "StatusMessage": "rate exceeded for bucket",
        }});
        match classify_progress(&failed) {
            PollVerdict::Failed(message) => assert_eq!(message, "rate exceeded for bucket"),
            other => panic!("expected Failed, got {other:?}"),
        }

        let cancelled = json!({"ProgressEvent": {"OperationStatus": "CANCEL_COMPLETE"}});
        match classify_progress(&cancelled) {
            PollVerdict::Cancelled(message) => {
                assert_eq!(message, "Operation Canceled by API or AWS.");
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }

        let pending = json!({"ProgressEvent": {"OperationStatus": "IN_PROGRESS"}});
        assert!(matches!(classify_progress(&pending), PollVerdict::Pending));
    }

    #[test]
    fn test_string_typed_alignment() {
        let provider = provider();
        let current = json!({"MaxSize": "4", "MinSize": "1"});
        let mut desired = json!({"MaxSize": 6});
        provider.align_string_typed(
            &mut desired,
            &current,
            "AWS::AutoScaling::AutoScalingGroup",
        );
        assert_eq!(desired, json!({"MaxSize": "6"}));

        // other resource types keep their scalar types
        let mut desired = json!({"MaxSize": 6});
        provider.align_string_typed(&mut desired, &current, "AWS::EC2::VPC");
        assert_eq!(desired, json!({"MaxSize": 6}));
    }

    #[test]
    fn test_string_typed_coercion_on_returned_payload() {
        let provider = provider();
        let mut payload = json!({"MaxSize": "6", "Name": "asg-main"});
        provider.coerce_string_typed(&mut payload, "AWS::AutoScaling::AutoScalingGroup");
        assert_eq!(payload, json!({"MaxSize": 6, "Name": "asg-main"}));
    }
}
