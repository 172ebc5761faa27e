//! Azure provider implementation
//!
//! ARM accepts mutations synchronously or asynchronously at its own
//! discretion: a 202 with a `Location` header hands back an operation to
//! poll, and a 200/201 body may still carry a non-terminal
//! `provisioningState` that must be watched on the resource itself.

use crate::api::ArmClient;
use crate::auth::{acquire_token, AzureCredentials, ARM_SCOPE, TOKEN_ENDPOINT_BASE};
use async_trait::async_trait;
use converge_cloud::{
    catch_discovery_error, catch_provider_error, clean_payload, inject_secrets, poll_operation,
    run_discovery, value, with_retry, Candidate, CloudError, Component, DiscoveryResult,
    OperationResult, Page, PayloadKind, PollVerdict, ProviderConfig, ResourceProvider, RestClient,
    RestResponse, Result, RetryPolicy, SecretStore, Sleeper, TokioSleeper,
};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

fn provisioning_state(body: Option<&Value>) -> Option<&str> {
    body?
        .pointer("/properties/provisioningState")
        .and_then(Value::as_str)
}

fn classify_operation(body: &Value) -> PollVerdict {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/properties/provisioningState").and_then(Value::as_str));
    match status {
        Some("Failed") => PollVerdict::Failed(
            body.pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("operation failed")
                .to_string(),
        ),
        Some("Canceled") => PollVerdict::Cancelled("Operation canceled by Azure.".into()),
        Some("Succeeded") => PollVerdict::Complete,
        _ => PollVerdict::Pending,
    }
}

/// Azure Resource Manager provider
pub struct AzureProvider {
    credentials: AzureCredentials,
    secrets: Arc<dyn SecretStore>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    rest: RestClient,
    arm_base: String,
    token_base: String,
}

impl AzureProvider {
    pub fn new(credentials: AzureCredentials, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            credentials,
            secrets,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            rest: RestClient::new(),
            arm_base: crate::api::ARM_API_BASE.to_string(),
            token_base: TOKEN_ENDPOINT_BASE.to_string(),
        }
    }

    /// Build from `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` /
    /// `AZURE_CLIENT_SECRET`.
    pub fn from_env(secrets: Arc<dyn SecretStore>) -> crate::error::Result<Self> {
        Ok(Self::new(AzureCredentials::from_env()?, secrets))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_arm_base(mut self, base_url: impl Into<String>) -> Self {
        self.arm_base = base_url.into();
        self
    }

    pub fn with_token_base(mut self, base_url: impl Into<String>) -> Self {
        self.token_base = base_url.into();
        self
    }

    async fn arm(&self, config: &ProviderConfig) -> Result<ArmClient> {
        let subscription_id = config.require_subscription_id()?;
        let token = acquire_token(&self.rest, &self.token_base, &self.credentials, ARM_SCOPE)
            .await
            .map_err(CloudError::from)?;
        Ok(ArmClient::new(token, subscription_id).with_base_url(self.arm_base.clone()))
    }

    fn urls(&self, arm: &ArmClient, config: &ProviderConfig, name: &str) -> Result<(String, String)> {
        let resource_group = config.require_resource_group()?;
        let api_version = config.require_api_version()?;
        let resource = arm.resource_url(resource_group, &config.resource_type, name, api_version);
        let collection = arm.collection_url(resource_group, &config.resource_type, api_version);
        Ok((resource, collection))
    }

    async fn call(
        &self,
        arm: &ArmClient,
        label: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RestResponse> {
        Ok(with_retry(&self.policy, self.sleeper.as_ref(), label, || {
            let method = method.clone();
            async move { arm.request(method, url, body).await?.require_success() }
        })
        .await?)
    }

    /// Poll a `Location` operation URL until the operation body reaches a
    /// terminal status. A 202 while running has no useful body.
    async fn poll_location(&self, arm: &ArmClient, location: &str) -> Result<Value> {
        poll_operation(
            &self.policy,
            self.sleeper.as_ref(),
            "azure operation status",
            || async {
                let response = arm.request(Method::GET, location, None).await?;
                if response.status >= 400 {
                    return Err(response.into_call_error());
                }
                if response.status == 202 {
                    return Ok(json!({"status": "InProgress"}));
                }
                Ok(response.body.unwrap_or_else(|| json!({"status": "Succeeded"})))
            },
            classify_operation,
        )
        .await
    }

    /// Wait out whichever async convention the response used, then read
    /// the resource back.
    async fn await_completion(
        &self,
        arm: &ArmClient,
        response: RestResponse,
        resource_url: &str,
    ) -> Result<Value> {
        if response.status == 202 {
            let location = response.location.clone().ok_or_else(|| {
                CloudError::OperationFailed("202 Accepted without a Location header".into())
            })?;
            self.poll_location(arm, &location).await?;
        } else if let Some(state) = provisioning_state(response.body.as_ref()) {
            if state != "Succeeded" {
                poll_operation(
                    &self.policy,
                    self.sleeper.as_ref(),
                    "azure provisioning state",
                    || async {
                        arm.request(Method::GET, resource_url, None)
                            .await?
                            .require_success()
                            .map(|r| r.body.unwrap_or(Value::Null))
                    },
                    classify_operation,
                )
                .await?;
            }
        }

        let read = self
            .call(arm, "azure read", Method::GET, resource_url, None)
            .await?;
        Ok(read.body.unwrap_or(Value::Null))
    }

    async fn try_create(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult> {
        let arm = self.arm(config).await?;
        let (resource_url, _) = self.urls(&arm, config, &component.si.name)?;
        let usage = &config.prop_usage;

        let mut payload = clean_payload(&component.domain, usage, PayloadKind::Create)?;
        inject_secrets(&mut payload, usage, self.secrets.as_ref())?;
        // identity is in the URL
        let _ = value::remove_path(&mut payload, &["name"]);

        tracing::info!("creating {} {}", config.resource_type, component.si.name);
        let response = self
            .call(&arm, "azure create", Method::PUT, &resource_url, Some(&payload))
            .await?;
        let body = self.await_completion(&arm, response, &resource_url).await?;

        let resource_id = body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(&component.si.name)
            .to_string();
        Ok(OperationResult::ok_with_id(body, resource_id))
    }

    async fn try_refresh(
        &self,
        component: &Component,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let arm = self.arm(config).await?;
        let (resource_url, _) = self.urls(&arm, config, &component.si.name)?;

        let response = self
            .call(&arm, "azure read", Method::GET, &resource_url, None)
            .await?;
        Ok(OperationResult::ok_with_id(
            response.body.unwrap_or(Value::Null),
            identifier,
        ))
    }

    async fn try_update(
        &self,
        component: &Component,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let arm = self.arm(config).await?;
        let (resource_url, _) = self.urls(&arm, config, &component.si.name)?;
        let usage = &config.prop_usage;

        let mut payload = clean_payload(&component.domain, usage, PayloadKind::Update)?;
        inject_secrets(&mut payload, usage, self.secrets.as_ref())?;
        let _ = value::remove_path(&mut payload, &["name"]);

        let response = self
            .call(&arm, "azure update", Method::PATCH, &resource_url, Some(&payload))
            .await?;
        let body = self.await_completion(&arm, response, &resource_url).await?;
        Ok(OperationResult::ok_with_id(body, identifier))
    }

    async fn try_delete(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult> {
        let arm = self.arm(config).await?;
        let (resource_url, _) = self.urls(&arm, config, &component.si.name)?;

        tracing::info!("deleting {} {}", config.resource_type, component.si.name);
        let response = self
            .call(&arm, "azure delete", Method::DELETE, &resource_url, None)
            .await?;
        if response.status == 202 {
            let location = response.location.clone().ok_or_else(|| {
                CloudError::OperationFailed("202 Accepted without a Location header".into())
            })?;
            // deletion completes when the operation URL stops answering 202
            poll_operation(
                &self.policy,
                self.sleeper.as_ref(),
                "azure delete status",
                || async {
                    let response = arm.request(Method::GET, &location, None).await?;
                    match response.status {
                        202 => Ok(json!({"status": "InProgress"})),
                        204 | 404 => Ok(json!({"status": "Succeeded"})),
                        status if status >= 400 => Err(response.into_call_error()),
                        _ => Ok(response.body.unwrap_or_else(|| json!({"status": "Succeeded"}))),
                    }
                },
                classify_operation,
            )
            .await?;
        }

        Ok(OperationResult::deleted())
    }

    async fn try_discover(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<DiscoveryResult> {
        let arm = self.arm(config).await?;
        let (_, collection_url) = self.urls(&arm, config, &component.si.name)?;

        run_discovery(
            component,
            config,
            &[],
            |token| {
                let arm = &arm;
                let collection_url = collection_url.clone();
                async move {
                    let url = token.unwrap_or(collection_url);
                    let response = self
                        .call(arm, "azure list", Method::GET, &url, None)
                        .await?;
                    let body = response.body.unwrap_or(Value::Null);
                    let items = body
                        .get("value")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    let next = body
                        .get("nextLink")
                        .and_then(Value::as_str)
                        .map(String::from);
                    Ok(Page { items, next })
                }
            },
            // ARM list responses carry full resource bodies
            |item| async move {
                let resource_id = item
                    .get("id")
                    .and_then(Value::as_str)
                    .or_else(|| item.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .ok_or_else(|| {
                        CloudError::OperationFailed(format!("list item missing id: {item}"))
                    })?;
                Ok(Candidate {
                    resource_id,
                    resource: item,
                })
            },
        )
        .await
    }
}

#[async_trait]
impl ResourceProvider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
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
            self.try_refresh(component, config, identifier).await,
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
        let (view, _) = match component.require_existing("deleted") {
            Ok(existing) => existing,
            Err(result) => return Ok(result),
        };
        catch_provider_error(
            self.try_delete(component, config).await,
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
