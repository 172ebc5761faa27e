//! Google Cloud provider implementation
//!
//! The endpoint in the provider configuration is the full collection URL
//! (e.g. `https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances`).
//! Google APIs answer mutations either with the resource itself or with
//! an operation body (recognized by a `kind` containing `operation` or a
//! `name` containing `operations`) that is polled until `done`.

use crate::auth::GcloudAuth;
use async_trait::async_trait;
use converge_cloud::{
    catch_discovery_error, catch_provider_error, clean_payload, inject_secrets, poll_operation,
    run_discovery, with_retry, Candidate, CloudError, Component, DiscoveryResult, OperationResult,
    Page, PayloadKind, PollVerdict, ProviderConfig, ResourceProvider, RestClient, RestResponse,
    Result, RetryPolicy, SecretStore, Sleeper, TokioSleeper,
};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

/// Whether a response body is an operation handle rather than the
/// resource itself.
pub fn is_operation(body: &Value) -> bool {
    let kind_says_so = body
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.to_ascii_lowercase().contains("operation"));
    let name_says_so = body
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| name.contains("operations"));
    kind_says_so || name_says_so
}

fn classify_operation(body: &Value) -> PollVerdict {
    let done = body.get("done").and_then(Value::as_bool).unwrap_or(false)
        || body.get("status").and_then(Value::as_str) == Some("DONE");
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        return PollVerdict::Failed(message);
    }
    if done {
        PollVerdict::Complete
    } else {
        PollVerdict::Pending
    }
}

/// Google Cloud provider
pub struct GcpProvider {
    auth: GcloudAuth,
    secrets: Arc<dyn SecretStore>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    rest: RestClient,
    access_token: Option<String>,
}

impl GcpProvider {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            auth: GcloudAuth::new(),
            secrets,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            rest: RestClient::new(),
            access_token: None,
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

    /// Use a pre-acquired token instead of driving gcloud (tests, or a
    /// runner that manages tokens itself).
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    async fn token(&self) -> Result<String> {
        match &self.access_token {
            Some(token) => Ok(token.clone()),
            None => Ok(self.auth.access_token().await.map_err(CloudError::from)?),
        }
    }

    async fn call(
        &self,
        token: &str,
        label: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RestResponse> {
        Ok(with_retry(&self.policy, self.sleeper.as_ref(), label, || {
            let method = method.clone();
            async move {
                self.rest
                    .send(method, url, Some(token), body)
                    .await?
                    .require_success()
            }
        })
        .await?)
    }

    /// Poll an operation body to completion and return the target
    /// resource it materialized (when the operation names one).
    async fn drive_operation(&self, token: &str, operation: Value) -> Result<Option<Value>> {
        let self_link = operation
            .get("selfLink")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                CloudError::OperationFailed(format!(
                    "operation without a selfLink cannot be polled: {operation}"
                ))
            })?;

        let final_body = poll_operation(
            &self.policy,
            self.sleeper.as_ref(),
            "gcp operation status",
            || async {
                self.rest
                    .send(Method::GET, &self_link, Some(token), None)
                    .await?
                    .require_success()
                    .map(|response| response.body.unwrap_or(Value::Null))
            },
            classify_operation,
        )
        .await?;

        let target = final_body
            .get("targetLink")
            .and_then(Value::as_str)
            .or_else(|| operation.get("targetLink").and_then(Value::as_str));
        match target {
            Some(target_link) => {
                let read = self
                    .call(token, "gcp read target", Method::GET, target_link, None)
                    .await?;
                Ok(Some(read.body.unwrap_or(Value::Null)))
            }
            None => Ok(None),
        }
    }

    fn resource_url(endpoint: &str, identifier: &str) -> String {
        format!("{}/{}", endpoint.trim_end_matches('/'), identifier)
    }

    async fn try_create(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult> {
        let endpoint = config.require_endpoint()?;
        let token = self.token().await?;
        let usage = &config.prop_usage;

        let mut payload = clean_payload(&component.domain, usage, PayloadKind::Create)?;
        inject_secrets(&mut payload, usage, self.secrets.as_ref())?;

        tracing::info!("creating {} {}", config.resource_type, component.si.name);
        let response = self
            .call(&token, "gcp create", Method::POST, endpoint, Some(&payload))
            .await?;
        let body = response.body.unwrap_or(Value::Null);

        let resource = if is_operation(&body) {
            match self.drive_operation(&token, body).await? {
                Some(resource) => resource,
                None => {
                    // operation finished without a target; read by name
                    let url = Self::resource_url(endpoint, &component.si.name);
                    let read = self.call(&token, "gcp read", Method::GET, &url, None).await?;
                    read.body.unwrap_or(Value::Null)
                }
            }
        } else {
            body
        };

        let resource_id = resource
            .get("name")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| resource.get("id").map(scalar_to_string))
            .unwrap_or_else(|| component.si.name.clone());
        Ok(OperationResult::ok_with_id(resource, resource_id))
    }

    async fn try_refresh(
        &self,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let endpoint = config.require_endpoint()?;
        let token = self.token().await?;

        let url = Self::resource_url(endpoint, identifier);
        let response = self.call(&token, "gcp read", Method::GET, &url, None).await?;
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
        let endpoint = config.require_endpoint()?;
        let token = self.token().await?;
        let usage = &config.prop_usage;

        let mut payload = clean_payload(&component.domain, usage, PayloadKind::Update)?;
        inject_secrets(&mut payload, usage, self.secrets.as_ref())?;

        let url = Self::resource_url(endpoint, identifier);
        let response = self
            .call(&token, "gcp update", Method::PATCH, &url, Some(&payload))
            .await?;
        let body = response.body.unwrap_or(Value::Null);

        if is_operation(&body) {
            self.drive_operation(&token, body).await?;
        }
        let read = self.call(&token, "gcp read", Method::GET, &url, None).await?;
        Ok(OperationResult::ok_with_id(
            read.body.unwrap_or(Value::Null),
            identifier,
        ))
    }

    async fn try_delete(
        &self,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let endpoint = config.require_endpoint()?;
        let token = self.token().await?;

        tracing::info!("deleting {} {}", config.resource_type, identifier);
        let url = Self::resource_url(endpoint, identifier);
        let response = self
            .call(&token, "gcp delete", Method::DELETE, &url, None)
            .await?;
        let body = response.body.unwrap_or(Value::Null);

        if is_operation(&body) {
            self.drive_operation(&token, body).await?;
        }
        Ok(OperationResult::deleted())
    }

    async fn try_discover(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<DiscoveryResult> {
        let endpoint = config.require_endpoint()?.to_string();
        let token = self.token().await?;

        run_discovery(
            component,
            config,
            &[],
            |page_token| {
                let endpoint = endpoint.clone();
                let token = token.clone();
                async move {
                    let url = match page_token {
                        Some(page_token) => format!("{endpoint}?pageToken={page_token}"),
                        None => endpoint,
                    };
                    let response = self
                        .call(&token, "gcp list", Method::GET, &url, None)
                        .await?;
                    let body = response.body.unwrap_or(Value::Null);
                    let items = body
                        .get("items")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    let next = body
                        .get("nextPageToken")
                        .and_then(Value::as_str)
                        .map(String::from);
                    Ok(Page { items, next })
                }
            },
            // list items carry full resource bodies
            |item| async move {
                let resource_id = item
                    .get("name")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .or_else(|| item.get("id").map(scalar_to_string))
                    .ok_or_else(|| {
                        CloudError::OperationFailed(format!(
                            "list item missing name and id: {item}"
                        ))
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

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ResourceProvider for GcpProvider {
    fn name(&self) -> &str {
        "gcp"
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
