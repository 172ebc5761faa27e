//! Entra provider implementation
//!
//! Graph mutations are mostly synchronous (create answers 201 with the
//! resource, update and delete answer 204); the occasional long-running
//! call follows the 202 + `Location` convention. Collection listings are
//! known-incomplete, so every import queues a refresh.

use crate::graph::{
    acquire_token, strip_odata_metadata, EntraCredentials, GraphClient, TOKEN_ENDPOINT_BASE,
};
use async_trait::async_trait;
use converge_cloud::{
    catch_discovery_error, catch_provider_error, clean_payload, inject_secrets, poll_operation,
    run_discovery, with_retry, Candidate, CloudError, Component, DiscoveryResult, OperationResult,
    Page, PayloadKind, PollVerdict, ProviderConfig, ResourceProvider, RestClient, Result,
    RetryPolicy, SecretStore, Sleeper, TokioSleeper,
};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

fn classify_operation(body: &Value) -> PollVerdict {
    match body.get("status").and_then(Value::as_str) {
        Some("failed") => PollVerdict::Failed(
            body.pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("operation failed")
                .to_string(),
        ),
        Some("cancelled") => PollVerdict::Cancelled("Operation cancelled by Microsoft Graph.".into()),
        Some("succeeded") | Some("completed") => PollVerdict::Complete,
        _ => PollVerdict::Pending,
    }
}

/// Microsoft Entra provider
pub struct EntraProvider {
    credentials: EntraCredentials,
    secrets: Arc<dyn SecretStore>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    rest: RestClient,
    graph_base: String,
    token_base: String,
}

impl EntraProvider {
    pub fn new(credentials: EntraCredentials, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            credentials,
            secrets,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            rest: RestClient::new(),
            graph_base: crate::graph::GRAPH_API_BASE.to_string(),
            token_base: TOKEN_ENDPOINT_BASE.to_string(),
        }
    }

    /// Build from `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` /
    /// `AZURE_CLIENT_SECRET`.
    pub fn from_env(secrets: Arc<dyn SecretStore>) -> crate::error::Result<Self> {
        Ok(Self::new(EntraCredentials::from_env()?, secrets))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_graph_base(mut self, base_url: impl Into<String>) -> Self {
        self.graph_base = base_url.into();
        self
    }

    pub fn with_token_base(mut self, base_url: impl Into<String>) -> Self {
        self.token_base = base_url.into();
        self
    }

    async fn graph(&self) -> Result<GraphClient> {
        let token = acquire_token(&self.rest, &self.token_base, &self.credentials)
            .await
            .map_err(CloudError::from)?;
        Ok(GraphClient::new(token).with_base_url(self.graph_base.clone()))
    }

    async fn call(
        &self,
        graph: &GraphClient,
        label: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<converge_cloud::RestResponse> {
        Ok(with_retry(&self.policy, self.sleeper.as_ref(), label, || {
            let method = method.clone();
            async move { graph.request(method, url, body).await?.require_success() }
        })
        .await?)
    }

    /// Follow a 202 `Location` operation to its terminal status.
    async fn poll_location(&self, graph: &GraphClient, location: &str) -> Result<Value> {
        poll_operation(
            &self.policy,
            self.sleeper.as_ref(),
            "entra operation status",
            || async {
                let response = graph.request(Method::GET, location, None).await?;
                if response.status >= 400 {
                    return Err(response.into_call_error());
                }
                if response.status == 202 {
                    return Ok(json!({"status": "inProgress"}));
                }
                Ok(response.body.unwrap_or_else(|| json!({"status": "succeeded"})))
            },
            classify_operation,
        )
        .await
    }

    async fn read_resource(
        &self,
        graph: &GraphClient,
        endpoint: &str,
        id: &str,
    ) -> Result<Value> {
        let url = graph.resource_url(endpoint, id);
        let response = self.call(graph, "entra read", Method::GET, &url, None).await?;
        let mut body = response.body.unwrap_or(Value::Null);
        strip_odata_metadata(&mut body);
        Ok(body)
    }

    async fn try_create(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult> {
        let graph = self.graph().await?;
        let endpoint = config.require_endpoint()?;
        let usage = &config.prop_usage;

        let mut payload = clean_payload(&component.domain, usage, PayloadKind::Create)?;
        inject_secrets(&mut payload, usage, self.secrets.as_ref())?;

        tracing::info!("creating {} {}", endpoint, component.si.name);
        let url = graph.collection_url(endpoint);
        let response = self
            .call(&graph, "entra create", Method::POST, &url, Some(&payload))
            .await?;

        if response.status == 202 {
            let location = response.location.clone().ok_or_else(|| {
                CloudError::OperationFailed("202 Accepted without a Location header".into())
            })?;
            self.poll_location(&graph, &location).await?;
        }

        let mut body = response.body.unwrap_or(Value::Null);
        strip_odata_metadata(&mut body);

        let resource_id = body
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                CloudError::OperationFailed(format!("create response missing id: {body}"))
            })?;

        // Graph create responses can be partial; read the resource back
        let payload = self.read_resource(&graph, endpoint, &resource_id).await?;
        Ok(OperationResult::ok_with_id(payload, resource_id))
    }

    async fn try_refresh(
        &self,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let graph = self.graph().await?;
        let endpoint = config.require_endpoint()?;
        let payload = self.read_resource(&graph, endpoint, identifier).await?;
        Ok(OperationResult::ok_with_id(payload, identifier))
    }

    async fn try_update(
        &self,
        component: &Component,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let graph = self.graph().await?;
        let endpoint = config.require_endpoint()?;
        let usage = &config.prop_usage;

        let mut payload = clean_payload(&component.domain, usage, PayloadKind::Update)?;
        inject_secrets(&mut payload, usage, self.secrets.as_ref())?;

        let url = graph.resource_url(endpoint, identifier);
        let response = self
            .call(&graph, "entra update", Method::PATCH, &url, Some(&payload))
            .await?;

        if response.status == 202 {
            let location = response.location.clone().ok_or_else(|| {
                CloudError::OperationFailed("202 Accepted without a Location header".into())
            })?;
            self.poll_location(&graph, &location).await?;
        }

        // PATCH answers 204 No Content; the fresh state needs a read
        let payload = self.read_resource(&graph, endpoint, identifier).await?;
        Ok(OperationResult::ok_with_id(payload, identifier))
    }

    async fn try_delete(
        &self,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let graph = self.graph().await?;
        let endpoint = config.require_endpoint()?;

        tracing::info!("deleting {} {}", endpoint, identifier);
        let url = graph.resource_url(endpoint, identifier);
        let response = self
            .call(&graph, "entra delete", Method::DELETE, &url, None)
            .await?;

        if response.status == 202 {
            let location = response.location.clone().ok_or_else(|| {
                CloudError::OperationFailed("202 Accepted without a Location header".into())
            })?;
            self.poll_location(&graph, &location).await?;
        }

        Ok(OperationResult::deleted())
    }

    async fn try_discover(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<DiscoveryResult> {
        let graph = self.graph().await?;
        let endpoint = config.require_endpoint()?.to_string();
        let collection_url = graph.collection_url(&endpoint);

        run_discovery(
            component,
            config,
            &["refresh"],
            |token| {
                let graph = &graph;
                let collection_url = collection_url.clone();
                async move {
                    let url = token.unwrap_or(collection_url);
                    let response = self
                        .call(graph, "entra list", Method::GET, &url, None)
                        .await?;
                    let body = response.body.unwrap_or(Value::Null);
                    let items = body
                        .get("value")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    let next = body
                        .get("@odata.nextLink")
                        .and_then(Value::as_str)
                        .map(String::from);
                    Ok(Page { items, next })
                }
            },
            // list items are partial; fetch the full object
            |item| {
                let graph = &graph;
                let endpoint = endpoint.clone();
                async move {
                    let resource_id = item
                        .get("id")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .ok_or_else(|| {
                            CloudError::OperationFailed(format!("list item missing id: {item}"))
                        })?;
                    let resource = self.read_resource(graph, &endpoint, &resource_id).await?;
                    Ok(Candidate {
                        resource_id,
                        resource,
                    })
                }
            },
        )
        .await
    }
}

#[async_trait]
impl ResourceProvider for EntraProvider {
    fn name(&self) -> &str {
        "entra"
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
