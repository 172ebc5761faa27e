//! DigitalOcean provider implementation
//!
//! The DigitalOcean API is synchronous from the reconciler's point of
//! view: mutations answer with the resource (in its envelope) and delete
//! answers 204. Listings paginate with `links.pages.next` URLs and carry
//! full objects, so discovery needs no per-item detail fetch. Inbound
//! normalization leans on the scalar property map (`region` → slug).

use crate::api::{next_page_url, unwrap_collection, unwrap_resource, DigitalOceanApi};
use crate::error::DigitalOceanError;
use async_trait::async_trait;
use converge_cloud::{
    catch_discovery_error, catch_provider_error, clean_payload, inject_secrets, run_discovery,
    with_retry, Candidate, CloudError, Component, DiscoveryResult, OperationResult, Page,
    PayloadKind, ProviderConfig, ResourceProvider, RestResponse, Result, RetryPolicy,
    SecretStore, Sleeper, TokioSleeper,
};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

/// DigitalOcean provider
pub struct DigitalOceanProvider {
    api: DigitalOceanApi,
    secrets: Arc<dyn SecretStore>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl DigitalOceanProvider {
    pub fn new(token: impl Into<String>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            api: DigitalOceanApi::new(token),
            secrets,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Build from `DIGITALOCEAN_TOKEN`.
    pub fn from_env(secrets: Arc<dyn SecretStore>) -> crate::error::Result<Self> {
        let token = std::env::var("DIGITALOCEAN_TOKEN")
            .map_err(|_| DigitalOceanError::MissingEnvVar("DIGITALOCEAN_TOKEN".into()))?;
        Ok(Self::new(token, secrets))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api = self.api.with_base_url(base_url);
        self
    }

    async fn call(
        &self,
        label: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RestResponse> {
        Ok(with_retry(&self.policy, self.sleeper.as_ref(), label, || {
            let method = method.clone();
            async move {
                self.api
                    .request(method, url, body)
                    .await?
                    .require_success()
            }
        })
        .await?)
    }

    fn resource_id_of(resource: &Value) -> Option<String> {
        match resource.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        }
    }

    async fn try_create(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<OperationResult> {
        let endpoint = config.require_endpoint()?;
        let usage = &config.prop_usage;

        let mut payload = clean_payload(&component.domain, usage, PayloadKind::Create)?;
        inject_secrets(&mut payload, usage, self.secrets.as_ref())?;

        tracing::info!("creating {} {}", endpoint, component.si.name);
        let url = self.api.collection_url(endpoint);
        let response = self
            .call("digitalocean create", Method::POST, &url, Some(&payload))
            .await?;
        let resource = unwrap_resource(&response.body.unwrap_or(Value::Null));

        let resource_id = Self::resource_id_of(&resource).ok_or_else(|| {
            CloudError::OperationFailed(format!("create response missing id: {resource}"))
        })?;
        Ok(OperationResult::ok_with_id(resource, resource_id))
    }

    async fn try_refresh(
        &self,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let endpoint = config.require_endpoint()?;

        let url = self.api.resource_url(endpoint, identifier);
        let response = self
            .call("digitalocean read", Method::GET, &url, None)
            .await?;
        let resource = unwrap_resource(&response.body.unwrap_or(Value::Null));
        Ok(OperationResult::ok_with_id(resource, identifier))
    }

    async fn try_update(
        &self,
        component: &Component,
        config: &ProviderConfig,
        identifier: &str,
    ) -> Result<OperationResult> {
        let endpoint = config.require_endpoint()?;
        let usage = &config.prop_usage;

        let mut payload = clean_payload(&component.domain, usage, PayloadKind::Update)?;
        inject_secrets(&mut payload, usage, self.secrets.as_ref())?;

        let url = self.api.resource_url(endpoint, identifier);
        let response = self
            .call("digitalocean update", Method::PUT, &url, Some(&payload))
            .await?;
        let resource = unwrap_resource(&response.body.unwrap_or(Value::Null));
        Ok(OperationResult::ok_with_id(resource, identifier))
    }

    async fn try_delete(&self, config: &ProviderConfig, identifier: &str) -> Result<OperationResult> {
        let endpoint = config.require_endpoint()?;

        tracing::info!("deleting {} {}", endpoint, identifier);
        let url = self.api.resource_url(endpoint, identifier);
        self.call("digitalocean delete", Method::DELETE, &url, None)
            .await?;
        Ok(OperationResult::deleted())
    }

    async fn try_discover(
        &self,
        component: &Component,
        config: &ProviderConfig,
    ) -> Result<DiscoveryResult> {
        let endpoint = config.require_endpoint()?;
        let collection_url = self.api.collection_url(endpoint);

        run_discovery(
            component,
            config,
            &[],
            |page| {
                let collection_url = collection_url.clone();
                async move {
                    let url = page.unwrap_or(collection_url);
                    let response = self
                        .call("digitalocean list", Method::GET, &url, None)
                        .await?;
                    let body = response.body.unwrap_or(Value::Null);
                    Ok(Page {
                        items: unwrap_collection(&body),
                        next: next_page_url(&body),
                    })
                }
            },
            // list items are full objects already
            |item| async move {
                let resource_id = Self::resource_id_of(&item).ok_or_else(|| {
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
impl ResourceProvider for DigitalOceanProvider {
    fn name(&self) -> &str {
        "digitalocean"
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
    use converge_cloud::{OperationStatus, ResourceView, ScalarPropertyMap, StaticSecrets};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> DigitalOceanProvider {
        DigitalOceanProvider::new("do-token", Arc::new(StaticSecrets::new()))
            .with_policy(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            })
            .with_base_url(server.uri())
    }

    fn config() -> ProviderConfig {
        ProviderConfig {
            endpoint: Some("droplets".into()),
            prop_usage: converge_cloud::PropUsageMap::parse(
                r#"{"createOnly": ["region", "image"], "updatable": ["name", "size"]}"#,
            ),
            scalar_props: ScalarPropertyMap::parse(r#"{"region": [], "size": ["slug"], "image": []}"#),
            ..ProviderConfig::new("droplets")
        }
    }

    #[tokio::test]
    async fn test_create_unwraps_the_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/droplets"))
            .and(body_json(json!({
                "name": "web-1",
                "region": "nyc1",
                "image": "ubuntu-24-04-x64",
                "size": "s-1vcpu-1gb",
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "droplet": {"id": 42, "name": "web-1", "status": "new"},
                "links": {},
            })))
            .mount(&server)
            .await;

        let mut component = Component::new("droplet", "web-1");
        component.domain = json!({
            "name": "web-1",
            "region": "nyc1",
            "image": "ubuntu-24-04-x64",
            "size": "s-1vcpu-1gb",
            "backups": null,
        });

        let result = provider(&server)
            .create(&component, &config())
            .await
            .unwrap();
        assert_eq!(result.status, OperationStatus::Ok);
        assert_eq!(result.resource_id.as_deref(), Some("42"));
        assert_eq!(result.payload.unwrap()["name"], "web-1");
    }

    #[tokio::test]
    async fn test_refresh_missing_resource_is_an_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/droplets/42"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                r#"{"id": "not_found", "message": "The resource you requested could not be found."}"#,
            ))
            .mount(&server)
            .await;

        let mut component = Component::new("droplet", "web-1");
        component.resource = Some(ResourceView::ok(json!({"id": 42})));
        component.si.resource_id = Some("42".into());

        let result = provider(&server)
            .refresh(&component, &config())
            .await
            .unwrap();
        assert_eq!(result.status, OperationStatus::Error);
        let message = result.message.unwrap();
        assert!(message.contains("404"));
        assert!(message.contains("not_found"));
        assert_eq!(result.payload, Some(json!({"id": 42})));
    }

    #[tokio::test]
    async fn test_rate_limited_calls_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/droplets/42"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/droplets/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "droplet": {"id": 42, "name": "web-1"},
            })))
            .mount(&server)
            .await;

        let mut component = Component::new("droplet", "web-1");
        component.resource = Some(ResourceView::ok(json!({"id": 42})));
        component.si.resource_id = Some("42".into());

        let result = provider(&server)
            .refresh(&component, &config())
            .await
            .unwrap();
        assert_eq!(result.status, OperationStatus::Ok);
        assert_eq!(result.payload.unwrap()["id"], 42);
    }

    #[tokio::test]
    async fn test_discovery_collapses_scalars_and_matches_refinement() {
        let server = MockServer::start().await;
        let page_two = format!("{}/droplets?page=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/droplets"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "droplets": [{
                    "id": 2,
                    "name": "web-2",
                    "region": {"slug": "sfo3", "name": "San Francisco 3"},
                    "size": {"slug": "s-1vcpu-1gb"},
                }],
                "links": {},
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/droplets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "droplets": [{
                    "id": 1,
                    "name": "web-1",
                    "region": {"slug": "nyc1", "name": "New York 1"},
                    "size": {"slug": "s-1vcpu-1gb"},
                }],
                "links": {"pages": {"next": page_two}},
            })))
            .mount(&server)
            .await;

        let mut component = Component::new("droplet", "web");
        component.domain = json!({"region": "nyc1"});

        let result = provider(&server)
            .discover(&component, &config())
            .await
            .unwrap();

        assert_eq!(result.status, OperationStatus::Ok);
        // region collapsed to its slug, so only the nyc1 droplet matches
        assert_eq!(result.ops.create.len(), 1);
        let imported = &result.ops.create["1"];
        assert_eq!(imported.properties.domain["region"], "nyc1");
        assert_eq!(imported.properties.si.name, "web-1");
        assert_eq!(result.ops.actions["1"].remove, vec!["create"]);
    }
}
