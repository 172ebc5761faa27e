//! Azure Resource Manager API client
//!
//! Resource identity is encoded in the URL:
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{type}/{name}`,
//! always qualified by an api-version.

use converge_cloud::{CallError, RestClient, RestResponse};
use reqwest::Method;
use serde_json::Value;

pub const ARM_API_BASE: &str = "https://management.azure.com";

pub struct ArmClient {
    rest: RestClient,
    base_url: String,
    token: String,
    subscription_id: String,
}

impl ArmClient {
    pub fn new(token: impl Into<String>, subscription_id: impl Into<String>) -> Self {
        Self {
            rest: RestClient::new(),
            base_url: ARM_API_BASE.to_string(),
            token: token.into(),
            subscription_id: subscription_id.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn resource_url(
        &self,
        resource_group: &str,
        resource_type: &str,
        name: &str,
        api_version: &str,
    ) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/{}/{}?api-version={}",
            self.base_url, self.subscription_id, resource_group, resource_type, name, api_version
        )
    }

    pub fn collection_url(
        &self,
        resource_group: &str,
        resource_type: &str,
        api_version: &str,
    ) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/{}?api-version={}",
            self.base_url, self.subscription_id, resource_group, resource_type, api_version
        )
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RestResponse, CallError> {
        self.rest.send(method, url, Some(&self.token), body).await
    }
}
