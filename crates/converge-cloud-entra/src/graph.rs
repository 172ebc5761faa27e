//! Microsoft Graph API client
//!
//! Entra resources live behind collection endpoints
//! (`/v1.0/applications`, `/v1.0/users`, ...); tokens come from the same
//! tenant token endpoint as ARM, with the Graph scope.

use crate::error::{EntraError, Result};
use converge_cloud::{CallError, RestClient, RestResponse};
use reqwest::Method;
use serde_json::Value;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
pub const TOKEN_ENDPOINT_BASE: &str = "https://login.microsoftonline.com";

/// Scope granting access to Microsoft Graph.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Clone)]
pub struct EntraCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl EntraCredentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tenant_id: require_env("AZURE_TENANT_ID")?,
            client_id: require_env("AZURE_CLIENT_ID")?,
            client_secret: require_env("AZURE_CLIENT_SECRET")?,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| EntraError::MissingEnvVar(name.to_string()))
}

/// Acquire a Graph bearer token via the client-credentials grant.
pub async fn acquire_token(
    rest: &RestClient,
    token_base: &str,
    credentials: &EntraCredentials,
) -> Result<String> {
    let url = format!("{token_base}/{}/oauth2/v2.0/token", credentials.tenant_id);
    let response = rest
        .post_form(
            &url,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &credentials.client_id),
                ("client_secret", &credentials.client_secret),
                ("scope", GRAPH_SCOPE),
            ],
        )
        .await
        .map_err(|err| EntraError::Auth(err.to_string()))?;

    if !response.success() {
        return Err(EntraError::Auth(format!(
            "token endpoint answered HTTP {}: {}",
            response.status,
            response.text.trim()
        )));
    }

    response
        .body
        .as_ref()
        .and_then(|body| body.get("access_token"))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| EntraError::Auth("token response missing access_token".into()))
}

pub struct GraphClient {
    rest: RestClient,
    base_url: String,
    token: String,
}

impl GraphClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            rest: RestClient::new(),
            base_url: GRAPH_API_BASE.to_string(),
            token: token.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn collection_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    pub fn resource_url(&self, endpoint: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, endpoint, id)
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> std::result::Result<RestResponse, CallError> {
        self.rest.send(method, url, Some(&self.token), body).await
    }
}

/// Drop OData control metadata (`@odata.context`, `@odata.etag`, ...):
/// server-generated, never part of the domain model.
pub fn strip_odata_metadata(value: &mut Value) {
    if let Some(map) = value.as_object_mut() {
        map.retain(|key, _| !key.starts_with("@odata."));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_construction() {
        let graph = GraphClient::new("tok");
        assert_eq!(
            graph.collection_url("applications"),
            "https://graph.microsoft.com/v1.0/applications"
        );
        assert_eq!(
            graph.resource_url("applications", "app-1"),
            "https://graph.microsoft.com/v1.0/applications/app-1"
        );
    }

    #[test]
    fn test_strip_odata_metadata() {
        let mut value = json!({
            "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#applications",
            "@odata.etag": "W/\"x\"",
            "id": "app-1",
            "displayName": "web",
        });
        strip_odata_metadata(&mut value);
        assert_eq!(value, json!({"id": "app-1", "displayName": "web"}));
    }
}
