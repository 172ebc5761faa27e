//! OAuth2 client-credentials token acquisition
//!
//! Credentials come from the environment; the token lives for one
//! reconciliation, no caching.

use crate::error::{AzureError, Result};
use converge_cloud::RestClient;
use serde_json::Value;

pub const TOKEN_ENDPOINT_BASE: &str = "https://login.microsoftonline.com";

/// Scope granting access to Azure Resource Manager.
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

#[derive(Debug, Clone)]
pub struct AzureCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl AzureCredentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tenant_id: require_env("AZURE_TENANT_ID")?,
            client_id: require_env("AZURE_CLIENT_ID")?,
            client_secret: require_env("AZURE_CLIENT_SECRET")?,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| AzureError::MissingEnvVar(name.to_string()))
}

/// Acquire a bearer token via the client-credentials grant.
pub async fn acquire_token(
    rest: &RestClient,
    token_base: &str,
    credentials: &AzureCredentials,
    scope: &str,
) -> Result<String> {
    let url = format!("{token_base}/{}/oauth2/v2.0/token", credentials.tenant_id);
    let response = rest
        .post_form(
            &url,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &credentials.client_id),
                ("client_secret", &credentials.client_secret),
                ("scope", scope),
            ],
        )
        .await
        .map_err(|err| AzureError::Auth(err.to_string()))?;

    if !response.success() {
        return Err(AzureError::Auth(format!(
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
        .ok_or_else(|| AzureError::Auth("token response missing access_token".into()))
}
