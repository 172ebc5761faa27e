//! DigitalOcean API client
//!
//! Every response wraps its payload in an envelope keyed by the resource
//! name: `{"droplet": {...}}` for single resources,
//! `{"droplets": [...], "links": {...}, "meta": {...}}` for collections.

use converge_cloud::{CallError, RestClient, RestResponse};
use reqwest::Method;
use serde_json::Value;

pub const DO_API_BASE: &str = "https://api.digitalocean.com/v2";

const ENVELOPE_METADATA_KEYS: [&str; 2] = ["links", "meta"];

/// Pull the single resource out of a response envelope.
pub fn unwrap_resource(body: &Value) -> Value {
    let Some(map) = body.as_object() else {
        return body.clone();
    };
    map.iter()
        .find(|(key, value)| {
            !ENVELOPE_METADATA_KEYS.contains(&key.as_str()) && value.is_object()
        })
        .map(|(_, value)| value.clone())
        .unwrap_or_else(|| body.clone())
}

/// Pull the item array out of a collection envelope.
pub fn unwrap_collection(body: &Value) -> Vec<Value> {
    body.as_object()
        .and_then(|map| {
            map.iter()
                .find(|(key, value)| {
                    !ENVELOPE_METADATA_KEYS.contains(&key.as_str()) && value.is_array()
                })
                .and_then(|(_, value)| value.as_array().cloned())
        })
        .unwrap_or_default()
}

/// URL of the next collection page, when one exists.
pub fn next_page_url(body: &Value) -> Option<String> {
    body.pointer("/links/pages/next")
        .and_then(Value::as_str)
        .map(String::from)
}

pub struct DigitalOceanApi {
    rest: RestClient,
    base_url: String,
    token: String,
}

impl DigitalOceanApi {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            rest: RestClient::new(),
            base_url: DO_API_BASE.to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_unwrapping() {
        let single = json!({"droplet": {"id": 42, "name": "web-1"}});
        assert_eq!(unwrap_resource(&single), json!({"id": 42, "name": "web-1"}));

        let collection = json!({
            "droplets": [{"id": 1}, {"id": 2}],
            "links": {"pages": {"next": "https://api.digitalocean.com/v2/droplets?page=2"}},
            "meta": {"total": 5},
        });
        assert_eq!(unwrap_collection(&collection).len(), 2);
        assert_eq!(
            next_page_url(&collection).as_deref(),
            Some("https://api.digitalocean.com/v2/droplets?page=2")
        );
        assert_eq!(next_page_url(&single), None);
    }
}
