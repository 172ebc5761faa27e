//! Discovery/import pipeline
//!
//! The reverse direction of reconciliation: list what already exists
//! upstream, normalize each candidate into domain shape, keep the ones
//! matching the importing component's refinement, and emit a batch of
//! component creations plus action queue deltas.

use crate::component::{Component, ProviderConfig, ResourceView, SiMetadata};
use crate::error::Result;
use crate::propmap::PropUsageMap;
use crate::prune::prune_or_empty;
use crate::result::{ActionDelta, DiscoveryOps, DiscoveryResult, ImportProperties, ImportSpec};
use crate::transform::{normalize_resource, project_domain};
use serde_json::Value;
use std::future::Future;

/// One page of upstream list results. `next` is the provider-shaped
/// continuation (token, `nextLink` URL, `@odata.nextLink`, page URL).
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Value>,
    pub next: Option<String>,
}

/// One listed resource resolved to its identifier and full detail.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub resource_id: String,
    pub resource: Value,
}

/// Build the refinement predicate from the importing component's domain:
/// the domain with blank and empty leaves removed.
pub fn refinement_from_domain(domain: &Value) -> Value {
    let mut refinement = domain.clone();
    strip_blank_strings(&mut refinement);
    prune_or_empty(refinement)
}

fn strip_blank_strings(value: &mut Value) {
    if matches!(value, Value::String(s) if s.trim().is_empty()) {
        *value = Value::Null;
        return;
    }
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                strip_blank_strings(child);
            }
        }
        Value::Array(items) => {
            for child in items {
                strip_blank_strings(child);
            }
        }
        _ => {}
    }
}

/// Whether a candidate's domain projection satisfies the refinement:
/// subset containment on objects, exact equality on scalars and arrays.
/// An empty refinement matches every candidate.
pub fn refinement_matches(refinement: &Value, candidate: &Value) -> bool {
    match refinement {
        Value::Object(expected) => {
            if expected.is_empty() {
                return true;
            }
            let Some(actual) = candidate.as_object() else {
                return false;
            };
            expected.iter().all(|(key, want)| {
                actual
                    .get(key)
                    .is_some_and(|have| refinement_matches(want, have))
            })
        }
        other => other == candidate,
    }
}

fn attribute_is_create_only(path: &str, usage: &PropUsageMap) -> bool {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some("domain"), Some(prop)) => usage.is_create_only(prop),
        _ => false,
    }
}

/// Drive one full discovery cycle.
///
/// All pages are accumulated before processing. A failed list call aborts
/// the discovery; a single candidate failing its detail fetch is warned
/// and skipped. `fetch_detail` receives each listed item and resolves it
/// to its identifier plus full resource (fetching upstream where the list
/// response is partial). `follow_up` names actions to queue for every
/// import besides removing `create` (providers with known-incomplete list
/// responses add `refresh`).
pub async fn run_discovery<L, LFut, D, DFut>(
    component: &Component,
    config: &ProviderConfig,
    follow_up: &[&str],
    mut list_page: L,
    mut fetch_detail: D,
) -> Result<DiscoveryResult>
where
    L: FnMut(Option<String>) -> LFut,
    LFut: Future<Output = Result<Page>>,
    D: FnMut(Value) -> DFut,
    DFut: Future<Output = Result<Candidate>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = list_page(token.take()).await?;
        items.extend(page.items);
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    let total = items.len();
    tracing::debug!("discovery listed {total} candidates");

    let refinement = refinement_from_domain(&component.domain);
    let usage = &config.prop_usage;

    let mut ops = DiscoveryOps::default();
    let mut skipped = 0usize;

    for item in items {
        let candidate = match fetch_detail(item).await {
            Ok(candidate) => candidate,
            Err(err) => {
                tracing::warn!("skipping candidate whose detail fetch failed: {err}");
                skipped += 1;
                continue;
            }
        };
        let resource_id = candidate.resource_id;

        let normalized = normalize_resource(&candidate.resource, &config.scalar_props, usage);

        let domain = project_domain(&normalized, usage, true);
        if !refinement_matches(&refinement, &domain) {
            continue;
        }

        let attributes = component
            .attributes
            .iter()
            .filter(|(path, _)| !attribute_is_create_only(path, usage))
            .map(|(path, source)| (path.clone(), source.clone()))
            .collect();

        let name = normalized
            .get("name")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| resource_id.clone());

        ops.create.insert(
            resource_id.clone(),
            ImportSpec {
                kind: component.kind.clone(),
                properties: ImportProperties {
                    si: SiMetadata {
                        resource_id: Some(resource_id.clone()),
                        name,
                    },
                    domain,
                    resource: ResourceView::ok(normalized),
                },
                attributes,
            },
        );
        ops.actions.insert(
            resource_id,
            ActionDelta {
                add: follow_up.iter().map(|s| s.to_string()).collect(),
                remove: vec!["create".to_string()],
            },
        );
    }

    let message = format!(
        "Imported {} of {total} candidates ({skipped} skipped)",
        ops.create.len()
    );
    Ok(DiscoveryResult::ok(message, ops))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use crate::propmap::ScalarPropertyMap;
    use crate::result::OperationStatus;
    use serde_json::json;

    #[test]
    fn test_refinement_containment() {
        assert!(refinement_matches(&json!({}), &json!({"a": 1})));
        assert!(refinement_matches(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!refinement_matches(&json!({"a": 1}), &json!({"a": 2})));
        assert!(refinement_matches(
            &json!({"tags": {"env": "prod"}}),
            &json!({"tags": {"env": "prod", "team": "infra"}, "x": 1})
        ));
        assert!(!refinement_matches(&json!({"a": [1, 2]}), &json!({"a": [1]})));
    }

    #[test]
    fn test_refinement_drops_blank_leaves() {
        let domain = json!({"name": "", "region": "nyc1", "tags": [], "spare": null});
        assert_eq!(refinement_from_domain(&domain), json!({"region": "nyc1"}));
    }

    fn test_component() -> Component {
        let mut component = Component::new("droplet", "web");
        component.domain = json!({});
        component
            .attributes
            .insert("/domain/region".into(), json!({"component": "net", "path": "/domain/slug"}));
        component
            .attributes
            .insert("/domain/image".into(), json!({"component": "base", "path": "/domain/id"}));
        component
    }

    fn test_config() -> ProviderConfig {
        let mut config = ProviderConfig::new("droplet");
        config.prop_usage = crate::propmap::PropUsageMap::parse(
            r#"{"createOnly": ["image"], "updatable": ["name", "region", "size"]}"#,
        );
        config.scalar_props = ScalarPropertyMap::default();
        config
    }

    #[tokio::test]
    async fn test_two_pages_with_one_failing_detail() {
        let component = test_component();
        let config = test_config();

        let pages = vec![
            Page {
                items: (1..=3).map(|n| json!({"id": n})).collect(),
                next: Some("page2".into()),
            },
            Page {
                items: (4..=6).map(|n| json!({"id": n})).collect(),
                next: None,
            },
        ];

        let result = run_discovery(
            &component,
            &config,
            &["refresh"],
            |token| {
                let page = match token.as_deref() {
                    None => pages[0].clone(),
                    Some("page2") => pages[1].clone(),
                    Some(other) => panic!("unexpected token {other}"),
                };
                async move { Ok(page) }
            },
            |item| async move {
                let id = item["id"].as_i64().unwrap();
                if id == 4 {
                    Err(CloudError::OperationFailed("detail fetch exploded".into()))
                } else {
                    Ok(Candidate {
                        resource_id: id.to_string(),
                        resource: json!({"id": id, "name": format!("web-{id}"), "region": "nyc1"}),
                    })
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(result.status, OperationStatus::Ok);
        assert_eq!(result.ops.create.len(), 5);
        assert!(!result.ops.create.contains_key("4"));

        let actions = &result.ops.actions["1"];
        assert_eq!(actions.remove, vec!["create"]);
        assert_eq!(actions.add, vec!["refresh"]);

        let imported = &result.ops.create["2"];
        assert_eq!(imported.kind, "droplet");
        assert_eq!(imported.properties.si.name, "web-2");
        assert_eq!(imported.properties.domain, json!({"name": "web-2", "region": "nyc1"}));
        // create-only attribute sources are not carried forward
        assert!(imported.attributes.contains_key("/domain/region"));
        assert!(!imported.attributes.contains_key("/domain/image"));
    }

    #[tokio::test]
    async fn test_refinement_filters_candidates() {
        let mut component = test_component();
        component.domain = json!({"region": "nyc1"});
        let config = test_config();

        let result = run_discovery(
            &component,
            &config,
            &[],
            |_| async {
                Ok(Page {
                    items: vec![
                        json!({"id": 1, "region": "nyc1"}),
                        json!({"id": 2, "region": "sfo3"}),
                    ],
                    next: None,
                })
            },
            |item| async move {
                let id = item["id"].as_i64().unwrap().to_string();
                Ok(Candidate {
                    resource_id: id,
                    resource: item,
                })
            },
        )
        .await
        .unwrap();

        assert_eq!(result.ops.create.len(), 1);
        assert!(result.ops.create.contains_key("1"));
        assert!(result.ops.actions["1"].add.is_empty());
    }

    #[tokio::test]
    async fn test_list_failure_aborts() {
        let component = test_component();
        let config = test_config();

        let outcome = run_discovery(
            &component,
            &config,
            &[],
            |_| async { Err(CloudError::OperationFailed("list blew up".into())) },
            |item| async move {
                Ok(Candidate {
                    resource_id: "x".into(),
                    resource: item,
                })
            },
        )
        .await;

        assert!(outcome.is_err());
    }
}
