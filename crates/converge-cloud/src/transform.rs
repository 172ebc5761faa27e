//! Payload transformer
//!
//! Outbound: turn a component's domain tree into the exact payload a
//! provider expects: flatten discriminated sub-objects, filter by
//! property classification, prune empties, inject secrets.
//!
//! Inbound: turn a raw upstream resource back into domain shape during
//! discovery: extract scalar identifiers, collapse reference objects,
//! prune, re-nest discriminated fields.

use crate::error::{CloudError, Result};
use crate::propmap::{Discriminator, PayloadKind, PropUsageMap, ScalarPropertyMap};
use crate::prune::{prune, prune_or_empty};
use crate::secrets::SecretStore;
use crate::value;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Whether a value would prune away entirely.
pub fn is_effectively_empty(value: &Value) -> bool {
    prune(value.clone()).is_none()
}

/// Build the outgoing payload for a create or update call.
///
/// Starts from a deep copy of the domain tree (identity and wiring fields
/// live in `ProviderConfig`, not in the domain). Classification is
/// top-level-only: nested children of a kept property are kept wholesale.
pub fn clean_payload(domain: &Value, usage: &PropUsageMap, kind: PayloadKind) -> Result<Value> {
    let mut payload = domain.clone();
    flatten_discriminators(&mut payload, &usage.discriminators)?;
    if let Value::Object(map) = &mut payload {
        map.retain(|key, _| usage.sendable(kind, key));
    }
    Ok(prune_or_empty(payload))
}

/// Replace each nested discriminator object with the flat form the
/// provider expects: the filled subtype's fields merged into the parent
/// and the discriminator field set to the mapped enum value.
///
/// More than one filled subtype is a schema authoring error. No filled
/// subtype deletes the discriminator field entirely.
pub fn flatten_discriminators(
    payload: &mut Value,
    discriminators: &BTreeMap<String, Discriminator>,
) -> Result<()> {
    for (prop, spec) in discriminators {
        let Some(root) = payload.as_object_mut() else {
            return Ok(());
        };
        let Some(slot) = root.get(prop) else {
            continue;
        };
        let Some(subtypes) = slot.as_object() else {
            continue;
        };

        let filled: Vec<String> = subtypes
            .iter()
            .filter(|(name, field)| {
                spec.mapping.contains_key(name.as_str()) && !is_effectively_empty(field)
            })
            .map(|(name, _)| name.to_string())
            .collect();

        if filled.len() > 1 {
            return Err(CloudError::Configuration(format!(
                "multiple subtypes filled for discriminator property {prop}: {filled:?}"
            )));
        }

        let Some(Value::Object(mut subtypes)) = root.remove(prop) else {
            unreachable!()
        };
        if let Some(subtype) = filled.into_iter().next() {
            let enum_value = spec.mapping.get(&subtype).cloned().unwrap_or_default();
            if let Some(Value::Object(fields)) = subtypes.remove(&subtype) {
                for (key, field) in fields {
                    root.insert(key, field);
                }
            }
            root.insert(prop.clone(), Value::String(enum_value));
        }
    }
    Ok(())
}

/// Write secret values into the payload at their declared paths.
///
/// A value is only written where the path already exists in the generated
/// payload; secrets never invent structure. A declared secret with an
/// empty path is a malformed schema and aborts the action.
pub fn inject_secrets(
    payload: &mut Value,
    usage: &PropUsageMap,
    secrets: &dyn SecretStore,
) -> Result<()> {
    for entry in &usage.secrets {
        if entry.prop_path.is_empty() {
            return Err(CloudError::Configuration(format!(
                "secret {} has an empty propPath",
                entry.secret_key
            )));
        }
        let Some(secret) = secrets.get(&entry.secret_key) else {
            continue;
        };
        let path: Vec<&str> = entry.prop_path.iter().map(String::as_str).collect();
        if value::set_existing(payload, &path, Value::String(secret)) {
            tracing::debug!("injected secret {} into payload", entry.secret_key);
        }
    }
    Ok(())
}

/// Normalize a raw upstream resource into domain shape.
pub fn normalize_resource(
    raw: &Value,
    scalar: &ScalarPropertyMap,
    usage: &PropUsageMap,
) -> Value {
    let mut normalized = raw.clone();
    extract_scalars(&mut normalized, scalar);
    collapse_reference_objects(&mut normalized);
    let mut normalized = prune_or_empty(normalized);
    unflatten_discriminators(&mut normalized, &usage.discriminators);
    normalized
}

/// Project the normalized resource onto the component's domain: only
/// classified properties are copied in; everything else lives solely in
/// the resource payload. Discovery includes create-only properties since
/// an imported resource's immutable fields are part of its desired state.
pub fn project_domain(normalized: &Value, usage: &PropUsageMap, include_create_only: bool) -> Value {
    let Some(map) = normalized.as_object() else {
        return Value::Object(Map::new());
    };
    let mut out = Map::new();
    for (key, field) in map {
        let keep = usage.is_updatable(key)
            || (include_create_only && usage.is_create_only(key))
            || usage.discriminators.contains_key(key);
        if keep {
            out.insert(key.clone(), field.clone());
        }
    }
    Value::Object(out)
}

/// Replace a top-level nested object with one of its scalar members,
/// following the per-property key preference (e.g. a region object
/// becomes its slug).
fn extract_scalars(value: &mut Value, scalar: &ScalarPropertyMap) {
    let Some(map) = value.as_object_mut() else {
        return;
    };
    for (prop, slot) in map.iter_mut() {
        let Some(preference) = scalar.preference_for(prop) else {
            continue;
        };
        let Some(nested) = slot.as_object() else {
            continue;
        };
        for key in preference {
            if let Some(candidate) = nested.get(key) {
                if candidate.is_string() || candidate.is_number() {
                    *slot = candidate.clone();
                    break;
                }
            }
        }
    }
}

/// Collapse any remaining nested object carrying a scalar `id` into that
/// id. The resource root itself is exempt.
fn collapse_reference_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                collapse_child(child);
            }
        }
        Value::Array(items) => {
            for child in items {
                collapse_child(child);
            }
        }
        _ => {}
    }
}

fn collapse_child(child: &mut Value) {
    if let Value::Object(map) = child {
        if let Some(id) = map.get("id") {
            if id.is_number() || id.is_string() {
                *child = id.clone();
                return;
            }
        }
    }
    collapse_reference_objects(child);
}

/// Reverse of [`flatten_discriminators`]: match the flat enum value back
/// to its subtype and nest the subtype's declared properties under the
/// subtype name.
fn unflatten_discriminators(value: &mut Value, discriminators: &BTreeMap<String, Discriminator>) {
    for (prop, spec) in discriminators {
        let Some(root) = value.as_object_mut() else {
            return;
        };
        let Some(flat) = root.get(prop).and_then(Value::as_str).map(String::from) else {
            continue;
        };
        let Some(subtype) = spec.subtype_for(&flat).map(String::from) else {
            continue;
        };

        let mut fields = Map::new();
        for declared in spec.properties.get(&subtype).into_iter().flatten() {
            if let Some(field) = root.remove(declared) {
                fields.insert(declared.clone(), field);
            }
        }
        let mut nested = Map::new();
        nested.insert(subtype, Value::Object(fields));
        root.insert(prop.clone(), Value::Object(nested));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::StaticSecrets;
    use serde_json::json;

    fn usage_with_discriminator() -> PropUsageMap {
        PropUsageMap::parse(
            r#"{
                "createOnly": ["Name"],
                "updatable": ["Size", "platform", "kernel", "edition"],
                "discriminators": {"platform": {
                    "mapping": {"linux": "LINUX", "windows": "WINDOWS"},
                    "properties": {"linux": ["kernel"], "windows": ["edition"]}
                }}
            }"#,
        )
    }

    #[test]
    fn test_create_and_update_classification() {
        let usage = PropUsageMap::parse(
            r#"{"createOnly": ["Name", "Cidr"], "updatable": ["Tags"]}"#,
        );
        let domain = json!({
            "Name": "main",
            "Cidr": "10.0.0.0/16",
            "Tags": {"env": "prod"},
            "Arn": "arn:aws:...",
        });

        let create = clean_payload(&domain, &usage, PayloadKind::Create).unwrap();
        for key in create.as_object().unwrap().keys() {
            assert!(usage.is_create_only(key) || usage.is_updatable(key));
        }
        assert_eq!(
            create,
            json!({"Name": "main", "Cidr": "10.0.0.0/16", "Tags": {"env": "prod"}})
        );

        let update = clean_payload(&domain, &usage, PayloadKind::Update).unwrap();
        for key in update.as_object().unwrap().keys() {
            assert!(usage.is_updatable(key) && !usage.is_create_only(key));
        }
        assert_eq!(update, json!({"Tags": {"env": "prod"}}));
    }

    #[test]
    fn test_clean_payload_prunes_empties() {
        let usage = PropUsageMap::parse(r#"{"updatable": ["A", "B", "C"]}"#);
        let domain = json!({"A": {"x": null}, "B": [], "C": "kept"});
        let cleaned = clean_payload(&domain, &usage, PayloadKind::Update).unwrap();
        assert_eq!(cleaned, json!({"C": "kept"}));
    }

    #[test]
    fn test_discriminator_flatten() {
        let usage = usage_with_discriminator();
        let domain = json!({
            "Size": "large",
            "platform": {"linux": {"kernel": "6.8"}, "windows": {}},
        });

        let cleaned = clean_payload(&domain, &usage, PayloadKind::Update).unwrap();
        assert_eq!(
            cleaned,
            json!({"Size": "large", "platform": "LINUX", "kernel": "6.8"})
        );
    }

    #[test]
    fn test_discriminator_none_filled_drops_field() {
        let usage = usage_with_discriminator();
        let domain = json!({"Size": "large", "platform": {"linux": {}, "windows": {}}});
        let cleaned = clean_payload(&domain, &usage, PayloadKind::Update).unwrap();
        assert_eq!(cleaned, json!({"Size": "large"}));
    }

    #[test]
    fn test_discriminator_multiple_filled_is_an_error() {
        let usage = usage_with_discriminator();
        let domain = json!({
            "platform": {"linux": {"kernel": "6.8"}, "windows": {"edition": "2022"}},
        });
        let err = clean_payload(&domain, &usage, PayloadKind::Update).unwrap_err();
        assert!(matches!(err, CloudError::Configuration(_)));
    }

    #[test]
    fn test_discriminator_round_trip() {
        let usage = usage_with_discriminator();
        let domain = json!({
            "Size": "large",
            "platform": {"linux": {"kernel": "6.8"}},
        });

        let mut flat = domain.clone();
        flatten_discriminators(&mut flat, &usage.discriminators).unwrap();
        unflatten_discriminators(&mut flat, &usage.discriminators);
        assert_eq!(flat, domain);
    }

    #[test]
    fn test_inject_secrets_only_into_existing_paths() {
        let usage = PropUsageMap::parse(
            r#"{"secrets": [
                {"secretKey": "db/password", "propPath": ["Auth", "Password"]},
                {"secretKey": "api/token", "propPath": ["Token"]},
                {"secretKey": "unset", "propPath": ["Other"]}
            ]}"#,
        );
        let store = StaticSecrets::new()
            .with("db/password", "hunter2")
            .with("api/token", "t0ken");

        let mut payload = json!({"Auth": {"Password": ""}});
        inject_secrets(&mut payload, &usage, &store).unwrap();
        // written where the path exists, never invented elsewhere
        assert_eq!(payload, json!({"Auth": {"Password": "hunter2"}}));
    }

    #[test]
    fn test_empty_secret_path_aborts() {
        let usage =
            PropUsageMap::parse(r#"{"secrets": [{"secretKey": "k", "propPath": []}]}"#);
        let store = StaticSecrets::new();
        let mut payload = json!({});
        let err = inject_secrets(&mut payload, &usage, &store).unwrap_err();
        assert!(matches!(err, CloudError::Configuration(_)));
    }

    #[test]
    fn test_normalize_extracts_scalars_and_collapses_ids() {
        let scalar = ScalarPropertyMap::parse(r#"{"region": [], "size": ["slug"]}"#);
        let usage = PropUsageMap::default();
        let raw = json!({
            "id": 42,
            "name": "web-1",
            "region": {"slug": "nyc1", "name": "New York 1"},
            "size": {"slug": "s-1vcpu-1gb", "price_monthly": 6.0},
            "image": {"id": 191457505, "distribution": "Ubuntu"},
            "networks": null,
            "tags": [],
        });

        let normalized = normalize_resource(&raw, &scalar, &usage);
        assert_eq!(
            normalized,
            json!({
                "id": 42,
                "name": "web-1",
                "region": "nyc1",
                "size": "s-1vcpu-1gb",
                "image": 191457505,
            })
        );
    }

    #[test]
    fn test_normalize_unflattens_discriminator() {
        let usage = usage_with_discriminator();
        let raw = json!({"Size": "large", "platform": "WINDOWS", "edition": "2022"});
        let normalized =
            normalize_resource(&raw, &ScalarPropertyMap::default(), &usage);
        assert_eq!(
            normalized,
            json!({"Size": "large", "platform": {"windows": {"edition": "2022"}}})
        );
    }

    #[test]
    fn test_project_domain_respects_classification() {
        let usage = PropUsageMap::parse(
            r#"{"createOnly": ["Cidr"], "updatable": ["Tags"]}"#,
        );
        let normalized = json!({"Cidr": "10.0.0.0/16", "Tags": {"env": "prod"}, "State": "available"});

        let projected = project_domain(&normalized, &usage, true);
        assert_eq!(
            projected,
            json!({"Cidr": "10.0.0.0/16", "Tags": {"env": "prod"}})
        );

        let updatable_only = project_domain(&normalized, &usage, false);
        assert_eq!(updatable_only, json!({"Tags": {"env": "prod"}}));
    }
}
