//! Property usage classification
//!
//! Every top-level domain property is classified as create-only (settable
//! only at creation), updatable (settable at creation and update), or
//! implicitly read-only (in neither list, never sent upstream). The map is
//! authored alongside the component schema and treated as read-only
//! configuration here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which payload a property filter is being applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Create,
    Update,
}

/// Classification of domain properties plus discriminator and
/// secret-injection metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PropUsageMap {
    /// Properties settable only at creation, immutable afterwards.
    pub create_only: Vec<String>,

    /// Properties settable at creation and update.
    pub updatable: Vec<String>,

    /// Discriminated-union metadata, keyed by the discriminator property.
    pub discriminators: BTreeMap<String, Discriminator>,

    /// Secrets to inject into outgoing payloads.
    pub secrets: Vec<SecretUse>,
}

impl PropUsageMap {
    /// Parse the serialized map delivered with the component schema.
    ///
    /// Malformed JSON is treated as an empty map with a logged warning; a
    /// broken map must degrade to "send nothing", not fail the action.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(raw) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!("malformed property usage map, treating as empty: {err}");
                Self::default()
            }
        }
    }

    pub fn is_create_only(&self, key: &str) -> bool {
        self.create_only.iter().any(|k| k == key)
    }

    pub fn is_updatable(&self, key: &str) -> bool {
        self.updatable.iter().any(|k| k == key)
    }

    /// Whether a top-level property belongs in the given outgoing payload.
    pub fn sendable(&self, kind: PayloadKind, key: &str) -> bool {
        match kind {
            PayloadKind::Create => self.is_create_only(key) || self.is_updatable(key),
            PayloadKind::Update => self.is_updatable(key),
        }
    }
}

/// Tagged-union metadata for one discriminator property.
///
/// The provider models the union as a single flat enum field plus
/// type-specific sibling fields; the domain nests each subtype's fields
/// under a named child object. `mapping` relates subtype names to the
/// upstream enum values; `properties` declares which sibling fields belong
/// to each subtype so the flat form can be re-nested during discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "DiscriminatorRepr")]
pub struct Discriminator {
    pub mapping: BTreeMap<String, String>,

    #[serde(default)]
    pub properties: BTreeMap<String, Vec<String>>,
}

impl Discriminator {
    /// Subtype name whose upstream enum value equals `value`.
    pub fn subtype_for(&self, value: &str) -> Option<&str> {
        self.mapping
            .iter()
            .find(|(_, mapped)| mapped.as_str() == value)
            .map(|(name, _)| name.as_str())
    }
}

/// Accepts both the bare `{subtype: enumValue}` form emitted by older
/// schema tooling and the full form carrying subtype property lists.
#[derive(Deserialize)]
#[serde(untagged)]
enum DiscriminatorRepr {
    Full {
        mapping: BTreeMap<String, String>,
        #[serde(default)]
        properties: BTreeMap<String, Vec<String>>,
    },
    Mapping(BTreeMap<String, String>),
}

impl From<DiscriminatorRepr> for Discriminator {
    fn from(repr: DiscriminatorRepr) -> Self {
        match repr {
            DiscriminatorRepr::Full {
                mapping,
                properties,
            } => Self {
                mapping,
                properties,
            },
            DiscriminatorRepr::Mapping(mapping) => Self {
                mapping,
                properties: BTreeMap::new(),
            },
        }
    }
}

/// One secret to copy into an outgoing payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretUse {
    /// Key to look the value up by in the request-scoped secret store.
    pub secret_key: String,

    /// Path in the payload the value is written to. Must be non-empty.
    pub prop_path: Vec<String>,
}

/// Default key preference when a scalar-map entry declares none.
pub const DEFAULT_SCALAR_KEYS: [&str; 3] = ["slug", "name", "id"];

/// Hints for extracting scalar identifiers out of nested upstream objects
/// during discovery, keyed by domain property name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalarPropertyMap(pub BTreeMap<String, Vec<String>>);

impl ScalarPropertyMap {
    /// Parse the serialized map; malformed JSON degrades to the empty map
    /// with a logged warning, same as [`PropUsageMap::parse`].
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(raw) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!("malformed scalar property map, treating as empty: {err}");
                Self::default()
            }
        }
    }

    /// Ordered candidate keys for a mapped property, or `None` when the
    /// property has no extraction hint at all.
    pub fn preference_for(&self, prop: &str) -> Option<Vec<&str>> {
        let keys = self.0.get(prop)?;
        if keys.is_empty() {
            Some(DEFAULT_SCALAR_KEYS.to_vec())
        } else {
            Some(keys.iter().map(String::as_str).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classification() {
        let map = PropUsageMap::parse(
            r#"{"createOnly": ["Name"], "updatable": ["Size"], "secrets": []}"#,
        );
        assert!(map.is_create_only("Name"));
        assert!(map.sendable(PayloadKind::Create, "Name"));
        assert!(!map.sendable(PayloadKind::Update, "Name"));
        assert!(map.sendable(PayloadKind::Update, "Size"));
        assert!(!map.sendable(PayloadKind::Create, "Arn"));
    }

    #[test]
    fn test_malformed_map_is_empty() {
        let map = PropUsageMap::parse("{not json");
        assert!(map.create_only.is_empty());
        assert!(map.updatable.is_empty());
        assert!(map.secrets.is_empty());
    }

    #[test]
    fn test_discriminator_both_shapes() {
        let bare = PropUsageMap::parse(
            r#"{"discriminators": {"platform": {"linux": "LINUX"}}}"#,
        );
        assert_eq!(
            bare.discriminators["platform"].subtype_for("LINUX"),
            Some("linux")
        );

        let full = PropUsageMap::parse(
            r#"{"discriminators": {"platform": {
                "mapping": {"linux": "LINUX"},
                "properties": {"linux": ["kernel"]}
            }}}"#,
        );
        assert_eq!(
            full.discriminators["platform"].properties["linux"],
            vec!["kernel".to_string()]
        );
    }

    #[test]
    fn test_scalar_map_default_preference() {
        let map = ScalarPropertyMap::parse(r#"{"region": [], "size": ["slug"]}"#);
        assert_eq!(map.preference_for("region"), Some(vec!["slug", "name", "id"]));
        assert_eq!(map.preference_for("size"), Some(vec!["slug"]));
        assert_eq!(map.preference_for("image"), None);
    }
}
