//! Diff/patch engine
//!
//! Providers with patch-based update APIs receive a minimal RFC 6902
//! patch: the structural diff between the freshly fetched upstream state
//! and that state deep-merged with the cleaned update payload.

use crate::error::Result;
use crate::value;
use json_patch::{diff, Patch, PatchOperation};
use serde_json::{json, Map, Value};

/// A sub-object the provider requires to be replaced whole rather than
/// patched field-by-field.
///
/// Which sub-paths are atomic is provider/resource-type specific, so the
/// rule is table-driven: adapters are built with a row set instead of
/// special cases at call sites.
#[derive(Debug, Clone)]
pub struct AtomicSubObject {
    /// Provider resource type the rule applies to.
    pub resource_type: String,

    /// JSON Pointer to the sub-object (e.g. `/LaunchTemplate`).
    pub path: String,

    /// Fields of the sub-object the replacement is allowed to carry.
    pub retain: Vec<String>,
}

/// The observed rows: Auto Scaling Groups reject partial LaunchTemplate
/// patches, so a version change must replace the whole object with just
/// its id and version.
pub fn default_atomic_sub_objects() -> Vec<AtomicSubObject> {
    vec![AtomicSubObject {
        resource_type: "AWS::AutoScaling::AutoScalingGroup".into(),
        path: "/LaunchTemplate".into(),
        retain: vec!["LaunchTemplateId".into(), "Version".into()],
    }]
}

/// Path of a patch operation.
pub fn operation_path(op: &PatchOperation) -> &str {
    match op {
        PatchOperation::Add(add_op) => add_op.path.as_str(),
        PatchOperation::Remove(remove_op) => remove_op.path.as_str(),
        PatchOperation::Replace(replace_op) => replace_op.path.as_str(),
        PatchOperation::Move(move_op) => move_op.path.as_str(),
        PatchOperation::Copy(copy_op) => copy_op.path.as_str(),
        PatchOperation::Test(test_op) => test_op.path.as_str(),
    }
}

/// Compute the patch that drives `current` toward `current` merged with
/// the cleaned update payload, collapsing atomic sub-objects.
pub fn compute_patch(
    current: &Value,
    update_payload: &Value,
    resource_type: &str,
    atomics: &[AtomicSubObject],
) -> Result<Patch> {
    let mut desired = current.clone();
    value::deep_merge(&mut desired, update_payload);

    let mut patch = diff(current, &desired);
    for atomic in atomics.iter().filter(|a| a.resource_type == resource_type) {
        collapse_atomic(&mut patch, atomic, &desired)?;
    }
    Ok(patch)
}

fn collapse_atomic(patch: &mut Patch, atomic: &AtomicSubObject, desired: &Value) -> Result<()> {
    let prefix = format!("{}/", atomic.path);
    let touches = |op: &PatchOperation| {
        let path = operation_path(op);
        path == atomic.path || path.starts_with(&prefix)
    };

    if !patch.0.iter().any(touches) {
        return Ok(());
    }

    let segments: Vec<&str> = atomic.path.split('/').skip(1).collect();
    let Some(sub_object) = value::get_path(desired, &segments).and_then(Value::as_object) else {
        return Ok(());
    };

    let mut replacement = Map::new();
    for key in &atomic.retain {
        if let Some(field) = sub_object.get(key) {
            replacement.insert(key.clone(), field.clone());
        }
    }

    patch.0.retain(|op| !touches(op));
    let replace: PatchOperation = serde_json::from_value(json!({
        "op": "replace",
        "path": atomic.path,
        "value": Value::Object(replacement),
    }))?;
    patch.0.push(replace);

    tracing::debug!(
        "collapsed {} patch ops into a whole-object replace",
        atomic.path
    );
    Ok(())
}
