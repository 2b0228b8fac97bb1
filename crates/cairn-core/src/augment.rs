//! stamp deployment coordinates onto every resource node of a settings tree.

use crate::context::BuildingBlock;
use crate::JsonMap;
use serde_json::Value;

const ADDRESSING_KEYS: [&str; 3] = ["subscriptionId", "resourceGroupName", "location"];

/// copy `settings`, stamping `subscriptionId`, `resourceGroupName` and
/// `location` from `context` onto the root and onto every object reached
/// through a key accepted by `is_resource_key`. values already present win.
///
/// the predicate sees `None` for the root; the root is always stamped.
pub fn augment(
    settings: &Value,
    context: &BuildingBlock,
    is_resource_key: &dyn Fn(Option<&str>) -> bool,
) -> Value {
    let addressing = context.addressing();
    let stamp = addressing.as_object().cloned().unwrap_or_default();
    match settings {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| augment_node(item, &stamp, is_resource_key))
                .collect(),
        ),
        other => augment_node(other, &stamp, is_resource_key),
    }
}

fn augment_node(
    node: &Value,
    stamp: &JsonMap,
    is_resource_key: &dyn Fn(Option<&str>) -> bool,
) -> Value {
    let Value::Object(map) = node else {
        return node.clone();
    };
    let mut out = JsonMap::new();
    for (key, value) in map {
        let child = if is_resource_key(Some(key)) {
            match value {
                Value::Object(_) => augment_node(value, stamp, is_resource_key),
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| augment_node(item, stamp, is_resource_key))
                        .collect(),
                ),
                _ => value.clone(),
            }
        } else {
            value.clone()
        };
        out.insert(key.clone(), child);
    }
    for key in ADDRESSING_KEYS {
        if out.contains_key(key) {
            continue;
        }
        if let Some(value) = stamp.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(out)
}
