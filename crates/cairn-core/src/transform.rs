//! table-driven transform from validated settings to resource descriptors.
//!
//! each instance goes through two phases. child handlers run first and write
//! dependent resources (nics, public ips, storage accounts) into the
//! accumulator. field handlers run second, read the accumulator as it stands,
//! and return property fragments that fold into the instance's `properties`.

use crate::context::BuildingBlock;
use crate::resource_id::ResourceIdError;
use crate::JsonMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// written in place of every secret value inside properties.
pub const SECRET_PLACEHOLDER: &str = "$SECRET$";

/// errors raised while transforming validated settings.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    ResourceId(#[from] ResourceIdError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing field {field} on {resource}")]
    MissingField { resource: String, field: String },
    #[error("handler for {key} returned a non-object fragment")]
    Fragment { key: String },
    #[error("a deployment carries one secret; a different one was already recorded")]
    ConflictingSecret,
}

impl TransformError {
    pub fn missing(resource: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            resource: resource.into(),
            field: field.into(),
        }
    }
}

/// output collections of one run plus the single secret slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Accumulator {
    pub collections: BTreeMap<String, Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<Value>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, collection: &str, resource: Value) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(resource);
    }

    /// resources recorded under `collection`, empty when none were.
    pub fn get(&self, collection: &str) -> &[Value] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// true when any resource in `collection` carries `name`.
    pub fn contains(&self, collection: &str, name: &str) -> bool {
        self.get(collection)
            .iter()
            .any(|resource| resource.get("name").and_then(Value::as_str) == Some(name))
    }

    pub fn is_empty(&self) -> bool {
        self.collections.values().all(Vec::is_empty) && self.secret.is_none()
    }

    /// record the run's secret. repeating the same value is fine, a different
    /// one is rejected.
    pub fn set_secret(&mut self, secret: Value) -> Result<(), TransformError> {
        match &self.secret {
            Some(current) if *current != secret => Err(TransformError::ConflictingSecret),
            Some(_) => Ok(()),
            None => {
                self.secret = Some(secret);
                Ok(())
            }
        }
    }

    /// append another accumulator's collections, keeping order within each.
    pub fn absorb(&mut self, other: Accumulator) -> Result<(), TransformError> {
        if let Some(secret) = other.secret {
            self.set_secret(secret)?;
        }
        for (collection, resources) in other.collections {
            self.collections
                .entry(collection)
                .or_default()
                .extend(resources);
        }
        Ok(())
    }
}

/// fully-specified resource as handed to the deployment api.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub name: String,
    pub resource_group_name: String,
    pub subscription_id: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
    pub properties: JsonMap,
}

impl ResourceDescriptor {
    /// descriptor named and addressed after `node`, falling back to the context.
    pub fn for_node(node: &Value, context: &BuildingBlock, properties: JsonMap) -> Self {
        let field = |key: &str, fallback: &str| {
            node.get(key)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };
        Self {
            name: field("name", ""),
            resource_group_name: field("resourceGroupName", &context.resource_group_name),
            subscription_id: field("subscriptionId", &context.subscription_id),
            location: field("location", &context.location),
            tags: node.get("tags").filter(|tags| !tags.is_null()).cloned(),
            properties,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn into_value(self) -> Result<Value, TransformError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// what a field handler sees.
#[derive(Debug, Clone, Copy)]
pub struct HandlerArgs<'a> {
    pub value: &'a Value,
    pub key: &'a str,
    /// position of the instance within the batch being transformed.
    pub index: usize,
    /// the instance holding the field.
    pub parent: &'a Value,
    pub accumulator: &'a Accumulator,
    pub context: &'a BuildingBlock,
}

/// returns a properties fragment (an object) or nothing.
pub type FieldHandler = fn(&HandlerArgs<'_>) -> Result<Option<Value>, TransformError>;

pub type HandlerTable = [(&'static str, FieldHandler)];

/// what a child-resource handler sees.
#[derive(Debug, Clone, Copy)]
pub struct ChildArgs<'a> {
    pub value: &'a Value,
    pub key: &'a str,
    pub index: usize,
    pub instance: &'a Value,
    pub context: &'a BuildingBlock,
}

/// writes dependent resources into the accumulator.
pub type ChildHandler = fn(&ChildArgs<'_>, &mut Accumulator) -> Result<(), TransformError>;

pub type ChildTable = [(&'static str, ChildHandler)];

/// tables driving the transform of one kind.
#[derive(Debug, Clone, Copy)]
pub struct TransformPlan {
    /// accumulator collection receiving the instance descriptors.
    pub collection: &'static str,
    pub children: &'static ChildTable,
    pub handlers: &'static HandlerTable,
}

/// deep-merge a properties fragment: objects merge recursively, anything
/// else (explicit null included) overwrites.
pub fn merge_fragment(target: &mut JsonMap, fragment: JsonMap) {
    for (key, value) in fragment {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_fragment(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// run `handlers` in table order over `instance` and fold their fragments.
pub fn fold_properties(
    instance: &Value,
    index: usize,
    handlers: &HandlerTable,
    accumulator: &Accumulator,
    context: &BuildingBlock,
) -> Result<JsonMap, TransformError> {
    let mut properties = JsonMap::new();
    for (key, handler) in handlers {
        let Some(value) = instance.get(*key) else {
            continue;
        };
        let args = HandlerArgs {
            value,
            key,
            index,
            parent: instance,
            accumulator,
            context,
        };
        match handler(&args)? {
            None => {}
            Some(Value::Object(fragment)) => merge_fragment(&mut properties, fragment),
            Some(_) => {
                return Err(TransformError::Fragment {
                    key: key.to_string(),
                })
            }
        }
    }
    Ok(properties)
}

/// transform every instance: child handlers, then field handlers, then one
/// descriptor pushed under `plan.collection`.
pub fn transform_instances(
    instances: &[Value],
    plan: &TransformPlan,
    context: &BuildingBlock,
) -> Result<Accumulator, TransformError> {
    let mut accumulator = Accumulator::new();
    transform_into(instances, plan, context, &mut accumulator)?;
    Ok(accumulator)
}

/// [`transform_instances`] over an accumulator that already holds earlier
/// output; indices restart at zero for `instances`.
pub fn transform_into(
    instances: &[Value],
    plan: &TransformPlan,
    context: &BuildingBlock,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    for (index, instance) in instances.iter().enumerate() {
        for (key, child) in plan.children {
            let Some(value) = instance.get(*key) else {
                continue;
            };
            let args = ChildArgs {
                value,
                key,
                index,
                instance,
                context,
            };
            child(&args, accumulator)?;
        }
        let properties = fold_properties(instance, index, plan.handlers, accumulator, context)?;
        let descriptor = ResourceDescriptor::for_node(instance, context, properties);
        debug!(collection = plan.collection, name = %descriptor.name, "built resource descriptor");
        accumulator.push(plan.collection, descriptor.into_value()?);
    }
    Ok(())
}

/// `count` deep copies of `settings`, the i-th named `name_for(i)`.
pub fn fan_out(settings: &Value, count: usize, name_for: impl Fn(usize) -> String) -> Vec<Value> {
    (0..count)
        .map(|index| {
            let mut copy = settings.clone();
            if let Value::Object(map) = &mut copy {
                map.insert("name".to_string(), Value::String(name_for(index)));
            }
            copy
        })
        .collect()
}
