//! canonical hierarchical resource identifiers.

use serde_json::Value;
use thiserror::Error;

/// errors raised while building a resource identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceIdError {
    #[error("subscription id cannot be blank")]
    BlankSubscription,
    #[error("resource group name cannot be blank")]
    BlankResourceGroup,
    #[error("invalid resource type {0}: expected Namespace/type[/type...]")]
    InvalidResourceType(String),
    #[error("resource type {resource_type} expects {expected} name(s), got {actual}")]
    NameCountMismatch {
        resource_type: String,
        expected: usize,
        actual: usize,
    },
    #[error("name segment {index} of {resource_type} cannot be blank")]
    BlankName { resource_type: String, index: usize },
}

/// build `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}[/{type}/{name}...]`.
///
/// `resource_type` is the provider namespace followed by one or more type
/// segments; one name is required per type segment.
pub fn resource_id(
    subscription_id: &str,
    resource_group_name: &str,
    resource_type: &str,
    names: &[&str],
) -> Result<String, ResourceIdError> {
    if subscription_id.trim().is_empty() {
        return Err(ResourceIdError::BlankSubscription);
    }
    if resource_group_name.trim().is_empty() {
        return Err(ResourceIdError::BlankResourceGroup);
    }

    let trimmed = resource_type.trim_end_matches('/');
    let mut segments = trimmed.split('/');
    let namespace = segments
        .next()
        .filter(|segment| !segment.trim().is_empty())
        .ok_or_else(|| ResourceIdError::InvalidResourceType(resource_type.to_string()))?;
    let types: Vec<&str> = segments.collect();
    if types.is_empty() || types.iter().any(|segment| segment.trim().is_empty()) {
        return Err(ResourceIdError::InvalidResourceType(
            resource_type.to_string(),
        ));
    }
    if types.len() != names.len() {
        return Err(ResourceIdError::NameCountMismatch {
            resource_type: trimmed.to_string(),
            expected: types.len(),
            actual: names.len(),
        });
    }

    let mut id = format!(
        "/subscriptions/{subscription_id}/resourceGroups/{resource_group_name}/providers/{namespace}"
    );
    for (index, (segment, name)) in types.iter().zip(names).enumerate() {
        if name.trim().is_empty() {
            return Err(ResourceIdError::BlankName {
                resource_type: trimmed.to_string(),
                index,
            });
        }
        id.push('/');
        id.push_str(segment);
        id.push('/');
        id.push_str(name);
    }
    Ok(id)
}

/// build an identifier from the addressing fields stamped onto an augmented node.
pub fn node_resource_id(
    node: &Value,
    resource_type: &str,
    names: &[&str],
) -> Result<String, ResourceIdError> {
    let field = |key: &str| node.get(key).and_then(Value::as_str).unwrap_or_default();
    resource_id(
        field("subscriptionId"),
        field("resourceGroupName"),
        resource_type,
        names,
    )
}
