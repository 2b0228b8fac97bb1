//! public ip addresses created on behalf of frontends and nics.

use super::text;
use cairn_core::predicates::{self, is_domain_label};
use cairn_core::{
    merge, node_resource_id, BuildingBlock, JsonMap, Outcome, ResourceDescriptor, RuleSet, Scope,
    TransformError,
};
use serde_json::{json, Value};

pub(crate) const COLLECTION: &str = "pips";
const RESOURCE_TYPE: &str = "Microsoft.Network/publicIPAddresses";
const ALLOCATION_METHODS: [&str; 2] = ["Static", "Dynamic"];
const VERSIONS: [&str; 2] = ["IPv4", "IPv6"];

pub(crate) fn defaults() -> Value {
    json!({
        "publicIPAllocationMethod": "Dynamic",
        "publicIPAddressVersion": "IPv4",
        "idleTimeoutInMinutes": 4
    })
}

/// rules for an explicit `publicIpAddress` block; the name is computed when absent.
pub(crate) static RULES: &RuleSet = &[
    ("name", name),
    ("publicIPAllocationMethod", allocation_method),
    ("publicIPAddressVersion", version),
    ("idleTimeoutInMinutes", idle_timeout),
    ("domainNameLabel", domain_name_label),
    ("reverseFqdn", reverse_fqdn),
];

fn name(scope: &Scope<'_>) -> Outcome {
    if scope.value.is_none() {
        return Outcome::Valid;
    }
    predicates::not_blank(scope)
}

pub(crate) fn allocation_method(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &ALLOCATION_METHODS)
}

fn version(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        return Outcome::Valid;
    }
    predicates::one_of(scope, &VERSIONS)
}

fn idle_timeout(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        return Outcome::Valid;
    }
    predicates::between(scope, 4, 31)
}

pub(crate) fn domain_name_label(scope: &Scope<'_>) -> Outcome {
    if predicates::is_nil_or_blank(scope.value) {
        return Outcome::Valid;
    }
    Outcome::check(
        is_domain_label(scope.value),
        "Value must start with a lowercase letter and contain 3 to 63 lowercase letters, digits or hyphens",
    )
}

fn reverse_fqdn(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        return Outcome::Valid;
    }
    Outcome::check(
        scope.value.is_some_and(Value::is_string),
        "Value must be a string",
    )
}

/// id of the public ip `name`, addressed like `owner`.
pub(crate) fn id(owner: &Value, name: &str) -> Result<String, TransformError> {
    Ok(node_resource_id(owner, RESOURCE_TYPE, &[name])?)
}

/// build the descriptor for a public ip named `name` owned by `owner`.
pub(crate) fn build(
    name: &str,
    settings: &Value,
    owner: &Value,
    context: &BuildingBlock,
) -> Result<Value, TransformError> {
    let merged = merge(settings, &[defaults()], None);
    let mut properties = JsonMap::new();
    for key in [
        "publicIPAllocationMethod",
        "publicIPAddressVersion",
        "idleTimeoutInMinutes",
    ] {
        if let Some(value) = merged.get(key) {
            properties.insert(key.to_string(), value.clone());
        }
    }
    let label = text(&merged, "domainNameLabel");
    if !label.trim().is_empty() {
        let mut dns = json!({ "domainNameLabel": label });
        if let Some(fqdn) = merged.get("reverseFqdn").filter(|fqdn| !fqdn.is_null()) {
            dns["reverseFqdn"] = fqdn.clone();
        }
        properties.insert("dnsSettings".to_string(), dns);
    }
    let mut descriptor = ResourceDescriptor::for_node(owner, context, properties).named(name);
    descriptor.tags = None;
    descriptor.into_value()
}
