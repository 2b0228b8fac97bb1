//! resource kinds selectable from a parameters document.

mod application_gateway;
mod availability_set;
mod connection;
mod load_balancer;
mod network_interface;
mod network_security_group;
mod public_ip;
mod storage;
mod virtual_machine;
mod virtual_network;
mod vm_extension;

use cairn_core::predicates;
use cairn_core::{node_resource_id, Outcome, Policy, Scope, TransformError};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// top-level kinds, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    VirtualNetwork,
    NetworkSecurityGroup,
    LoadBalancer,
    VirtualMachine,
    VmExtension,
    Connection,
    ApplicationGateway,
}

impl Kind {
    pub const ALL: [Kind; 7] = [
        Kind::VirtualNetwork,
        Kind::NetworkSecurityGroup,
        Kind::LoadBalancer,
        Kind::VirtualMachine,
        Kind::VmExtension,
        Kind::Connection,
        Kind::ApplicationGateway,
    ];

    /// parameters-document key.
    pub fn key(self) -> &'static str {
        match self {
            Kind::VirtualNetwork => "virtualNetworkSettings",
            Kind::NetworkSecurityGroup => "networkSecurityGroupsSettings",
            Kind::LoadBalancer => "loadBalancerSettings",
            Kind::VirtualMachine => "virtualMachinesSettings",
            Kind::VmExtension => "virtualMachinesExtensionSettings",
            Kind::Connection => "connectionSettings",
            Kind::ApplicationGateway => "applicationGatewaySettings",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }

    pub fn policy(self) -> &'static dyn Policy {
        match self {
            Kind::VirtualNetwork => &virtual_network::VirtualNetwork,
            Kind::NetworkSecurityGroup => &network_security_group::NetworkSecurityGroup,
            Kind::LoadBalancer => &load_balancer::LoadBalancer,
            Kind::VirtualMachine => &virtual_machine::VirtualMachine,
            Kind::VmExtension => &vm_extension::VmExtension,
            Kind::Connection => &connection::Connection,
            Kind::ApplicationGateway => &application_gateway::ApplicationGateway,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Kind::from_key(raw).ok_or_else(|| format!("unknown settings key {raw}"))
    }
}

/// string field or "" when missing.
pub(crate) fn text<'a>(node: &'a Value, key: &str) -> &'a str {
    node.get(key).and_then(Value::as_str).unwrap_or_default()
}

pub(crate) fn flag(node: &Value, key: &str) -> bool {
    node.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// array field or an empty slice.
pub(crate) fn items<'a>(node: &'a Value, key: &str) -> &'a [Value] {
    node.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// copy of the listed fields that are present on `node`.
pub(crate) fn pick(node: &Value, keys: &[&str]) -> Value {
    let picked = keys
        .iter()
        .filter_map(|key| node.get(*key).map(|value| (key.to_string(), value.clone())))
        .collect();
    Value::Object(picked)
}

/// `{ "id": ... }` reference.
pub(crate) fn reference(id: String) -> Value {
    serde_json::json!({ "id": id })
}

/// id of `subnet` inside the augmented virtual network node.
pub(crate) fn subnet_id(virtual_network: &Value, subnet: &str) -> Result<String, TransformError> {
    Ok(node_resource_id(
        virtual_network,
        "Microsoft.Network/virtualNetworks/subnets",
        &[text(virtual_network, "name"), subnet],
    )?)
}

/// true when the enclosing object's `collection` holds an element named like the value.
pub(crate) fn names_sibling(scope: &Scope<'_>, collection: &str) -> bool {
    let Some(wanted) = scope.as_str() else {
        return false;
    };
    scope
        .grandparent()
        .map(|owner| items(owner, collection))
        .unwrap_or_default()
        .iter()
        .any(|item| text(item, "name") == wanted)
}

/// cross-reference rule body: `Invalid {field}. {owner}: {name}, {field}: {value}`.
pub(crate) fn cross_reference(
    scope: &Scope<'_>,
    collection: &str,
    field: &str,
    owner: &str,
) -> Outcome {
    Outcome::check(
        names_sibling(scope, collection),
        format!(
            "Invalid {field}. {owner}: {}, {field}: {}",
            scope.sibling_str("name").unwrap_or_default(),
            scope.as_str().unwrap_or_default()
        ),
    )
}

/// absent or valid tags.
pub(crate) fn optional_tags(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        Outcome::Valid
    } else {
        predicates::tags(scope)
    }
}

pub(crate) fn positive(scope: &Scope<'_>) -> Outcome {
    Outcome::check(
        scope.value.and_then(Value::as_i64).is_some_and(|n| n > 0),
        "Value must be greater than 0",
    )
}

/// vms one settings group may stamp.
pub(crate) const MAX_VM_COUNT: i64 = 100;

pub(crate) fn vm_count(scope: &Scope<'_>) -> Outcome {
    Outcome::check(
        scope
            .value
            .and_then(Value::as_i64)
            .is_some_and(|n| (1..=MAX_VM_COUNT).contains(&n)),
        format!("Value must be between 1 and {MAX_VM_COUNT}"),
    )
}

/// merge and augment one settings instance the way the pipeline does.
#[cfg(test)]
pub(crate) fn prepare(
    policy: &dyn Policy,
    settings: &Value,
    context: &cairn_core::BuildingBlock,
) -> Value {
    let defaults = policy.defaults(settings).expect("defaults");
    let hook: &cairn_core::Customizer<'_> =
        &|key, ours, theirs| policy.customize(key, ours, theirs);
    let merged = cairn_core::merge(settings, &[defaults], Some(hook));
    cairn_core::augment(&merged, context, &|key| policy.is_resource_key(key))
}
