//! network security groups and the subnets and nics they are attached to.

use super::{items, optional_tags, reference, subnet_id, text};
use crate::Kind;
use cairn_core::predicates::{self, is_cidr, is_ip_address, is_string_in};
use cairn_core::{
    node_resource_id, transform_instances, Accumulator, BuildingBlock, ChildArgs, ChildTable,
    HandlerArgs, HandlerTable, Outcome, Policy, RuleSet, Scope, TransformError, TransformPlan,
    ValidationError,
};
use serde_json::{json, Value};

pub(crate) struct NetworkSecurityGroup;

const COLLECTION: &str = "networkSecurityGroups";
const RESOURCE_TYPE: &str = "Microsoft.Network/networkSecurityGroups";
const SUBNET_UPDATES: &str = "subnets";
const NIC_UPDATES: &str = "nicUpdates";

const PROTOCOLS: [&str; 3] = ["TCP", "UDP", "*"];
const DEFAULT_TAGS: [&str; 4] = ["VirtualNetwork", "AzureLoadBalancer", "Internet", "*"];
const DIRECTIONS: [&str; 2] = ["Inbound", "Outbound"];
const ACCESSES: [&str; 2] = ["Allow", "Deny"];

fn defaults() -> Value {
    json!({
        "virtualNetworks": [{ "subnets": [] }],
        "networkInterfaces": [],
        "securityRules": [],
        "tags": {}
    })
}

impl Policy for NetworkSecurityGroup {
    fn key(&self) -> &'static str {
        Kind::NetworkSecurityGroup.key()
    }

    fn defaults(&self, _instance: &Value) -> Result<Value, ValidationError> {
        Ok(defaults())
    }

    /// the default virtual network only shapes given entries.
    fn customize(&self, key: &str, settings: Option<&Value>, _default: &Value) -> Option<Value> {
        if key == "virtualNetworks" && settings.is_none() {
            return Some(json!([]));
        }
        None
    }

    fn is_resource_key(&self, key: Option<&str>) -> bool {
        matches!(key, None | Some("virtualNetworks" | "networkInterfaces"))
    }

    fn rules(&self) -> &'static RuleSet {
        RULES
    }

    fn plan(&self) -> TransformPlan {
        TransformPlan {
            collection: COLLECTION,
            children: CHILDREN,
            handlers: HANDLERS,
        }
    }

    /// descriptors also carry their own id, which the attachment updates point at.
    fn transform(
        &self,
        instances: &[Value],
        context: &BuildingBlock,
    ) -> Result<Accumulator, TransformError> {
        let mut accumulator = transform_instances(instances, &self.plan(), context)?;
        if let Some(groups) = accumulator.collections.get_mut(COLLECTION) {
            for (group, instance) in groups.iter_mut().zip(instances) {
                group["id"] = json!(group_id(instance)?);
            }
        }
        Ok(accumulator)
    }
}

fn group_id(group: &Value) -> Result<String, TransformError> {
    Ok(node_resource_id(group, RESOURCE_TYPE, &[text(group, "name")])?)
}

static RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("tags", optional_tags),
    ("securityRules", security_rules),
    ("virtualNetworks", virtual_networks),
    ("networkInterfaces", network_interfaces),
];

static SECURITY_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("protocol", protocol),
    ("sourcePortRange", predicates::port_range),
    ("destinationPortRange", predicates::port_range),
    ("sourceAddressPrefix", address_prefix),
    ("destinationAddressPrefix", address_prefix),
    ("direction", direction),
    ("priority", priority),
    ("access", access),
];

static VIRTUAL_NETWORK_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("subnets", subnet_names),
];

static NETWORK_INTERFACE_RULES: &RuleSet = &[("name", predicates::not_blank)];

/// empty lists are fine; entries are validated once there are any.
fn non_empty_list(scope: &Scope<'_>, rules: &'static RuleSet) -> Outcome {
    match scope.value {
        None | Some(Value::Null) => Outcome::Valid,
        Some(Value::Array(list)) if list.is_empty() => Outcome::Valid,
        Some(Value::Array(_)) => Outcome::Descend(rules),
        Some(_) => Outcome::invalid("Value must be an array"),
    }
}

fn security_rules(scope: &Scope<'_>) -> Outcome {
    non_empty_list(scope, SECURITY_RULES)
}

fn virtual_networks(scope: &Scope<'_>) -> Outcome {
    non_empty_list(scope, VIRTUAL_NETWORK_RULES)
}

fn network_interfaces(scope: &Scope<'_>) -> Outcome {
    non_empty_list(scope, NETWORK_INTERFACE_RULES)
}

fn subnet_names(scope: &Scope<'_>) -> Outcome {
    match scope.value.and_then(Value::as_array) {
        Some(list) if !list.is_empty() => Outcome::EachItem(predicates::not_blank),
        _ => Outcome::invalid("Value cannot be null, undefined, or an empty array"),
    }
}

fn protocol(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &PROTOCOLS)
}

fn address_prefix(scope: &Scope<'_>) -> Outcome {
    Outcome::check(
        is_ip_address(scope.value)
            || is_cidr(scope.value)
            || is_string_in(scope.value, &DEFAULT_TAGS),
        format!(
            "Valid values are an IPAddress, a CIDR, or one of the following values: {}",
            predicates::allowed_list(&DEFAULT_TAGS)
        ),
    )
}

fn direction(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &DIRECTIONS)
}

fn priority(scope: &Scope<'_>) -> Outcome {
    Outcome::check(
        predicates::in_range(scope.value, 100, 4097),
        "Valid value is between 100 and 4096, inclusive",
    )
}

fn access(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &ACCESSES)
}

static CHILDREN: &ChildTable = &[
    ("virtualNetworks", subnet_updates),
    ("networkInterfaces", nic_updates),
];

fn attachment(id: String, group: &Value) -> Result<Value, TransformError> {
    Ok(json!({
        "id": id,
        "properties": { "networkSecurityGroup": reference(group_id(group)?) }
    }))
}

fn subnet_updates(
    args: &ChildArgs<'_>,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    for network in args.value.as_array().into_iter().flatten() {
        for subnet in items(network, "subnets") {
            let id = subnet_id(network, subnet.as_str().unwrap_or_default())?;
            accumulator.push(SUBNET_UPDATES, attachment(id, args.instance)?);
        }
    }
    Ok(())
}

fn nic_updates(args: &ChildArgs<'_>, accumulator: &mut Accumulator) -> Result<(), TransformError> {
    for nic in args.value.as_array().into_iter().flatten() {
        let id = node_resource_id(
            nic,
            "Microsoft.Network/networkInterfaces",
            &[text(nic, "name")],
        )?;
        accumulator.push(NIC_UPDATES, attachment(id, args.instance)?);
    }
    Ok(())
}

static HANDLERS: &HandlerTable = &[("securityRules", security_rule_properties)];

fn security_rule_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let tags = args.parent.get("tags");
    let rules: Vec<Value> = args
        .value
        .as_array()
        .into_iter()
        .flatten()
        .map(|rule| {
            json!({
                "name": rule.get("name"),
                "tags": tags,
                "properties": {
                    "direction": rule.get("direction"),
                    "priority": rule.get("priority"),
                    "sourceAddressPrefix": rule.get("sourceAddressPrefix"),
                    "destinationAddressPrefix": rule.get("destinationAddressPrefix"),
                    "sourcePortRange": rule.get("sourcePortRange"),
                    "destinationPortRange": rule.get("destinationPortRange"),
                    "access": rule.get("access"),
                    "protocol": rule.get("protocol"),
                }
            })
        })
        .collect();
    Ok(Some(json!({ "securityRules": rules })))
}
