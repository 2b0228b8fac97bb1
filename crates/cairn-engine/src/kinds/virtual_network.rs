//! virtual networks with their subnets.

use super::optional_tags;
use crate::Kind;
use cairn_core::predicates;
use cairn_core::{
    ChildTable, HandlerArgs, HandlerTable, Outcome, Policy, RuleSet, Scope, TransformError,
    TransformPlan, ValidationError,
};
use serde_json::{json, Value};

pub(crate) struct VirtualNetwork;

fn defaults() -> Value {
    json!({
        "addressPrefixes": ["10.0.0.0/16"],
        "subnets": [{ "name": "default", "addressPrefix": "10.0.1.0/24" }],
        "dnsServers": [],
        "tags": {}
    })
}

impl Policy for VirtualNetwork {
    fn key(&self) -> &'static str {
        Kind::VirtualNetwork.key()
    }

    fn defaults(&self, _instance: &Value) -> Result<Value, ValidationError> {
        Ok(defaults())
    }

    /// given subnets replace the default subnet instead of merging over it.
    fn customize(&self, key: &str, settings: Option<&Value>, default: &Value) -> Option<Value> {
        if key != "subnets" {
            return None;
        }
        match settings {
            None => Some(default.clone()),
            Some(Value::Array(list)) if list.is_empty() => Some(default.clone()),
            Some(given) => Some(given.clone()),
        }
    }

    fn rules(&self) -> &'static RuleSet {
        RULES
    }

    fn plan(&self) -> TransformPlan {
        TransformPlan {
            collection: "virtualNetworks",
            children: NO_CHILDREN,
            handlers: HANDLERS,
        }
    }
}

static RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("addressPrefixes", address_prefixes),
    ("subnets", subnets),
    ("dnsServers", dns_servers),
    ("tags", optional_tags),
];

static SUBNET_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("addressPrefix", predicates::cidr),
];

fn address_prefixes(scope: &Scope<'_>) -> Outcome {
    match scope.value.and_then(Value::as_array) {
        Some(list) if !list.is_empty() => Outcome::EachItem(predicates::cidr),
        _ => Outcome::invalid("Value must be a non-empty array"),
    }
}

fn subnets(scope: &Scope<'_>) -> Outcome {
    match scope.value.and_then(Value::as_array) {
        Some(list) if !list.is_empty() => Outcome::Descend(SUBNET_RULES),
        _ => Outcome::invalid("Value must be a non-empty array"),
    }
}

fn dns_servers(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        return Outcome::Valid;
    }
    Outcome::EachItem(predicates::ip_address)
}

static NO_CHILDREN: &ChildTable = &[];

static HANDLERS: &HandlerTable = &[
    ("addressPrefixes", address_space),
    ("subnets", subnet_properties),
    ("dnsServers", dhcp_options),
];

fn address_space(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    Ok(Some(json!({ "addressSpace": { "addressPrefixes": args.value } })))
}

fn subnet_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let subnets: Vec<Value> = args
        .value
        .as_array()
        .into_iter()
        .flatten()
        .map(|subnet| {
            json!({
                "name": subnet.get("name"),
                "properties": { "addressPrefix": subnet.get("addressPrefix") }
            })
        })
        .collect();
    Ok(Some(json!({ "subnets": subnets })))
}

fn dhcp_options(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    Ok(Some(json!({ "dhcpOptions": { "dnsServers": args.value } })))
}
