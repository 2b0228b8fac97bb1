//! gateway connections: site-to-site, vnet-to-vnet and express route.

use super::{items, reference, text};
use crate::Kind;
use cairn_core::predicates::{self, is_nil_or_blank};
use cairn_core::{
    node_resource_id, Accumulator, ChildArgs, ChildTable, HandlerArgs, HandlerTable, JsonMap,
    Outcome, Policy, ResourceDescriptor, RuleSet, Scope, TransformError, TransformPlan,
    ValidationError,
};
use serde_json::{json, Value};

pub(crate) struct Connection;

const CONNECTION_TYPES: [&str; 3] = ["IPsec", "Vnet2Vnet", "ExpressRoute"];
const LOCAL_GATEWAYS: &str = "localNetworkGateways";

impl Policy for Connection {
    fn key(&self) -> &'static str {
        Kind::Connection.key()
    }

    fn defaults(&self, _instance: &Value) -> Result<Value, ValidationError> {
        Ok(json!({ "tags": {} }))
    }

    fn is_resource_key(&self, key: Option<&str>) -> bool {
        matches!(
            key,
            None | Some(
                "virtualNetworkGateway"
                    | "virtualNetworkGateway1"
                    | "virtualNetworkGateway2"
                    | "localNetworkGateway"
                    | "expressRouteCircuit"
            )
        )
    }

    fn rules(&self) -> &'static RuleSet {
        RULES
    }

    fn plan(&self) -> TransformPlan {
        TransformPlan {
            collection: "connections",
            children: CHILDREN,
            handlers: HANDLERS,
        }
    }
}

static RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("routingWeight", routing_weight),
    ("connectionType", connection_type),
    ("sharedKey", shared_key),
    ("virtualNetworkGateway", virtual_network_gateway),
    ("virtualNetworkGateway1", vnet_to_vnet_gateway),
    ("virtualNetworkGateway2", vnet_to_vnet_gateway),
    ("localNetworkGateway", local_network_gateway),
    ("expressRouteCircuit", express_route_circuit),
    ("tags", predicates::tags),
];

static NAMED_RULES: &RuleSet = &[("name", predicates::not_blank)];

static LOCAL_GATEWAY_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("ipAddress", predicates::ip_address),
    ("addressPrefixes", address_prefixes),
];

/// the connection type, when it is one of the known ones.
fn kind_of(scope: &Scope<'_>) -> Option<&'static str> {
    let raw = scope.sibling_str("connectionType")?;
    CONNECTION_TYPES.into_iter().find(|known| *known == raw)
}

/// required (and validated) for the listed types, forbidden for the others.
fn only_for(scope: &Scope<'_>, types: &[&str], rules: &'static RuleSet) -> Outcome {
    let Some(kind) = kind_of(scope) else {
        return Outcome::Valid;
    };
    if types.contains(&kind) {
        if scope.is_nil() {
            return Outcome::invalid("Value cannot be null or undefined");
        }
        return Outcome::Descend(rules);
    }
    Outcome::check(
        scope.is_nil(),
        format!("Value cannot be specified if connectionType is {kind}"),
    )
}

fn routing_weight(scope: &Scope<'_>) -> Outcome {
    Outcome::check(
        scope.value.is_some_and(|value| value.is_i64() || value.is_u64()),
        "Value must be an integer",
    )
}

fn connection_type(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &CONNECTION_TYPES)
}

fn shared_key(scope: &Scope<'_>) -> Outcome {
    match kind_of(scope) {
        Some("IPsec" | "Vnet2Vnet") => Outcome::check(
            !is_nil_or_blank(scope.value),
            predicates::BLANK_MESSAGE,
        ),
        Some(kind) => Outcome::check(
            scope.is_nil(),
            format!("Value cannot be specified if connectionType is {kind}"),
        ),
        None => Outcome::Valid,
    }
}

fn virtual_network_gateway(scope: &Scope<'_>) -> Outcome {
    only_for(scope, &["IPsec", "ExpressRoute"], NAMED_RULES)
}

fn vnet_to_vnet_gateway(scope: &Scope<'_>) -> Outcome {
    only_for(scope, &["Vnet2Vnet"], NAMED_RULES)
}

fn local_network_gateway(scope: &Scope<'_>) -> Outcome {
    only_for(scope, &["IPsec"], LOCAL_GATEWAY_RULES)
}

fn express_route_circuit(scope: &Scope<'_>) -> Outcome {
    only_for(scope, &["ExpressRoute"], NAMED_RULES)
}

fn address_prefixes(scope: &Scope<'_>) -> Outcome {
    match scope.value.and_then(Value::as_array) {
        Some(list) if !list.is_empty() => Outcome::EachItem(predicates::cidr),
        _ => Outcome::invalid("Value must be a non-empty array"),
    }
}

static CHILDREN: &ChildTable = &[("localNetworkGateway", local_gateway)];

fn local_gateway(
    args: &ChildArgs<'_>,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    let gateway = args.value;
    let mut properties = JsonMap::new();
    properties.insert("gatewayIpAddress".to_string(), json!(gateway.get("ipAddress")));
    properties.insert(
        "localNetworkAddressSpace".to_string(),
        json!({ "addressPrefixes": items(gateway, "addressPrefixes") }),
    );
    let descriptor = ResourceDescriptor::for_node(gateway, args.context, properties);
    accumulator.push(LOCAL_GATEWAYS, descriptor.into_value()?);
    Ok(())
}

static HANDLERS: &HandlerTable = &[
    ("connectionType", connection_type_property),
    ("routingWeight", routing_weight_property),
    ("sharedKey", shared_key_property),
    ("virtualNetworkGateway", primary_gateway),
    ("virtualNetworkGateway1", primary_gateway),
    ("virtualNetworkGateway2", secondary_gateway),
    ("localNetworkGateway", local_gateway_reference),
    ("expressRouteCircuit", peer),
];

fn named_id(node: &Value, resource_type: &str) -> Result<Value, TransformError> {
    Ok(reference(node_resource_id(node, resource_type, &[text(node, "name")])?))
}

fn connection_type_property(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    Ok(Some(json!({ "connectionType": args.value })))
}

fn routing_weight_property(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    Ok(Some(json!({ "routingWeight": args.value })))
}

fn shared_key_property(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    match text(args.parent, "connectionType") {
        "IPsec" | "Vnet2Vnet" => Ok(Some(json!({ "sharedKey": args.value }))),
        _ => Ok(None),
    }
}

fn primary_gateway(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let id = named_id(args.value, "Microsoft.Network/virtualNetworkGateways")?;
    Ok(Some(json!({ "virtualNetworkGateway1": id })))
}

fn secondary_gateway(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let id = named_id(args.value, "Microsoft.Network/virtualNetworkGateways")?;
    Ok(Some(json!({ "virtualNetworkGateway2": id })))
}

fn local_gateway_reference(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let id = named_id(args.value, "Microsoft.Network/localNetworkGateways")?;
    Ok(Some(json!({ "localNetworkGateway2": id })))
}

fn peer(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let id = named_id(args.value, "Microsoft.Network/expressRouteCircuits")?;
    Ok(Some(json!({ "peer": id })))
}
