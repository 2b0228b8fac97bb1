//! application gateways: listeners, routing rules, path maps, pools, probes
//! and the optional web application firewall.
//!
//! every named child (listener, pool, http settings, ...) is referenced by
//! name from its siblings; those references are checked against the gateway
//! root and rendered as child resource ids.

use super::{items, public_ip, reference, subnet_id, text};
use crate::Kind;
use cairn_core::predicates::{self, is_ip_address, is_nil_or_blank, is_status_code_range};
use cairn_core::{
    merge_with_template, node_resource_id, Accumulator, ChildArgs, ChildTable, HandlerArgs,
    HandlerTable, Outcome, Policy, RuleSet, Scope, TransformError, TransformPlan, ValidationError,
};
use serde_json::{json, Value};

pub(crate) struct ApplicationGateway;

const RESOURCE_TYPE: &str = "Microsoft.Network/applicationGateways";

const TIERS: [&str; 2] = ["Standard", "WAF"];
const SIZES: [&str; 3] = ["Small", "Medium", "Large"];
const WAF_SIZES: [&str; 2] = ["Medium", "Large"];
const GATEWAY_TYPES: [&str; 2] = ["Public", "Internal"];
const PROTOCOLS: [&str; 2] = ["Http", "Https"];
const AFFINITIES: [&str; 2] = ["Enabled", "Disabled"];
const RULE_TYPES: [&str; 2] = ["Basic", "PathBasedRouting"];
const FIREWALL_MODES: [&str; 2] = ["Detection", "Prevention"];
const RULE_SET_TYPES: [&str; 1] = ["OWASP"];
const RULE_SET_VERSIONS: [&str; 2] = ["2.2.9", "3.0"];

/// arrays whose default element is only a template, never an instance.
const TEMPLATE_ONLY: [&str; 4] = [
    "backendHttpSettingsCollection",
    "httpListeners",
    "requestRoutingRules",
    "probes",
];

fn defaults() -> Value {
    json!({
        "sku": { "tier": "Standard", "size": "Medium", "capacity": 2 },
        "gatewayIPConfigurations": [],
        "frontendIPConfigurations": [
            { "name": "default-feConfig", "applicationGatewayType": "Public" }
        ],
        "frontendPorts": [],
        "backendAddressPools": [],
        "backendHttpSettingsCollection": [{
            "cookieBasedAffinity": "Disabled",
            "pickHostNameFromBackendAddress": false,
            "probeEnabled": true,
            "requestTimeout": 30
        }],
        "httpListeners": [{ "requireServerNameIndication": false }],
        "urlPathMaps": [],
        "requestRoutingRules": [{ "ruleType": "Basic" }],
        "probes": [{
            "interval": 30,
            "timeout": 30,
            "unhealthyThreshold": 3,
            "pickHostNameFromBackendHttpSettings": false
        }],
        "virtualNetwork": {}
    })
}

impl Policy for ApplicationGateway {
    fn key(&self) -> &'static str {
        Kind::ApplicationGateway.key()
    }

    fn defaults(&self, _instance: &Value) -> Result<Value, ValidationError> {
        Ok(defaults())
    }

    fn customize(&self, key: &str, settings: Option<&Value>, default: &Value) -> Option<Value> {
        if key == "frontendIPConfigurations" {
            let given = settings
                .and_then(Value::as_array)
                .filter(|given| !given.is_empty());
            let Some(given) = given else {
                return Some(default.clone());
            };
            let mut template = default
                .as_array()
                .and_then(|list| list.first())
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            template.remove("name");
            return Some(Value::Array(merge_with_template(given, &template, None)));
        }
        if TEMPLATE_ONLY.contains(&key) && settings.is_none() {
            return Some(json!([]));
        }
        None
    }

    fn is_resource_key(&self, key: Option<&str>) -> bool {
        matches!(key, None | Some("virtualNetwork"))
    }

    fn rules(&self) -> &'static RuleSet {
        RULES
    }

    fn plan(&self) -> TransformPlan {
        TransformPlan {
            collection: "applicationGateways",
            children: CHILDREN,
            handlers: HANDLERS,
        }
    }
}

static RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("sku", sku),
    ("gatewayIPConfigurations", gateway_ip_configurations),
    ("frontendIPConfigurations", frontend_ip_configurations),
    ("frontendPorts", frontend_ports),
    ("backendAddressPools", backend_address_pools),
    ("backendHttpSettingsCollection", backend_http_settings),
    ("httpListeners", http_listeners),
    ("urlPathMaps", url_path_maps),
    ("requestRoutingRules", request_routing_rules),
    ("probes", probes),
    ("webApplicationFirewallConfiguration", firewall),
    ("virtualNetwork", virtual_network),
];

static SKU_RULES: &RuleSet = &[
    ("tier", tier),
    ("size", size),
    ("capacity", capacity),
];

static GATEWAY_IP_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("subnetName", predicates::not_blank),
];

static FRONTEND_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("applicationGatewayType", gateway_type),
    ("internalApplicationGatewaySettings", internal_settings),
];

static INTERNAL_RULES: &RuleSet = &[("subnetName", predicates::not_blank)];

static FRONTEND_PORT_RULES: &RuleSet = &[("name", predicates::not_blank), ("port", port)];

static POOL_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("backendAddresses", backend_addresses),
];

static ADDRESS_RULES: &RuleSet = &[("fqdn", fqdn), ("ipAddress", ip_address)];

static HTTP_SETTINGS_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("port", port),
    ("protocol", protocol),
    ("cookieBasedAffinity", cookie_affinity),
    ("pickHostNameFromBackendAddress", predicates::boolean),
    ("probeEnabled", predicates::boolean),
    ("probeName", settings_probe),
    ("requestTimeout", request_timeout),
];

static LISTENER_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("frontendIPConfigurationName", listener_frontend),
    ("frontendPortName", listener_port),
    ("protocol", protocol),
    ("requireServerNameIndication", predicates::boolean),
];

static PATH_MAP_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("defaultBackendAddressPoolName", map_pool),
    ("defaultBackendHttpSettingName", map_settings),
    ("pathRules", path_rules),
];

static PATH_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("backendAddressPoolName", path_pool),
    ("backendHttpSettingName", path_settings),
];

static ROUTING_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("httpListenerName", routing_listener),
    ("ruleType", rule_type),
    ("backendAddressPoolName", routing_pool),
    ("backendHttpSettingName", routing_settings),
    ("urlPathMapName", routing_path_map),
];

static PROBE_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("protocol", protocol),
    ("host", predicates::not_blank),
    ("path", probe_path),
    ("interval", probe_seconds),
    ("timeout", probe_seconds),
    ("unhealthyThreshold", unhealthy_threshold),
    ("pickHostNameFromBackendHttpSettings", predicates::boolean),
    ("minServers", min_servers),
    ("match", probe_match),
];

static MATCH_RULES: &RuleSet = &[("statusCodes", status_codes)];

static FIREWALL_RULES: &RuleSet = &[
    ("enabled", predicates::boolean),
    ("firewallMode", firewall_mode),
    ("ruleSetType", rule_set_type),
    ("ruleSetVersion", rule_set_version),
    ("disabledRuleGroups", disabled_rule_groups),
];

static NAMED_RULES: &RuleSet = &[("name", predicates::not_blank)];

/// cross-reference against a collection on the gateway root.
fn named_on_root(scope: &Scope<'_>, collection: &str, field: &str, owner: &str) -> Outcome {
    let wanted = scope.as_str();
    let found = wanted.is_some_and(|wanted| {
        items(scope.lineage.root(), collection)
            .iter()
            .any(|item| text(item, "name") == wanted)
    });
    Outcome::check(
        found,
        format!(
            "Invalid {field}. {owner}: {}, {field}: {}",
            scope.sibling_str("name").unwrap_or_default(),
            wanted.unwrap_or_default()
        ),
    )
}

fn sku(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(SKU_RULES)
}

fn tier(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &TIERS)
}

fn size(scope: &Scope<'_>) -> Outcome {
    if scope.sibling_str("tier") == Some("WAF") {
        return Outcome::check(
            predicates::is_string_in(scope.value, &WAF_SIZES),
            format!(
                "If tier is WAF, valid values are {}",
                predicates::allowed_list(&WAF_SIZES)
            ),
        );
    }
    predicates::one_of(scope, &SIZES)
}

fn capacity(scope: &Scope<'_>) -> Outcome {
    predicates::between(scope, 1, 11)
}

fn gateway_ip_configurations(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(GATEWAY_IP_RULES)
}

/// at most two frontends, at most one per type.
fn frontend_ip_configurations(scope: &Scope<'_>) -> Outcome {
    let Some(list) = scope.value.and_then(Value::as_array) else {
        return Outcome::invalid("Value must be an array");
    };
    let of_type = |wanted: &str| {
        list.iter()
            .filter(|config| text(config, "applicationGatewayType") == wanted)
            .count()
    };
    if list.len() > 2 || of_type("Public") > 1 || of_type("Internal") > 1 {
        return Outcome::invalid(
            "Only one Public and one Internal frontendIPConfiguration can be specified",
        );
    }
    Outcome::Descend(FRONTEND_RULES)
}

fn gateway_type(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &GATEWAY_TYPES)
}

fn internal_settings(scope: &Scope<'_>) -> Outcome {
    match scope.sibling_str("applicationGatewayType") {
        Some("Internal") if scope.is_nil() => Outcome::invalid(
            "If applicationGatewayType is Internal, internalApplicationGatewaySettings must be specified",
        ),
        Some("Internal") => Outcome::Descend(INTERNAL_RULES),
        _ if !scope.is_nil() => Outcome::invalid(
            "If applicationGatewayType is not Internal, internalApplicationGatewaySettings cannot be specified",
        ),
        _ => Outcome::Valid,
    }
}

fn frontend_ports(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(FRONTEND_PORT_RULES)
}

fn port(scope: &Scope<'_>) -> Outcome {
    predicates::between(scope, 0, 65536)
}

fn backend_address_pools(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(POOL_RULES)
}

fn backend_addresses(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        Outcome::Valid
    } else {
        Outcome::Descend(ADDRESS_RULES)
    }
}

/// exactly one of `fqdn` and `ipAddress`; the shared checks for both fields.
fn exclusive_address(scope: &Scope<'_>, other: &str) -> Option<Outcome> {
    let other_given = !matches!(scope.sibling(other), None | Some(Value::Null));
    match (scope.is_nil(), other_given) {
        (true, false) => Some(Outcome::invalid(
            "Either fqdn or ipAddress must be specified",
        )),
        (false, true) => Some(Outcome::invalid(
            "Only one of fqdn or ipAddress can be specified",
        )),
        (true, true) => Some(Outcome::Valid),
        (false, false) => None,
    }
}

fn fqdn(scope: &Scope<'_>) -> Outcome {
    exclusive_address(scope, "ipAddress").unwrap_or_else(|| predicates::not_blank(scope))
}

fn ip_address(scope: &Scope<'_>) -> Outcome {
    exclusive_address(scope, "fqdn").unwrap_or_else(|| {
        Outcome::check(is_ip_address(scope.value), "Value must be a valid IP address")
    })
}

fn backend_http_settings(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(HTTP_SETTINGS_RULES)
}

fn protocol(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &PROTOCOLS)
}

fn cookie_affinity(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &AFFINITIES)
}

fn settings_probe(scope: &Scope<'_>) -> Outcome {
    let probing = scope.sibling("probeEnabled").and_then(Value::as_bool) == Some(true);
    if !probing || scope.is_nil() {
        return Outcome::Valid;
    }
    named_on_root(scope, "probes", "probeName", "backendHttpSettings")
}

fn request_timeout(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        return Outcome::Valid;
    }
    predicates::between(scope, 1, 86401)
}

fn http_listeners(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(LISTENER_RULES)
}

fn listener_frontend(scope: &Scope<'_>) -> Outcome {
    named_on_root(
        scope,
        "frontendIPConfigurations",
        "frontendIPConfigurationName",
        "httpListener",
    )
}

fn listener_port(scope: &Scope<'_>) -> Outcome {
    named_on_root(scope, "frontendPorts", "frontendPortName", "httpListener")
}

fn url_path_maps(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(PATH_MAP_RULES)
}

fn map_pool(scope: &Scope<'_>) -> Outcome {
    named_on_root(
        scope,
        "backendAddressPools",
        "defaultBackendAddressPoolName",
        "urlPathMap",
    )
}

fn map_settings(scope: &Scope<'_>) -> Outcome {
    named_on_root(
        scope,
        "backendHttpSettingsCollection",
        "defaultBackendHttpSettingName",
        "urlPathMap",
    )
}

fn path_rules(scope: &Scope<'_>) -> Outcome {
    let Some(rules) = scope.value.and_then(Value::as_array).filter(|list| !list.is_empty()) else {
        return Outcome::invalid("Value cannot be null, undefined, or an empty array");
    };
    let has_paths = rules
        .iter()
        .all(|rule| !items(rule, "paths").is_empty());
    if !has_paths {
        return Outcome::invalid("Every pathRule must specify at least one path");
    }
    Outcome::Descend(PATH_RULES)
}

fn path_pool(scope: &Scope<'_>) -> Outcome {
    named_on_root(scope, "backendAddressPools", "backendAddressPoolName", "pathRule")
}

fn path_settings(scope: &Scope<'_>) -> Outcome {
    named_on_root(
        scope,
        "backendHttpSettingsCollection",
        "backendHttpSettingName",
        "pathRule",
    )
}

fn request_routing_rules(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(ROUTING_RULES)
}

fn routing_listener(scope: &Scope<'_>) -> Outcome {
    named_on_root(scope, "httpListeners", "httpListenerName", "requestRoutingRule")
}

fn rule_type(scope: &Scope<'_>) -> Outcome {
    if !predicates::is_string_in(scope.value, &RULE_TYPES) {
        return predicates::one_of(scope, &RULE_TYPES);
    }
    let maps = items(scope.lineage.root(), "urlPathMaps");
    Outcome::check(
        scope.as_str() != Some("PathBasedRouting") || !maps.is_empty(),
        "If ruleType is PathBasedRouting, urlPathMaps cannot be null, undefined, or empty",
    )
}

fn routing_pool(scope: &Scope<'_>) -> Outcome {
    if scope.sibling_str("ruleType") != Some("Basic") {
        return Outcome::Valid;
    }
    named_on_root(
        scope,
        "backendAddressPools",
        "backendAddressPoolName",
        "requestRoutingRule",
    )
}

fn routing_settings(scope: &Scope<'_>) -> Outcome {
    if scope.sibling_str("ruleType") != Some("Basic") {
        return Outcome::Valid;
    }
    named_on_root(
        scope,
        "backendHttpSettingsCollection",
        "backendHttpSettingName",
        "requestRoutingRule",
    )
}

fn routing_path_map(scope: &Scope<'_>) -> Outcome {
    if scope.sibling_str("ruleType") != Some("PathBasedRouting") {
        return Outcome::Valid;
    }
    named_on_root(scope, "urlPathMaps", "urlPathMapName", "requestRoutingRule")
}

fn probes(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(PROBE_RULES)
}

fn probe_path(scope: &Scope<'_>) -> Outcome {
    Outcome::check(
        scope.as_str().is_some_and(|path| path.starts_with('/')),
        "Value must start with /",
    )
}

fn probe_seconds(scope: &Scope<'_>) -> Outcome {
    predicates::between(scope, 1, 86401)
}

fn unhealthy_threshold(scope: &Scope<'_>) -> Outcome {
    predicates::between(scope, 1, 21)
}

fn min_servers(scope: &Scope<'_>) -> Outcome {
    if scope.value.is_none() {
        return Outcome::Valid;
    }
    Outcome::check(
        scope.value.and_then(Value::as_i64).is_some_and(|n| n >= 0),
        "Value must be greater than or equal to 0",
    )
}

fn probe_match(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        Outcome::Valid
    } else {
        Outcome::Descend(MATCH_RULES)
    }
}

fn status_codes(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        return Outcome::Valid;
    }
    let valid = scope
        .value
        .and_then(Value::as_array)
        .is_some_and(|codes| codes.iter().all(|code| is_status_code_range(Some(code))));
    Outcome::check(
        valid,
        "Values must be status codes (200) or ranges of status codes (200-399)",
    )
}

fn firewall(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        Outcome::Valid
    } else {
        Outcome::Descend(FIREWALL_RULES)
    }
}

fn firewall_mode(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &FIREWALL_MODES)
}

fn rule_set_type(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &RULE_SET_TYPES)
}

fn rule_set_version(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        return Outcome::Valid;
    }
    predicates::one_of(scope, &RULE_SET_VERSIONS)
}

fn disabled_rule_groups(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        return Outcome::Valid;
    }
    let Some(groups) = scope.value.and_then(Value::as_array) else {
        return Outcome::invalid("Value must be an array");
    };
    Outcome::check(
        groups
            .iter()
            .all(|group| !is_nil_or_blank(group.get("ruleGroupName"))),
        "Every disabled rule group must specify a ruleGroupName",
    )
}

/// a subnet is needed once any configuration is placed on the network.
fn virtual_network(scope: &Scope<'_>) -> Outcome {
    let internal = items(scope.parent, "frontendIPConfigurations")
        .iter()
        .any(|config| text(config, "applicationGatewayType") == "Internal");
    if internal || !items(scope.parent, "gatewayIPConfigurations").is_empty() {
        Outcome::Descend(NAMED_RULES)
    } else {
        Outcome::Valid
    }
}

static CHILDREN: &ChildTable = &[("frontendIPConfigurations", frontend_pips)];

fn pip_name(gateway: &Value, config: &Value) -> String {
    format!("{}-{}-pip", text(gateway, "name"), text(config, "name"))
}

/// one dynamic public ip per public frontend, named `{gateway}-{config}-pip`.
fn frontend_pips(
    args: &ChildArgs<'_>,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    for config in args.value.as_array().into_iter().flatten() {
        if text(config, "applicationGatewayType") != "Public" {
            continue;
        }
        let settings = json!({ "publicIPAllocationMethod": "Dynamic" });
        let name = pip_name(args.instance, config);
        let pip = public_ip::build(&name, &settings, args.instance, args.context)?;
        accumulator.push(public_ip::COLLECTION, pip);
    }
    Ok(())
}

static HANDLERS: &HandlerTable = &[
    ("sku", sku_properties),
    ("gatewayIPConfigurations", gateway_ip_properties),
    ("frontendIPConfigurations", frontend_properties),
    ("frontendPorts", frontend_port_properties),
    ("backendAddressPools", pool_properties),
    ("backendHttpSettingsCollection", http_settings_properties),
    ("httpListeners", listener_properties),
    ("urlPathMaps", path_map_properties),
    ("requestRoutingRules", routing_rule_properties),
    ("probes", probe_properties),
    ("webApplicationFirewallConfiguration", firewall_properties),
];

/// `{ "id": ... }` of a named child of this gateway.
fn child(gateway: &Value, child_type: &str, name: &str) -> Result<Value, TransformError> {
    let id = node_resource_id(
        gateway,
        &format!("{RESOURCE_TYPE}/{child_type}"),
        &[text(gateway, "name"), name],
    )?;
    Ok(reference(id))
}

/// render every element of the handled array as `{name, properties}`.
fn named_children(
    args: &HandlerArgs<'_>,
    render: impl Fn(&Value) -> Result<Value, TransformError>,
) -> Result<Option<Value>, TransformError> {
    let mut rendered = Vec::new();
    for element in args.value.as_array().into_iter().flatten() {
        rendered.push(json!({ "name": text(element, "name"), "properties": render(element)? }));
    }
    Ok(Some(json!({ args.key: rendered })))
}

fn sku_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let sku = args.value;
    Ok(Some(json!({
        "sku": {
            "name": format!("{}_{}", text(sku, "tier"), text(sku, "size")),
            "tier": sku.get("tier"),
            "capacity": sku.get("capacity"),
        }
    })))
}

fn gateway_subnet(gateway: &Value, subnet: &str) -> Result<Value, TransformError> {
    let network = gateway
        .get("virtualNetwork")
        .ok_or_else(|| TransformError::missing(text(gateway, "name"), "virtualNetwork"))?;
    Ok(reference(subnet_id(network, subnet)?))
}

fn gateway_ip_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    named_children(args, |config| {
        Ok(json!({ "subnet": gateway_subnet(args.parent, text(config, "subnetName"))? }))
    })
}

fn frontend_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let gateway = args.parent;
    named_children(args, |config| match text(config, "applicationGatewayType") {
        "Internal" => {
            let internal = config
                .get("internalApplicationGatewaySettings")
                .cloned()
                .unwrap_or(Value::Null);
            Ok(json!({
                "privateIPAllocationMethod": "Dynamic",
                "subnet": gateway_subnet(gateway, text(&internal, "subnetName"))?,
            }))
        }
        _ => Ok(json!({
            "publicIPAddress": reference(public_ip::id(gateway, &pip_name(gateway, config))?),
        })),
    })
}

fn frontend_port_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    named_children(args, |port| Ok(json!({ "port": port.get("port") })))
}

fn pool_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    named_children(args, |pool| {
        Ok(json!({ "backendAddresses": items(pool, "backendAddresses") }))
    })
}

fn http_settings_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let gateway = args.parent;
    named_children(args, |settings| {
        let mut properties = json!({
            "port": settings.get("port"),
            "protocol": settings.get("protocol"),
            "cookieBasedAffinity": settings.get("cookieBasedAffinity"),
            "pickHostNameFromBackendAddress": settings.get("pickHostNameFromBackendAddress"),
            "requestTimeout": settings.get("requestTimeout"),
        });
        let probing = settings.get("probeEnabled").and_then(Value::as_bool) == Some(true);
        let probe = text(settings, "probeName");
        if probing && !probe.is_empty() {
            properties["probe"] = child(gateway, "probes", probe)?;
        }
        Ok(properties)
    })
}

fn listener_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let gateway = args.parent;
    named_children(args, |listener| {
        let frontend = text(listener, "frontendIPConfigurationName");
        Ok(json!({
            "frontendIPConfiguration": child(gateway, "frontendIPConfigurations", frontend)?,
            "frontendPort": child(gateway, "frontendPorts", text(listener, "frontendPortName"))?,
            "protocol": listener.get("protocol"),
            "requireServerNameIndication": listener.get("requireServerNameIndication"),
        }))
    })
}

fn path_map_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let gateway = args.parent;
    named_children(args, |map| {
        let mut rules = Vec::new();
        for rule in items(map, "pathRules") {
            let pool = text(rule, "backendAddressPoolName");
            let settings = text(rule, "backendHttpSettingName");
            rules.push(json!({
                "name": text(rule, "name"),
                "properties": {
                    "paths": rule.get("paths"),
                    "backendAddressPool": child(gateway, "backendAddressPools", pool)?,
                    "backendHttpSettings":
                        child(gateway, "backendHttpSettingsCollection", settings)?,
                }
            }));
        }
        let pool = text(map, "defaultBackendAddressPoolName");
        let settings = text(map, "defaultBackendHttpSettingName");
        Ok(json!({
            "defaultBackendAddressPool": child(gateway, "backendAddressPools", pool)?,
            "defaultBackendHttpSettings":
                child(gateway, "backendHttpSettingsCollection", settings)?,
            "pathRules": rules,
        }))
    })
}

fn routing_rule_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let gateway = args.parent;
    named_children(args, |rule| {
        let mut properties = json!({
            "ruleType": rule.get("ruleType"),
            "httpListener": child(gateway, "httpListeners", text(rule, "httpListenerName"))?,
        });
        if text(rule, "ruleType") == "PathBasedRouting" {
            properties["urlPathMap"] = child(gateway, "urlPathMaps", text(rule, "urlPathMapName"))?;
        } else {
            properties["backendAddressPool"] =
                child(gateway, "backendAddressPools", text(rule, "backendAddressPoolName"))?;
            properties["backendHttpSettings"] = child(
                gateway,
                "backendHttpSettingsCollection",
                text(rule, "backendHttpSettingName"),
            )?;
        }
        Ok(properties)
    })
}

fn probe_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    named_children(args, |probe| {
        let mut properties = super::pick(
            probe,
            &[
                "protocol",
                "host",
                "path",
                "interval",
                "timeout",
                "unhealthyThreshold",
                "pickHostNameFromBackendHttpSettings",
                "minServers",
            ],
        );
        if let Some(matching) = probe.get("match").filter(|m| !m.is_null()) {
            properties["match"] = matching.clone();
        }
        Ok(properties)
    })
}

/// a single configuration object; a one-element list is unwrapped.
fn firewall_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let config = match args.value {
        Value::Array(list) => list.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };
    if config.is_null() {
        return Ok(None);
    }
    Ok(Some(json!({ "webApplicationFirewallConfiguration": config })))
}
