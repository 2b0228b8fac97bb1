//! load balancers: frontends, balancing rules, probes, pools and nat rules.

use super::{cross_reference, items, public_ip, reference, subnet_id, text, vm_count};
use crate::Kind;
use cairn_core::predicates::{self, is_nil_or_blank};
use cairn_core::{
    merge_with_template, node_resource_id, Accumulator, ChildArgs, ChildTable, HandlerArgs,
    HandlerTable, Outcome, Policy, RuleSet, Scope, TransformError, TransformPlan,
};
use serde_json::{json, Value};

pub(crate) struct LoadBalancer;

const TYPES: [&str; 2] = ["Public", "Internal"];
const PROTOCOLS: [&str; 2] = ["Tcp", "Udp"];
const PROBE_PROTOCOLS: [&str; 2] = ["Http", "Tcp"];
const LOAD_DISTRIBUTIONS: [&str; 3] = ["Default", "SourceIP", "SourceIPProtocol"];

/// arrays whose default element is only a template, never an instance.
const TEMPLATE_ONLY: [&str; 3] = ["loadBalancingRules", "probes", "inboundNatRules"];

fn defaults() -> Value {
    json!({
        "name": "default-lb",
        "vmCount": 1,
        "frontendIPConfigurations": [
            { "name": "default-feConfig", "loadBalancerType": "Public" }
        ],
        "loadBalancingRules": [
            { "loadDistribution": "Default", "enableFloatingIP": false }
        ],
        "probes": [
            { "intervalInSeconds": 15, "numberOfProbes": 2 }
        ],
        "backendPools": [],
        "inboundNatRules": [
            { "enableFloatingIP": false }
        ]
    })
}

impl Policy for LoadBalancer {
    fn key(&self) -> &'static str {
        Kind::LoadBalancer.key()
    }

    fn defaults(&self, _instance: &Value) -> Result<Value, cairn_core::ValidationError> {
        Ok(defaults())
    }

    fn customize(&self, key: &str, settings: Option<&Value>, default: &Value) -> Option<Value> {
        let given = settings
            .and_then(Value::as_array)
            .filter(|given| !given.is_empty());
        if key == "frontendIPConfigurations" {
            let given = match given {
                Some(given) => given,
                None => return Some(default.clone()),
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
            collection: "loadBalancers",
            children: CHILDREN,
            handlers: HANDLERS,
        }
    }
}

static RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("frontendIPConfigurations", frontend_ip_configurations),
    ("loadBalancingRules", load_balancing_rules),
    ("probes", probes),
    ("backendPools", backend_pools),
    ("inboundNatRules", inbound_nat_rules),
    ("virtualNetwork", virtual_network),
    ("vmCount", vm_count),
];

static FRONTEND_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("loadBalancerType", load_balancer_type),
    ("internalLoadBalancerSettings", internal_settings),
    ("domainNameLabel", public_ip::domain_name_label),
];

static INTERNAL_RULES: &RuleSet = &[
    ("privateIPAddress", predicates::ip_address),
    ("subnetName", predicates::not_blank),
];

static LOAD_BALANCING_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("frontendIPConfigurationName", rule_frontend),
    ("backendPoolName", rule_backend_pool),
    ("frontendPort", frontend_port),
    ("backendPort", backend_port),
    ("protocol", protocol),
    ("enableFloatingIP", predicates::boolean),
    ("idleTimeoutInMinutes", idle_timeout),
    ("probeName", rule_probe),
    ("loadDistribution", load_distribution),
];

static PROBE_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("protocol", probe_protocol),
    ("port", backend_port),
    ("intervalInSeconds", probe_interval),
    ("requestPath", request_path),
    ("numberOfProbes", probe_count),
];

static POOL_RULES: &RuleSet = &[("name", predicates::not_blank)];

static NAT_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("protocol", protocol),
    ("startingFrontendPort", frontend_port),
    ("backendPort", backend_port),
    ("idleTimeoutInMinutes", idle_timeout),
    ("enableFloatingIP", predicates::boolean),
    ("frontendIPConfigurationName", nat_frontend),
];

static VIRTUAL_NETWORK_RULES: &RuleSet = &[("name", predicates::not_blank)];

fn frontend_ip_configurations(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(FRONTEND_RULES)
}

fn load_balancing_rules(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(LOAD_BALANCING_RULES)
}

fn probes(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(PROBE_RULES)
}

fn backend_pools(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(POOL_RULES)
}

fn inbound_nat_rules(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(NAT_RULES)
}

/// required once any frontend is internal.
fn virtual_network(scope: &Scope<'_>) -> Outcome {
    let internal = items(scope.parent, "frontendIPConfigurations")
        .iter()
        .any(|config| text(config, "loadBalancerType") == "Internal");
    if internal {
        Outcome::Descend(VIRTUAL_NETWORK_RULES)
    } else {
        Outcome::Valid
    }
}

fn load_balancer_type(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &TYPES)
}

fn internal_settings(scope: &Scope<'_>) -> Outcome {
    match scope.sibling_str("loadBalancerType") {
        Some("Public") if !scope.is_nil() => Outcome::invalid(
            "If loadBalancerType is Public, internalLoadBalancerSettings cannot be specified",
        ),
        Some("Internal") => Outcome::Descend(INTERNAL_RULES),
        _ => Outcome::Valid,
    }
}

fn rule_frontend(scope: &Scope<'_>) -> Outcome {
    cross_reference(
        scope,
        "frontendIPConfigurations",
        "frontendIPConfigurationName",
        "loadBalancingRule",
    )
}

fn rule_backend_pool(scope: &Scope<'_>) -> Outcome {
    cross_reference(scope, "backendPools", "backendPoolName", "loadBalancingRule")
}

fn rule_probe(scope: &Scope<'_>) -> Outcome {
    cross_reference(scope, "probes", "probeName", "loadBalancingRule")
}

fn nat_frontend(scope: &Scope<'_>) -> Outcome {
    cross_reference(
        scope,
        "frontendIPConfigurations",
        "frontendIPConfigurationName",
        "inboundNatRule",
    )
}

fn frontend_port(scope: &Scope<'_>) -> Outcome {
    predicates::between(scope, 1, 65535)
}

fn backend_port(scope: &Scope<'_>) -> Outcome {
    predicates::between(scope, 1, 65536)
}

fn protocol(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &PROTOCOLS)
}

fn idle_timeout(scope: &Scope<'_>) -> Outcome {
    match scope.sibling_str("protocol") {
        Some("Tcp") if !scope.is_nil() => predicates::between(scope, 4, 31),
        Some("Udp") if !scope.is_nil() => {
            Outcome::invalid("If protocol is Udp, idleTimeoutInMinutes cannot be specified")
        }
        _ => Outcome::Valid,
    }
}

fn load_distribution(scope: &Scope<'_>) -> Outcome {
    if scope.value.is_none() {
        return Outcome::Valid;
    }
    predicates::one_of(scope, &LOAD_DISTRIBUTIONS)
}

fn probe_protocol(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &PROBE_PROTOCOLS)
}

fn probe_interval(scope: &Scope<'_>) -> Outcome {
    predicates::between(scope, 5, 300)
}

fn probe_count(scope: &Scope<'_>) -> Outcome {
    predicates::between(scope, 1, 20)
}

fn request_path(scope: &Scope<'_>) -> Outcome {
    match scope.sibling_str("protocol") {
        Some("Http") if is_nil_or_blank(scope.value) => Outcome::invalid(
            "If protocol is Http, requestPath cannot be null, undefined, or only whitespace",
        ),
        Some("Tcp") if !scope.is_nil() => {
            Outcome::invalid("If protocol is Tcp, requestPath cannot be provided")
        }
        _ => Outcome::Valid,
    }
}

static CHILDREN: &ChildTable = &[("frontendIPConfigurations", frontend_pips)];

/// one static public ip per public frontend, named `{config}-pip`.
fn frontend_pips(
    args: &ChildArgs<'_>,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    for config in args.value.as_array().into_iter().flatten() {
        if text(config, "loadBalancerType") != "Public" {
            continue;
        }
        let mut settings = json!({ "publicIPAllocationMethod": "Static" });
        if let Some(label) = config.get("domainNameLabel") {
            settings["domainNameLabel"] = label.clone();
        }
        let name = format!("{}-pip", text(config, "name"));
        let pip = public_ip::build(&name, &settings, args.instance, args.context)?;
        accumulator.push(public_ip::COLLECTION, pip);
    }
    Ok(())
}

static HANDLERS: &HandlerTable = &[
    ("frontendIPConfigurations", frontend_configurations),
    ("loadBalancingRules", balancing_rules),
    ("probes", probe_properties),
    ("backendPools", pool_properties),
    ("inboundNatRules", nat_rule_properties),
];

/// id of a child of this load balancer, e.g. `probes/p1`.
fn child_id(lb: &Value, child_type: &str, name: &str) -> Result<String, TransformError> {
    Ok(node_resource_id(
        lb,
        &format!("Microsoft.Network/loadBalancers/{child_type}"),
        &[text(lb, "name"), name],
    )?)
}

fn frontend_configurations(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let lb = args.parent;
    let mut configs = Vec::new();
    for config in args.value.as_array().into_iter().flatten() {
        let name = text(config, "name");
        let properties = match text(config, "loadBalancerType") {
            "Internal" => {
                let internal = config
                    .get("internalLoadBalancerSettings")
                    .ok_or_else(|| TransformError::missing(name, "internalLoadBalancerSettings"))?;
                let network = lb
                    .get("virtualNetwork")
                    .ok_or_else(|| TransformError::missing(text(lb, "name"), "virtualNetwork"))?;
                json!({
                    "privateIPAllocationMethod": "Static",
                    "privateIPAddress": internal.get("privateIPAddress"),
                    "subnet": reference(subnet_id(network, text(internal, "subnetName"))?),
                })
            }
            _ => json!({
                "privateIPAllocationMethod": "Dynamic",
                "publicIPAddress": reference(public_ip::id(lb, &format!("{name}-pip"))?),
            }),
        };
        configs.push(json!({ "name": name, "properties": properties }));
    }
    Ok(Some(json!({ "frontendIPConfigurations": configs })))
}

fn balancing_rules(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let lb = args.parent;
    let mut rules = Vec::new();
    for rule in args.value.as_array().into_iter().flatten() {
        let frontend = child_id(
            lb,
            "frontendIPConfigurations",
            text(rule, "frontendIPConfigurationName"),
        )?;
        let pool = child_id(lb, "backendAddressPools", text(rule, "backendPoolName"))?;
        let mut properties = json!({
            "frontendIPConfiguration": reference(frontend),
            "backendAddressPool": reference(pool),
            "probe": reference(child_id(lb, "probes", text(rule, "probeName"))?),
            "frontendPort": rule.get("frontendPort"),
            "backendPort": rule.get("backendPort"),
            "protocol": rule.get("protocol"),
            "enableFloatingIP": rule.get("enableFloatingIP"),
            "loadDistribution": rule.get("loadDistribution"),
        });
        if let Some(timeout) = rule.get("idleTimeoutInMinutes") {
            properties["idleTimeoutInMinutes"] = timeout.clone();
        }
        rules.push(json!({ "name": text(rule, "name"), "properties": properties }));
    }
    Ok(Some(json!({ "loadBalancingRules": rules })))
}

fn probe_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let probes: Vec<Value> = args
        .value
        .as_array()
        .into_iter()
        .flatten()
        .map(|probe| {
            let mut properties = json!({
                "port": probe.get("port"),
                "protocol": probe.get("protocol"),
                "intervalInSeconds": probe.get("intervalInSeconds"),
                "numberOfProbes": probe.get("numberOfProbes"),
            });
            if let Some(path) = probe.get("requestPath").filter(|path| !path.is_null()) {
                properties["requestPath"] = path.clone();
            }
            json!({ "name": text(probe, "name"), "properties": properties })
        })
        .collect();
    Ok(Some(json!({ "probes": probes })))
}

fn pool_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let pools: Vec<Value> = args
        .value
        .as_array()
        .into_iter()
        .flatten()
        .map(|pool| json!({ "name": text(pool, "name") }))
        .collect();
    Ok(Some(json!({ "backendAddressPools": pools })))
}

/// every nat rule is stamped once per backing vm as `{rule}-{i}`.
fn nat_rule_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let lb = args.parent;
    let vm_count = lb.get("vmCount").and_then(Value::as_u64).unwrap_or(1);
    let mut rules = Vec::new();
    for rule in args.value.as_array().into_iter().flatten() {
        let frontend = child_id(
            lb,
            "frontendIPConfigurations",
            text(rule, "frontendIPConfigurationName"),
        )?;
        let starting = rule
            .get("startingFrontendPort")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        for index in 0..vm_count {
            let mut properties = json!({
                "frontendIPConfiguration": reference(frontend.clone()),
                "protocol": rule.get("protocol"),
                "enableFloatingIP": rule.get("enableFloatingIP"),
                "frontendPort": starting + index,
                "backendPort": rule.get("backendPort"),
            });
            if let Some(timeout) = rule.get("idleTimeoutInMinutes") {
                properties["idleTimeoutInMinutes"] = timeout.clone();
            }
            rules.push(json!({
                "name": format!("{}-{index}", text(rule, "name")),
                "properties": properties,
            }));
        }
    }
    Ok(Some(json!({ "inboundNatRules": rules })))
}
