//! network interfaces stamped per virtual machine, with their public ips.

use super::{flag, items, public_ip, reference, subnet_id, text};
use cairn_core::predicates::{self, is_ip_address, is_string_in};
use cairn_core::{
    merge, node_resource_id, Accumulator, BuildingBlock, JsonMap, Outcome, ResourceDescriptor,
    RuleSet, Scope, TransformError,
};
use serde_json::{json, Value};
use std::net::Ipv4Addr;

pub(crate) const COLLECTION: &str = "nics";
pub(crate) const RESOURCE_TYPE: &str = "Microsoft.Network/networkInterfaces";
const ALLOCATION_METHODS: [&str; 2] = ["Static", "Dynamic"];

pub(crate) fn defaults() -> Value {
    json!({
        "isPrimary": true,
        "isPublic": true,
        "privateIPAllocationMethod": "Dynamic",
        "publicIPAllocationMethod": "Dynamic",
        "startingIPAddress": "",
        "enableIPForwarding": false,
        "domainNameLabelPrefix": "",
        "dnsServers": [],
        "backendPoolsNames": [],
        "inboundNatRulesNames": []
    })
}

pub(crate) static RULES: &RuleSet = &[
    ("enableIPForwarding", predicates::boolean),
    ("subnetName", predicates::not_blank),
    ("privateIPAllocationMethod", private_allocation),
    ("publicIPAllocationMethod", public_ip::allocation_method),
    ("isPrimary", predicates::boolean),
    ("isPublic", predicates::boolean),
    ("dnsServers", dns_servers),
    ("publicIpAddress", public_ip_address),
];

fn private_allocation(scope: &Scope<'_>) -> Outcome {
    if !is_string_in(scope.value, &ALLOCATION_METHODS) {
        return predicates::one_of(scope, &ALLOCATION_METHODS);
    }
    if scope.as_str() != Some("Static") {
        return Outcome::Valid;
    }
    let start = scope.sibling("startingIPAddress");
    if !is_ip_address(start) {
        return Outcome::invalid(
            "If privateIPAllocationMethod is Static, startingIPAddress must be a valid IP address",
        );
    }
    // the last vm of the group takes start + vmCount - 1
    let vm_count = scope
        .lineage
        .ancestor(1)
        .and_then(|vm| vm.get("vmCount"))
        .and_then(Value::as_u64)
        .unwrap_or(1);
    let last = usize::try_from(vm_count.saturating_sub(1)).unwrap_or(usize::MAX);
    Outcome::check(
        start
            .and_then(Value::as_str)
            .and_then(|start| offset_ip(start, last))
            .is_some(),
        "startingIPAddress leaves no room for every vm of the group",
    )
}

fn dns_servers(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        return Outcome::invalid("Value cannot be null or undefined");
    }
    Outcome::EachItem(predicates::ip_address)
}

fn public_ip_address(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        Outcome::Valid
    } else {
        Outcome::Descend(public_ip::RULES)
    }
}

/// `start + offset` on the u32 form of the address; none past 255.255.255.255.
pub(crate) fn offset_ip(start: &str, offset: usize) -> Option<String> {
    let base: Ipv4Addr = start.parse().ok()?;
    let shifted = u32::from(base).checked_add(u32::try_from(offset).ok()?)?;
    Some(Ipv4Addr::from(shifted).to_string())
}

/// settings for the public ip of a public nic, derived from the nic itself.
fn public_ip_settings(nic: &Value, vm_index: usize) -> Value {
    let mut settings = json!({
        "publicIPAllocationMethod": nic.get("publicIPAllocationMethod"),
    });
    if let Some(version) = nic.get("publicIPAddressVersion") {
        settings["publicIPAddressVersion"] = version.clone();
    }
    let prefix = text(nic, "domainNameLabelPrefix");
    if !prefix.trim().is_empty() {
        settings["domainNameLabel"] = json!(prefix);
    }
    let explicit = nic.get("publicIpAddress").cloned().unwrap_or(Value::Null);
    let mut merged = merge(&explicit, &[settings], None);
    let label = text(&merged, "domainNameLabel");
    if !label.trim().is_empty() {
        merged["domainNameLabel"] = json!(format!("{label}{vm_index}"));
    }
    merged
}

/// build the nics (and public ips) of the `vm_index`-th stamped vm.
pub(crate) fn build(
    vm: &Value,
    vm_index: usize,
    context: &BuildingBlock,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    let vm_name = text(vm, "name");
    let network = vm
        .get("virtualNetwork")
        .ok_or_else(|| TransformError::missing(vm_name, "virtualNetwork"))?;
    let load_balancer = vm.get("loadBalancerSettings").filter(|lb| lb.is_object());

    for (position, nic) in items(vm, "nics").iter().enumerate() {
        let name = format!("{vm_name}-nic{}", position + 1);
        let mut ip_config = json!({
            "privateIPAllocationMethod": nic.get("privateIPAllocationMethod"),
            "subnet": reference(subnet_id(network, text(nic, "subnetName"))?),
        });

        if let Some(lb) = load_balancer {
            let lb_name = text(lb, "name");
            let pools = items(nic, "backendPoolsNames")
                .iter()
                .map(|pool| {
                    node_resource_id(
                        lb,
                        "Microsoft.Network/loadBalancers/backendAddressPools",
                        &[lb_name, pool.as_str().unwrap_or_default()],
                    )
                    .map(reference)
                })
                .collect::<Result<Vec<_>, _>>()?;
            if !pools.is_empty() {
                ip_config["loadBalancerBackendAddressPools"] = Value::Array(pools);
            }
            let nat_rules = items(nic, "inboundNatRulesNames")
                .iter()
                .map(|rule| {
                    let stamped = format!("{}-{vm_index}", rule.as_str().unwrap_or_default());
                    node_resource_id(
                        lb,
                        "Microsoft.Network/loadBalancers/inboundNatRules",
                        &[lb_name, stamped.as_str()],
                    )
                    .map(reference)
                })
                .collect::<Result<Vec<_>, _>>()?;
            if !nat_rules.is_empty() {
                ip_config["loadBalancerInboundNatRules"] = Value::Array(nat_rules);
            }
        }

        if flag(nic, "isPublic") {
            let settings = public_ip_settings(nic, vm_index);
            let pip_name = match text(&settings, "name") {
                explicit if !explicit.trim().is_empty() => explicit.to_string(),
                _ => format!("{name}-pip"),
            };
            let pip = public_ip::build(&pip_name, &settings, nic, context)?;
            ip_config["publicIPAddress"] = reference(public_ip::id(nic, &pip_name)?);
            accumulator.push(public_ip::COLLECTION, pip);
        }

        if text(nic, "privateIPAllocationMethod").eq_ignore_ascii_case("static") {
            let start = text(nic, "startingIPAddress");
            let address = offset_ip(start, vm_index)
                .ok_or_else(|| TransformError::missing(&name, "startingIPAddress"))?;
            ip_config["privateIPAddress"] = json!(address);
        }

        let dns = nic.get("dnsServers").cloned().unwrap_or_else(|| json!([]));
        let mut properties = JsonMap::new();
        properties.insert(
            "ipConfigurations".to_string(),
            json!([{ "name": "ipconfig1", "properties": ip_config }]),
        );
        properties.insert("enableIPForwarding".to_string(), json!(flag(nic, "enableIPForwarding")));
        properties.insert(
            "dnsSettings".to_string(),
            json!({ "dnsServers": dns, "appliedDnsServers": dns }),
        );
        properties.insert("primary".to_string(), json!(flag(nic, "isPrimary")));

        let descriptor = ResourceDescriptor::for_node(nic, context, properties).named(name);
        accumulator.push(COLLECTION, descriptor.into_value()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::validate;

    const SUB: &str = "00000000-0000-1000-8000-000000000000";

    fn context() -> BuildingBlock {
        BuildingBlock::new(SUB, "rg", "westus")
    }

    fn addressed(mut node: Value) -> Value {
        node["subscriptionId"] = json!(SUB);
        node["resourceGroupName"] = json!("rg");
        node["location"] = json!("westus");
        node
    }

    fn nic(overrides: Value) -> Value {
        addressed(merge(&overrides, &[defaults()], None))
    }

    fn nics_rule(_: &Scope<'_>) -> Outcome {
        Outcome::Descend(RULES)
    }

    static NIC_OWNER_RULES: &RuleSet = &[("nics", nics_rule)];

    fn vm(nics: Vec<Value>) -> Value {
        addressed(json!({
            "name": "web-vm2",
            "virtualNetwork": addressed(json!({ "name": "vnet" })),
            "loadBalancerSettings": addressed(json!({ "name": "lb" })),
            "nics": nics
        }))
    }

    #[test]
    fn offsets_carry_and_stop_at_the_top() {
        assert_eq!(offset_ip("10.0.0.4", 2).as_deref(), Some("10.0.0.6"));
        assert_eq!(offset_ip("10.0.0.255", 1).as_deref(), Some("10.0.1.0"));
        assert_eq!(offset_ip("255.255.255.254", 1).as_deref(), Some("255.255.255.255"));
        assert_eq!(offset_ip("255.255.255.255", 1), None);
        assert_eq!(offset_ip("nope", 1), None);
    }

    #[test]
    fn static_range_must_fit_the_group() {
        let static_nic = |start: &str| {
            nic(json!({
                "subnetName": "web",
                "privateIPAllocationMethod": "Static",
                "startingIPAddress": start
            }))
        };
        let group = |start: &str| json!({ "vmCount": 3, "nics": [static_nic(start)] });
        let errors = |vm: &Value| -> Vec<String> {
            validate(vm, NIC_OWNER_RULES).into_iter().map(|e| e.name).collect()
        };
        assert!(errors(&group("255.255.255.253")).is_empty());
        assert_eq!(
            errors(&group("255.255.255.254")),
            vec![".nics[0].privateIPAllocationMethod"]
        );
    }

    #[test]
    fn static_private_ip_is_offset_by_vm_index() {
        let nics = vec![nic(json!({
            "subnetName": "web",
            "isPublic": false,
            "privateIPAllocationMethod": "Static",
            "startingIPAddress": "10.0.1.10"
        }))];
        let mut accumulator = Accumulator::new();
        build(&vm(nics), 1, &context(), &mut accumulator).unwrap();
        let built = &accumulator.get(COLLECTION)[0];
        assert_eq!(built["name"], "web-vm2-nic1");
        let ip_config = &built["properties"]["ipConfigurations"][0]["properties"];
        assert_eq!(ip_config["privateIPAddress"], "10.0.1.11");
        assert!(ip_config["subnet"]["id"]
            .as_str()
            .unwrap()
            .ends_with("/virtualNetworks/vnet/subnets/web"));
        assert!(accumulator.get(public_ip::COLLECTION).is_empty());
    }

    #[test]
    fn public_nic_gets_a_pip_with_indexed_label() {
        let nics = vec![nic(json!({ "subnetName": "web", "domainNameLabelPrefix": "web" }))];
        let mut accumulator = Accumulator::new();
        build(&vm(nics), 1, &context(), &mut accumulator).unwrap();
        let pip = &accumulator.get(public_ip::COLLECTION)[0];
        assert_eq!(pip["name"], "web-vm2-nic1-pip");
        assert_eq!(pip["properties"]["dnsSettings"]["domainNameLabel"], "web1");
        let built = &accumulator.get(COLLECTION)[0];
        let ip_config = &built["properties"]["ipConfigurations"][0]["properties"];
        assert!(ip_config["publicIPAddress"]["id"]
            .as_str()
            .unwrap()
            .ends_with("/publicIPAddresses/web-vm2-nic1-pip"));
    }

    #[test]
    fn load_balancer_references_use_stamped_nat_rules() {
        let nics = vec![nic(json!({
            "subnetName": "web",
            "isPublic": false,
            "backendPoolsNames": ["bp1"],
            "inboundNatRulesNames": ["rdp"]
        }))];
        let mut accumulator = Accumulator::new();
        build(&vm(nics), 1, &context(), &mut accumulator).unwrap();
        let built = &accumulator.get(COLLECTION)[0];
        let ip_config = &built["properties"]["ipConfigurations"][0]["properties"];
        assert!(ip_config["loadBalancerBackendAddressPools"][0]["id"]
            .as_str()
            .unwrap()
            .ends_with("/loadBalancers/lb/backendAddressPools/bp1"));
        assert!(ip_config["loadBalancerInboundNatRules"][0]["id"]
            .as_str()
            .unwrap()
            .ends_with("/loadBalancers/lb/inboundNatRules/rdp-1"));
    }

    #[test]
    fn rules_cover_allocation_and_dns() {
        let settings = nic(json!({
            "subnetName": " ",
            "privateIPAllocationMethod": "Static",
            "publicIPAllocationMethod": "Sometimes",
            "dnsServers": ["10.0.0.4", "dns"],
            "isPrimary": "yes"
        }));
        let errors = validate(&settings, RULES);
        let names: Vec<_> = errors.iter().map(|error| error.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                ".subnetName",
                ".privateIPAllocationMethod",
                ".publicIPAllocationMethod",
                ".isPrimary",
                ".dnsServers[1]",
            ]
        );
        assert_eq!(
            errors[1].message,
            "If privateIPAllocationMethod is Static, startingIPAddress must be a valid IP address"
        );
    }
}
