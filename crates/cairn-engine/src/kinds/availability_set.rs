//! availability sets shared by the vms of one settings instance.

use super::{flag, text};
use cairn_core::predicates;
use cairn_core::{
    node_resource_id, Accumulator, BuildingBlock, JsonMap, Outcome, ResourceDescriptor, RuleSet,
    Scope, TransformError,
};
use serde_json::{json, Value};

pub(crate) const COLLECTION: &str = "availabilitySet";
const RESOURCE_TYPE: &str = "Microsoft.Compute/availabilitySets";

/// defaults; the name is filled from the vm name prefix during merge.
pub(crate) fn defaults(name_prefix: &str) -> Value {
    json!({
        "useExistingAvailabilitySet": false,
        "name": format!("{name_prefix}-as"),
        "platformFaultDomainCount": 3,
        "platformUpdateDomainCount": 5
    })
}

pub(crate) static RULES: &RuleSet = &[
    ("useExistingAvailabilitySet", predicates::boolean),
    ("name", predicates::not_blank),
    ("platformFaultDomainCount", fault_domains),
    ("platformUpdateDomainCount", update_domains),
];

/// existing sets are only referenced, so only their name matters.
pub(crate) fn availability_set(scope: &Scope<'_>) -> Outcome {
    let existing = scope
        .value
        .and_then(|set| set.get("useExistingAvailabilitySet"))
        .and_then(Value::as_bool)
        == Some(true);
    if existing {
        Outcome::Descend(EXISTING_RULES)
    } else {
        Outcome::Descend(RULES)
    }
}

static EXISTING_RULES: &RuleSet = &[("name", predicates::not_blank)];

fn fault_domains(scope: &Scope<'_>) -> Outcome {
    predicates::between(scope, 1, 4)
}

fn update_domains(scope: &Scope<'_>) -> Outcome {
    predicates::between(scope, 1, 21)
}

/// true when the vms get a set of their own.
pub(crate) fn is_created(set: &Value, vm_count: u64) -> bool {
    !flag(set, "useExistingAvailabilitySet") && vm_count >= 2
}

pub(crate) fn id(set: &Value) -> Result<String, TransformError> {
    Ok(node_resource_id(set, RESOURCE_TYPE, &[text(set, "name")])?)
}

/// record the set once; `managed` is present only for managed disks.
pub(crate) fn build(
    set: &Value,
    managed: bool,
    context: &BuildingBlock,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    if accumulator.contains(COLLECTION, text(set, "name")) {
        return Ok(());
    }
    let mut properties = JsonMap::new();
    properties.insert(
        "platformFaultDomainCount".to_string(),
        set.get("platformFaultDomainCount").cloned().unwrap_or(Value::Null),
    );
    properties.insert(
        "platformUpdateDomainCount".to_string(),
        set.get("platformUpdateDomainCount").cloned().unwrap_or(Value::Null),
    );
    if managed {
        properties.insert("managed".to_string(), json!(true));
    }
    let descriptor = ResourceDescriptor::for_node(set, context, properties);
    accumulator.push(COLLECTION, descriptor.into_value()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::validate;

    fn context() -> BuildingBlock {
        BuildingBlock::new("00000000-0000-1000-8000-000000000000", "rg", "westus")
    }

    #[test]
    fn created_only_for_two_or_more_new_vms() {
        let set = defaults("web");
        assert!(!is_created(&set, 1));
        assert!(is_created(&set, 2));
        let mut existing = defaults("web");
        existing["useExistingAvailabilitySet"] = json!(true);
        assert!(!is_created(&existing, 5));
    }

    #[test]
    fn build_is_idempotent_per_name() {
        let set = defaults("web");
        let mut accumulator = Accumulator::new();
        build(&set, true, &context(), &mut accumulator).unwrap();
        build(&set, true, &context(), &mut accumulator).unwrap();
        let sets = accumulator.get(COLLECTION);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0]["name"], "web-as");
        assert_eq!(sets[0]["properties"]["managed"], true);
        assert_eq!(sets[0]["properties"]["platformFaultDomainCount"], 3);
    }

    #[test]
    fn domain_counts_are_bounded() {
        let mut set = defaults("web");
        set["platformFaultDomainCount"] = json!(4);
        set["platformUpdateDomainCount"] = json!(0);
        let names: Vec<_> = validate(&set, RULES).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec![".platformFaultDomainCount", ".platformUpdateDomainCount"]);
    }
}
