//! storage and diagnostic storage accounts backing virtual machine disks.

use super::{flag, items, text};
use cairn_core::predicates;
use cairn_core::{
    Accumulator, BuildingBlock, JsonMap, Outcome, ResourceDescriptor, RuleSet, Scope,
    TransformError,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub(crate) const STORAGE: &str = "storageAccounts";
pub(crate) const DIAGNOSTIC: &str = "diagnosticStorageAccounts";

/// fixed namespace for deterministic account names.
const ACCOUNT_NAMESPACE: Uuid = Uuid::from_u128(0x6ba7_b815_9dad_11d1_80b4_00c0_4fd4_30c8);

const SKU_TYPES: [&str; 5] = [
    "Standard_LRS",
    "Standard_ZRS",
    "Standard_GRS",
    "Standard_RAGRS",
    "Premium_LRS",
];
const DIAGNOSTIC_SKU_TYPES: [&str; 4] =
    ["Standard_LRS", "Standard_ZRS", "Standard_GRS", "Standard_RAGRS"];

pub(crate) fn storage_defaults() -> Value {
    json!({ "count": 1, "managed": true, "skuType": "Premium_LRS", "accounts": [] })
}

pub(crate) fn diagnostic_defaults() -> Value {
    json!({ "count": 1, "managed": false, "skuType": "Standard_LRS", "accounts": [] })
}

pub(crate) static STORAGE_RULES: &RuleSet = &[
    ("count", storage_count),
    ("managed", predicates::boolean),
    ("skuType", sku_type),
    ("accounts", accounts),
];

/// accounts one vm group may create.
pub(crate) const MAX_ACCOUNTS: i64 = 100;

pub(crate) static DIAGNOSTIC_RULES: &RuleSet = &[
    ("count", diagnostic_count),
    ("managed", diagnostic_managed),
    ("skuType", diagnostic_sku_type),
    ("accounts", accounts),
];

/// at least one account unless disks are managed.
fn storage_count(scope: &Scope<'_>) -> Outcome {
    let minimum = if scope.sibling("managed").and_then(Value::as_bool) == Some(true) {
        0
    } else {
        1
    };
    account_count(scope, minimum)
}

fn diagnostic_count(scope: &Scope<'_>) -> Outcome {
    account_count(scope, 1)
}

fn account_count(scope: &Scope<'_>, minimum: i64) -> Outcome {
    Outcome::check(
        scope
            .value
            .and_then(Value::as_i64)
            .is_some_and(|n| (minimum..=MAX_ACCOUNTS).contains(&n)),
        format!("Value must be between {minimum} and {MAX_ACCOUNTS}"),
    )
}

fn diagnostic_managed(scope: &Scope<'_>) -> Outcome {
    Outcome::check(
        scope.value == Some(&Value::Bool(false)),
        "Diagnostic storage cannot be managed",
    )
}

fn sku_type(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &SKU_TYPES)
}

fn diagnostic_sku_type(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &DIAGNOSTIC_SKU_TYPES)
}

fn accounts(scope: &Scope<'_>) -> Outcome {
    if !scope.value.is_some_and(Value::is_array) {
        return Outcome::invalid("Value must be an array");
    }
    Outcome::EachItem(predicates::not_blank)
}

/// deterministic account name: `vm` + 8 hex digits of a v5 uuid + index.
pub(crate) fn account_name(
    context: &BuildingBlock,
    prefix: &str,
    kind: &str,
    index: usize,
) -> String {
    let seed = format!(
        "{}/{}/{prefix}/{kind}/{index}",
        context.subscription_id, context.resource_group_name
    );
    let digest = Uuid::new_v5(&ACCOUNT_NAMESPACE, seed.as_bytes()).simple().to_string();
    format!("vm{}{index}", &digest[..8])
}

/// names of the accounts a storage block still lacks.
fn missing_names(
    block: &Value,
    collection: &str,
    name_prefix: &str,
    context: &BuildingBlock,
) -> Vec<String> {
    if collection == STORAGE && flag(block, "managed") {
        return Vec::new();
    }
    let wanted = block.get("count").and_then(Value::as_u64).unwrap_or(0) as usize;
    let existing = items(block, "accounts").len();
    (0..wanted.saturating_sub(existing))
        .map(|index| account_name(context, name_prefix, collection, index))
        .collect()
}

/// create the accounts a storage block still lacks and record them under `collection`.
pub(crate) fn build(
    block: &Value,
    collection: &str,
    name_prefix: &str,
    context: &BuildingBlock,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    for name in missing_names(block, collection, name_prefix, context) {
        if accumulator.contains(collection, &name) {
            continue;
        }
        let mut properties = JsonMap::new();
        properties.insert(
            "encryption".to_string(),
            json!({
                "services": { "blob": { "enabled": true } },
                "keySource": "Microsoft.Storage"
            }),
        );
        let mut account = ResourceDescriptor::for_node(block, context, properties)
            .named(name)
            .into_value()?;
        account["kind"] = json!("Storage");
        account["sku"] = json!({ "name": text(block, "skuType") });
        accumulator.push(collection, account);
    }
    Ok(())
}

/// account names usable for one vm group's vhds: its existing accounts first,
/// then the ones created for its `name_prefix`.
pub(crate) fn account_names(
    block: &Value,
    collection: &str,
    name_prefix: &str,
    context: &BuildingBlock,
) -> Vec<String> {
    items(block, "accounts")
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .chain(missing_names(block, collection, name_prefix, context))
        .collect()
}
