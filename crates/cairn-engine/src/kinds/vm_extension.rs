//! virtual machine extensions, grouped by the machines they apply to.

use super::items;
use crate::Kind;
use cairn_core::predicates;
use cairn_core::{
    Accumulator, BuildingBlock, ChildTable, HandlerTable, Outcome, Policy, RuleSet, Scope,
    TransformError, TransformPlan, ValidationError,
};
use serde_json::{json, Value};
use tracing::debug;

pub(crate) struct VmExtension;

const COLLECTION: &str = "extensions";
const EMPTY_LIST: &str = "Value (Array) cannot be null, undefined or empty";

impl Policy for VmExtension {
    fn key(&self) -> &'static str {
        Kind::VmExtension.key()
    }

    fn defaults(&self, _instance: &Value) -> Result<Value, ValidationError> {
        Ok(json!({}))
    }

    fn rules(&self) -> &'static RuleSet {
        RULES
    }

    fn plan(&self) -> TransformPlan {
        TransformPlan {
            collection: COLLECTION,
            children: NO_CHILDREN,
            handlers: NO_HANDLERS,
        }
    }

    /// one entry per extension, carrying the machine names of its group.
    fn transform(
        &self,
        instances: &[Value],
        _context: &BuildingBlock,
    ) -> Result<Accumulator, TransformError> {
        let mut accumulator = Accumulator::new();
        for group in instances {
            let vms = group.get("vms").cloned().unwrap_or_else(|| json!([]));
            for extension in items(group, "extensions") {
                let entry = render(extension, &vms)?;
                debug!(name = %entry["name"], "built extension entry");
                accumulator.push(COLLECTION, entry);
            }
        }
        Ok(accumulator)
    }
}

static NO_CHILDREN: &ChildTable = &[];
static NO_HANDLERS: &HandlerTable = &[];

static RULES: &RuleSet = &[("vms", vms), ("extensions", extensions)];

static EXTENSION_RULES: &RuleSet = &[
    ("name", predicates::not_blank),
    ("publisher", predicates::not_blank),
    ("type", predicates::not_blank),
    ("typeHandlerVersion", predicates::not_blank),
    ("autoUpgradeMinorVersion", predicates::boolean),
    ("settings", predicates::json_object),
    ("protectedSettings", predicates::json_object),
];

fn non_empty(scope: &Scope<'_>) -> bool {
    scope
        .value
        .and_then(Value::as_array)
        .is_some_and(|list| !list.is_empty())
}

fn vms(scope: &Scope<'_>) -> Outcome {
    Outcome::check(non_empty(scope), EMPTY_LIST)
}

fn extensions(scope: &Scope<'_>) -> Outcome {
    if non_empty(scope) {
        Outcome::Descend(EXTENSION_RULES)
    } else {
        Outcome::invalid(EMPTY_LIST)
    }
}

/// key vault references pass through, anything else is serialized into `value`.
fn protected_settings(protected: Option<&Value>) -> Result<Value, TransformError> {
    let protected = protected.cloned().unwrap_or_else(|| json!({}));
    let key_vault = protected
        .get("reference")
        .and_then(|reference| reference.get("keyVault"))
        .is_some();
    if key_vault {
        return Ok(protected);
    }
    Ok(json!({ "value": serde_json::to_string(&protected)? }))
}

fn render(extension: &Value, vms: &Value) -> Result<Value, TransformError> {
    let mut settings = extension.clone();
    if let Value::Object(map) = &mut settings {
        map.remove("name");
        map.remove("protectedSettings");
    }
    Ok(json!({
        "name": extension.get("name"),
        "vms": vms,
        "extensionSettings": settings,
        "extensionProtectedSettings": protected_settings(extension.get("protectedSettings"))?,
    }))
}
