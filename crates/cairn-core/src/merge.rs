//! deep merge of user settings over layered defaults.
//!
//! objects merge key by key. a key missing from settings takes the default,
//! an explicit `null` is kept. arrays are never concatenated: an empty
//! default keeps the settings array, an object-headed default acts as a
//! per-element template, anything else is replaced by the settings array.

use crate::JsonMap;
use serde_json::Value;

/// per-key override hook: `(key, settings value, default value)`.
///
/// `Some(v)` forces `v` for the key, `None` falls back to the structural merge.
pub type Customizer<'a> = dyn Fn(&str, Option<&Value>, &Value) -> Option<Value> + 'a;

/// merge `settings` over `defaults` (earliest first, later ones win).
///
/// an array root merges every element against the same defaults; a null
/// root is treated as an empty object.
pub fn merge(settings: &Value, defaults: &[Value], customizer: Option<&Customizer<'_>>) -> Value {
    let effective = fold_defaults(defaults);
    match settings {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| merge_value(item, &effective, customizer))
                .collect(),
        ),
        Value::Null => merge_value(&Value::Object(JsonMap::new()), &effective, customizer),
        other => merge_value(other, &effective, customizer),
    }
}

fn fold_defaults(defaults: &[Value]) -> Value {
    let mut layers = defaults.iter().filter(|layer| !layer.is_null());
    let Some(first) = layers.next() else {
        return Value::Object(JsonMap::new());
    };
    layers.fold(first.clone(), |acc, layer| merge_value(layer, &acc, None))
}

/// merge two objects, settings over defaults.
pub fn merge_object(
    settings: &JsonMap,
    defaults: &JsonMap,
    customizer: Option<&Customizer<'_>>,
) -> JsonMap {
    let mut merged = JsonMap::new();
    for (key, default) in defaults {
        let value = settings.get(key);
        if let Some(forced) = customizer.and_then(|hook| hook(key, value, default)) {
            merged.insert(key.clone(), forced);
            continue;
        }
        let resolved = match value {
            None => default.clone(),
            Some(value) => merge_value(value, default, customizer),
        };
        merged.insert(key.clone(), resolved);
    }
    for (key, value) in settings {
        if defaults.contains_key(key) {
            continue;
        }
        if let Some(forced) = customizer.and_then(|hook| hook(key, Some(value), &Value::Null)) {
            merged.insert(key.clone(), forced);
            continue;
        }
        let resolved = match (value, customizer) {
            (Value::Object(map), Some(_)) => {
                Value::Object(merge_object(map, &JsonMap::new(), customizer))
            }
            _ => value.clone(),
        };
        merged.insert(key.clone(), resolved);
    }
    merged
}

/// merge every object element of `items` over `template`; other elements are copied.
pub fn merge_with_template(
    items: &[Value],
    template: &JsonMap,
    customizer: Option<&Customizer<'_>>,
) -> Vec<Value> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => Value::Object(merge_object(map, template, customizer)),
            other => other.clone(),
        })
        .collect()
}

fn merge_value(settings: &Value, default: &Value, customizer: Option<&Customizer<'_>>) -> Value {
    match (settings, default) {
        (Value::Object(ours), Value::Object(theirs)) => {
            Value::Object(merge_object(ours, theirs, customizer))
        }
        (Value::Array(ours), Value::Array(theirs)) => match theirs.first() {
            None => settings.clone(),
            Some(Value::Object(template)) => {
                Value::Array(merge_with_template(ours, template, customizer))
            }
            Some(_) => settings.clone(),
        },
        _ => settings.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lb_defaults() -> Value {
        json!({
            "name": "default-lb",
            "frontendIPConfigurations": [{ "name": "default-feConfig", "loadBalancerType": "Public" }],
            "loadBalancingRules": [{ "loadDistribution": "Default", "enableFloatingIP": false }],
            "backendPools": [],
            "probes": [{ "intervalInSeconds": 15, "numberOfProbes": 2 }]
        })
    }

    #[test]
    fn missing_keys_take_defaults_and_settings_win() {
        let settings = json!({ "name": "my-lb", "extra": 1 });
        let merged = merge(&settings, &[lb_defaults()], None);
        assert_eq!(merged["name"], "my-lb");
        assert_eq!(merged["extra"], 1);
        assert_eq!(merged["probes"][0]["intervalInSeconds"], 15);
    }

    #[test]
    fn explicit_null_is_kept() {
        let merged = merge(&json!({ "name": null }), &[lb_defaults()], None);
        assert_eq!(merged["name"], Value::Null);
    }

    #[test]
    fn object_template_applies_to_every_element() {
        let settings = json!({
            "loadBalancingRules": [
                { "name": "r1" },
                { "name": "r2", "loadDistribution": "SourceIP" }
            ]
        });
        let merged = merge(&settings, &[lb_defaults()], None);
        let rules = merged["loadBalancingRules"].as_array().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0]["loadDistribution"], "Default");
        assert_eq!(rules[0]["enableFloatingIP"], false);
        assert_eq!(rules[1]["loadDistribution"], "SourceIP");
    }

    #[test]
    fn empty_default_array_keeps_settings() {
        let settings = json!({ "backendPools": [{ "name": "bp1" }, { "name": "bp2" }] });
        let merged = merge(&settings, &[lb_defaults()], None);
        assert_eq!(merged["backendPools"], settings["backendPools"]);
    }

    #[test]
    fn scalar_arrays_are_replaced_never_concatenated() {
        let defaults = json!({ "dnsServers": ["1.1.1.1", "8.8.8.8"] });
        let merged = merge(&json!({ "dnsServers": ["10.0.0.4"] }), &[defaults], None);
        assert_eq!(merged["dnsServers"], json!(["10.0.0.4"]));
    }

    #[test]
    fn later_defaults_win_over_earlier() {
        let overrides = json!({ "name": "override-lb", "probes": [{ "numberOfProbes": 5 }] });
        let merged = merge(&json!({}), &[lb_defaults(), overrides], None);
        assert_eq!(merged["name"], "override-lb");
        assert_eq!(merged["probes"][0]["numberOfProbes"], 5);
        assert_eq!(merged["probes"][0]["intervalInSeconds"], 15);
    }

    #[test]
    fn merge_is_idempotent() {
        let settings = json!({
            "name": "lb",
            "loadBalancingRules": [{ "name": "r1" }],
            "backendPools": [{ "name": "bp1" }]
        });
        let defaults = [lb_defaults()];
        let once = merge(&settings, &defaults, None);
        let twice = merge(&once, &defaults, None);
        assert_eq!(once, twice);
    }

    #[test]
    fn inputs_are_untouched() {
        let settings = json!({ "loadBalancingRules": [{ "name": "r1" }] });
        let defaults = [lb_defaults()];
        let settings_before = settings.clone();
        let defaults_before = defaults.clone();
        let _ = merge(&settings, &defaults, None);
        assert_eq!(settings, settings_before);
        assert_eq!(defaults, defaults_before);
    }

    #[test]
    fn array_root_merges_each_element() {
        let merged = merge(&json!([{ "name": "a" }, {}]), &[lb_defaults()], None);
        assert_eq!(merged[0]["name"], "a");
        assert_eq!(merged[1]["name"], "default-lb");
    }

    #[test]
    fn null_root_is_empty_object() {
        let merged = merge(&Value::Null, &[lb_defaults()], None);
        assert_eq!(merged["name"], "default-lb");
    }

    fn force_probe_count(key: &str, _: Option<&Value>, _: &Value) -> Option<Value> {
        (key == "numberOfProbes").then(|| json!(9))
    }

    #[test]
    fn customizer_is_consulted_at_every_depth() {
        let settings = json!({ "probes": [{ "name": "p1", "numberOfProbes": 3 }] });
        let hook: &Customizer<'_> = &force_probe_count;
        let merged = merge(&settings, &[lb_defaults()], Some(hook));
        assert_eq!(merged["probes"][0]["numberOfProbes"], 9);
        assert_eq!(merged["probes"][0]["intervalInSeconds"], 15);
    }

    #[test]
    fn customizer_none_falls_back_to_structural_merge() {
        let hook: &Customizer<'_> = &force_probe_count;
        let merged = merge(&json!({ "name": "lb" }), &[lb_defaults()], Some(hook));
        assert_eq!(merged["name"], "lb");
    }
}
