//! rule-tree validation over settings trees.
//!
//! a rule set maps field names to rule functions. each rule sees the field's
//! value (absent fields are still visited), the object holding it, and the
//! lineage of enclosing objects, and answers with an [`Outcome`]: pass, fail
//! with a message, or descend into a nested rule set. the walk never stops
//! early; every failing leaf yields one [`ValidationError`].

use crate::JsonMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// one failing leaf, addressed by its path from the settings root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{name}: {message}")]
pub struct ValidationError {
    /// dotted/bracketed path, e.g. `.loadBalancingRules[0].backendPoolName`.
    pub name: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// aggregated validation report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// return true when no errors are present.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// return true when errors are present.
    pub fn is_err(&self) -> bool {
        !self.errors.is_empty()
    }

    /// serialize the errors as a json array of `{name, message}`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.errors).unwrap_or_else(|_| "[]".to_string())
    }
}

impl From<Vec<ValidationError>> for ValidationReport {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "- {error}")?;
        }
        Ok(())
    }
}

/// chain of enclosing objects, innermost first.
#[derive(Debug, Clone, Copy)]
pub struct Lineage<'a> {
    pub node: &'a Value,
    pub up: Option<&'a Lineage<'a>>,
}

impl<'a> Lineage<'a> {
    /// walk `depth` levels up; zero is the node itself.
    pub fn ancestor(&self, depth: usize) -> Option<&'a Value> {
        let mut current = self;
        for _ in 0..depth {
            current = current.up?;
        }
        Some(current.node)
    }

    /// outermost node of the chain.
    pub fn root(&self) -> &'a Value {
        let mut current = self;
        while let Some(up) = current.up {
            current = up;
        }
        current.node
    }
}

/// what a rule sees.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// the field's value; `None` when the field is absent.
    pub value: Option<&'a Value>,
    /// object holding the field.
    pub parent: &'a Value,
    /// `parent` and its enclosing objects.
    pub lineage: &'a Lineage<'a>,
}

impl<'a> Scope<'a> {
    /// true when the value is absent or null.
    pub fn is_nil(&self) -> bool {
        matches!(self.value, None | Some(Value::Null))
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.value.and_then(Value::as_str)
    }

    /// sibling field on the holding object.
    pub fn sibling(&self, key: &str) -> Option<&'a Value> {
        self.parent.get(key)
    }

    /// string sibling, for cross-field checks.
    pub fn sibling_str(&self, key: &str) -> Option<&'a str> {
        self.sibling(key).and_then(Value::as_str)
    }

    /// object enclosing the holding object (for array elements, the object
    /// owning the array).
    pub fn grandparent(&self) -> Option<&'a Value> {
        self.lineage.ancestor(1)
    }
}

/// answer of a single rule.
#[derive(Debug, Clone)]
pub enum Outcome {
    Valid,
    Invalid(String),
    /// validate an object, or every element of an array, against a nested set.
    Descend(&'static RuleSet),
    /// apply a leaf rule to every element of an array of scalars.
    EachItem(RuleFn),
}

impl Outcome {
    pub fn invalid(message: impl Into<String>) -> Self {
        Outcome::Invalid(message.into())
    }

    /// `Valid` when `ok`, otherwise `Invalid(message)`.
    pub fn check(ok: bool, message: impl Into<String>) -> Self {
        if ok {
            Outcome::Valid
        } else {
            Outcome::Invalid(message.into())
        }
    }
}

pub type RuleFn = fn(&Scope<'_>) -> Outcome;

/// field name -> rule, visited in order.
pub type RuleSet = [(&'static str, RuleFn)];

const NOT_A_CONTAINER: &str = "Value must be an object or an array";

/// validate a settings tree (object or array of objects) and return every violation.
pub fn validate(settings: &Value, rules: &RuleSet) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    match settings {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let path = format!("[{index}]");
                if item.is_object() {
                    walk_object(item, rules, &path, None, &mut errors);
                } else {
                    errors.push(ValidationError::new(path, NOT_A_CONTAINER));
                }
            }
        }
        Value::Object(_) => walk_object(settings, rules, "", None, &mut errors),
        Value::Null => {
            let empty = Value::Object(JsonMap::new());
            walk_object(&empty, rules, "", None, &mut errors);
        }
        _ => errors.push(ValidationError::new("", NOT_A_CONTAINER)),
    }
    errors
}

fn walk_object(
    node: &Value,
    rules: &RuleSet,
    path: &str,
    up: Option<&Lineage<'_>>,
    errors: &mut Vec<ValidationError>,
) {
    let here = Lineage { node, up };
    for (field, rule) in rules {
        let scope = Scope {
            value: node.get(*field),
            parent: node,
            lineage: &here,
        };
        let field_path = format!("{path}.{field}");
        settle(rule(&scope), &scope, &field_path, true, errors);
    }
}

fn settle(
    outcome: Outcome,
    scope: &Scope<'_>,
    path: &str,
    expand_items: bool,
    errors: &mut Vec<ValidationError>,
) {
    match outcome {
        Outcome::Valid => {}
        Outcome::Invalid(message) => errors.push(ValidationError::new(path, message)),
        Outcome::Descend(rules) => descend(scope.value, rules, path, scope.lineage, errors),
        Outcome::EachItem(rule) => match scope.value {
            Some(Value::Array(items)) if expand_items => {
                for (index, item) in items.iter().enumerate() {
                    let item_scope = Scope {
                        value: Some(item),
                        ..*scope
                    };
                    let item_path = format!("{path}[{index}]");
                    settle(rule(&item_scope), &item_scope, &item_path, false, errors);
                }
            }
            _ if expand_items => settle(rule(scope), scope, path, false, errors),
            _ => {}
        },
    }
}

fn descend(
    value: Option<&Value>,
    rules: &'static RuleSet,
    path: &str,
    owner: &Lineage<'_>,
    errors: &mut Vec<ValidationError>,
) {
    match value {
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{index}]");
                if item.is_object() {
                    walk_object(item, rules, &item_path, Some(owner), errors);
                } else {
                    errors.push(ValidationError::new(item_path, NOT_A_CONTAINER));
                }
            }
        }
        Some(object @ Value::Object(_)) => walk_object(object, rules, path, Some(owner), errors),
        None | Some(Value::Null) => {
            let empty = Value::Object(JsonMap::new());
            walk_object(&empty, rules, path, Some(owner), errors);
        }
        Some(_) => errors.push(ValidationError::new(path, NOT_A_CONTAINER)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicates::{self, not_blank};
    use serde_json::json;

    fn positive(scope: &Scope<'_>) -> Outcome {
        Outcome::check(
            scope.value.and_then(Value::as_i64).is_some_and(|n| n > 0),
            "Value must be greater than 0",
        )
    }

    fn pool_reference(scope: &Scope<'_>) -> Outcome {
        let pools = scope
            .grandparent()
            .and_then(|owner| owner.get("pools"))
            .and_then(Value::as_array);
        let wanted = scope.as_str();
        let matched = pools
            .into_iter()
            .flatten()
            .any(|pool| pool.get("name").and_then(Value::as_str) == wanted);
        Outcome::check(matched, format!("Invalid poolName: {}", wanted.unwrap_or("")))
    }

    static ITEM_RULES: &RuleSet = &[("name", not_blank), ("size", positive)];
    static RULE_RULES: &RuleSet = &[("poolName", pool_reference)];
    static ROOT_RULES: &RuleSet = &[
        ("name", not_blank),
        ("items", items),
        ("rules", rules),
        ("servers", servers),
    ];

    fn items(_: &Scope<'_>) -> Outcome {
        Outcome::Descend(ITEM_RULES)
    }

    fn rules(_: &Scope<'_>) -> Outcome {
        Outcome::Descend(RULE_RULES)
    }

    fn servers(_: &Scope<'_>) -> Outcome {
        Outcome::EachItem(predicates::ip_address)
    }

    fn sample() -> Value {
        json!({
            "name": "root",
            "items": [{ "name": "a", "size": 1 }, { "name": "b", "size": 2 }],
            "pools": [{ "name": "p1" }],
            "rules": [{ "poolName": "p1" }],
            "servers": ["10.0.0.1"]
        })
    }

    #[test]
    fn valid_tree_has_no_errors() {
        assert!(validate(&sample(), ROOT_RULES).is_empty());
    }

    #[test]
    fn missing_field_still_invokes_rule() {
        let mut settings = sample();
        settings.as_object_mut().unwrap().remove("name");
        let errors = validate(&settings, ROOT_RULES);
        assert_eq!(
            errors,
            vec![ValidationError::new(
                ".name",
                "Value cannot be null, undefined, empty, or only whitespace"
            )]
        );
    }

    #[test]
    fn reports_every_violation_without_short_circuit() {
        let settings = json!({
            "name": " ",
            "items": [{ "name": "", "size": 0 }, { "name": "ok", "size": -1 }],
            "pools": [],
            "rules": [{ "poolName": "p1" }],
            "servers": ["10.0.0.1", "nope"]
        });
        let errors = validate(&settings, ROOT_RULES);
        let names: Vec<_> = errors.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                ".name",
                ".items[0].name",
                ".items[0].size",
                ".items[1].size",
                ".rules[0].poolName",
                ".servers[1]",
            ]
        );
    }

    #[test]
    fn array_element_path_is_bracketed() {
        let settings = json!({
            "name": "root",
            "items": [{ "name": "a", "size": 1 }, { "name": "b", "size": 1 }, { "name": "c", "size": 0 }],
            "pools": [],
            "rules": [],
            "servers": []
        });
        let errors = validate(&settings, ROOT_RULES);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, ".items[2].size");
    }

    #[test]
    fn cross_reference_matches_sibling_array() {
        let settings = sample();
        assert!(validate(&settings, ROOT_RULES).is_empty());

        let mut unmatched = sample();
        unmatched["rules"][0]["poolName"] = json!("missing");
        let errors = validate(&unmatched, ROOT_RULES);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, ".rules[0].poolName");
        assert_eq!(errors[0].message, "Invalid poolName: missing");
    }

    #[test]
    fn descend_into_missing_section_fires_required_rules() {
        let mut settings = sample();
        settings.as_object_mut().unwrap().remove("items");
        settings["items"] = Value::Null;
        let errors = validate(&settings, ROOT_RULES);
        let names: Vec<_> = errors.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".items.name", ".items.size"]);
    }

    #[test]
    fn descend_into_scalar_is_an_error() {
        let mut settings = sample();
        settings["items"] = json!(5);
        let errors = validate(&settings, ROOT_RULES);
        assert_eq!(errors, vec![ValidationError::new(".items", NOT_A_CONTAINER)]);
    }

    #[test]
    fn array_root_prefixes_index() {
        let settings = json!([sample(), { "name": "" }]);
        static NAME_ONLY: &RuleSet = &[("name", not_blank)];
        let errors = validate(&settings, NAME_ONLY);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, "[1].name");
    }

    #[test]
    fn lineage_walks_to_root() {
        let root = json!({ "a": 1 });
        let child = json!({ "b": 2 });
        let outer = Lineage { node: &root, up: None };
        let inner = Lineage { node: &child, up: Some(&outer) };
        assert_eq!(inner.ancestor(0), Some(&child));
        assert_eq!(inner.ancestor(1), Some(&root));
        assert_eq!(inner.ancestor(2), None);
        assert_eq!(inner.root(), &root);
    }

    #[test]
    fn report_serializes_name_and_message() {
        let report = ValidationReport::from(vec![ValidationError::new(".name", "bad")]);
        assert!(report.is_err());
        assert_eq!(report.to_json(), r#"[{"name":".name","message":"bad"}]"#);
    }
}
