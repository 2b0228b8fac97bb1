//! reusable leaf predicates and ready-made rules.

use crate::validation::{Outcome, Scope};
use ipnet::Ipv4Net;
use regex::Regex;
use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::LazyLock;
use uuid::Uuid;

pub const BLANK_MESSAGE: &str = "Value cannot be null, undefined, empty, or only whitespace";

/// true when the value is a string contained in `allowed` (case-sensitive).
pub fn is_string_in(value: Option<&Value>, allowed: &[&str]) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|raw| allowed.contains(&raw))
}

/// true when the value is an integer in `[min, max)`.
pub fn in_range(value: Option<&Value>, min: i64, max: i64) -> bool {
    value
        .and_then(Value::as_i64)
        .is_some_and(|n| n >= min && n < max)
}

/// true when the value is absent, null, or a whitespace-only string.
pub fn is_nil_or_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(raw)) => raw.trim().is_empty(),
        Some(_) => false,
    }
}

/// true when the value is a string with at least one non-whitespace character.
pub fn is_not_blank(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|raw| !raw.trim().is_empty())
}

pub fn is_bool(value: Option<&Value>) -> bool {
    value.is_some_and(Value::is_boolean)
}

pub fn is_guid(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|raw| Uuid::parse_str(raw).is_ok())
}

/// dotted-quad ipv4 address.
pub fn is_ip_address(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|raw| raw.parse::<Ipv4Addr>().is_ok())
}

/// ipv4 cidr block, e.g. `10.0.0.0/16`.
pub fn is_cidr(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|raw| raw.contains('/') && raw.parse::<Ipv4Net>().is_ok())
}

pub fn is_json_object(value: Option<&Value>) -> bool {
    value.is_some_and(Value::is_object)
}

/// `*`, a single port, or an inclusive `low-high` range, all within 1..=65535.
pub fn is_port_range(value: Option<&Value>) -> bool {
    let Some(raw) = value.and_then(Value::as_str) else {
        return false;
    };
    if raw == "*" {
        return true;
    }
    let port = |part: &str| part.parse::<u16>().ok().filter(|p| *p > 0);
    match raw.split_once('-') {
        Some((low, high)) => matches!((port(low), port(high)), (Some(l), Some(h)) if l <= h),
        None => port(raw).is_some(),
    }
}

static STATUS_CODE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[1-5][0-9]{2}(-[1-5][0-9]{2})?$").expect("failed to compile status code regex")
});

static DOMAIN_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]{1,61}[a-z0-9]$").expect("failed to compile domain label regex")
});

/// http status code (`200`) or range (`200-399`).
pub fn is_status_code_range(value: Option<&Value>) -> bool {
    let Some(raw) = value.and_then(Value::as_str) else {
        return false;
    };
    if !STATUS_CODE_REGEX.is_match(raw) {
        return false;
    }
    match raw.split_once('-') {
        Some((low, high)) => low <= high,
        None => true,
    }
}

/// dns label for a public ip: lowercase, 3 to 63 characters.
pub fn is_domain_label(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|raw| DOMAIN_LABEL_REGEX.is_match(raw))
}

/// comma-separated list used in messages.
pub fn allowed_list(allowed: &[&str]) -> String {
    allowed.join(", ")
}

/// enum rule body shared by the policy tables.
pub fn one_of(scope: &Scope<'_>, allowed: &[&str]) -> Outcome {
    Outcome::check(
        is_string_in(scope.value, allowed),
        format!("Valid values are {}", allowed_list(allowed)),
    )
}

/// integer range rule body, `[min, max)`.
pub fn between(scope: &Scope<'_>, min: i64, max: i64) -> Outcome {
    Outcome::check(
        in_range(scope.value, min, max),
        format!("Valid values are from {min} to {}", max - 1),
    )
}

pub fn not_blank(scope: &Scope<'_>) -> Outcome {
    Outcome::check(is_not_blank(scope.value), BLANK_MESSAGE)
}

pub fn boolean(scope: &Scope<'_>) -> Outcome {
    Outcome::check(is_bool(scope.value), "Value must be a boolean")
}

pub fn guid(scope: &Scope<'_>) -> Outcome {
    Outcome::check(is_guid(scope.value), "Value must be a valid GUID")
}

pub fn ip_address(scope: &Scope<'_>) -> Outcome {
    Outcome::check(is_ip_address(scope.value), "Value must be a valid IP address")
}

pub fn cidr(scope: &Scope<'_>) -> Outcome {
    Outcome::check(is_cidr(scope.value), "Value must be a valid CIDR")
}

pub fn json_object(scope: &Scope<'_>) -> Outcome {
    Outcome::check(is_json_object(scope.value), "Value must be a JSON object")
}

pub fn port_range(scope: &Scope<'_>) -> Outcome {
    Outcome::check(
        is_port_range(scope.value),
        "Value must be *, a port, or a port range (low-high) between 1 and 65535",
    )
}

/// tags: at most 15 entries, keys 1..=512 chars, string values up to 256 chars.
pub fn tags(scope: &Scope<'_>) -> Outcome {
    let Some(map) = scope.value.and_then(Value::as_object) else {
        return Outcome::invalid("Value must be an object");
    };
    if map.len() > 15 {
        return Outcome::invalid("Only 15 tags are allowed");
    }
    let keys_ok = map
        .keys()
        .all(|key| !key.trim().is_empty() && key.chars().count() <= 512);
    if !keys_ok {
        return Outcome::invalid("Tag names cannot be blank or longer than 512 characters");
    }
    let values_ok = map
        .values()
        .all(|value| value.as_str().is_some_and(|raw| raw.chars().count() <= 256));
    Outcome::check(values_ok, "Tag values must be strings of at most 256 characters")
}
