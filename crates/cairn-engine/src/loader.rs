//! parameters and defaults file loading (json or yaml).

use crate::{Kind, PipelineError};
use anyhow::{Context, Result};
use cairn_core::BuildingBlock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const CONTEXT_KEY: &str = "buildingBlockSettings";

/// a parsed parameters document: the context plus settings per kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ParametersDocument {
    pub context: BuildingBlock,
    /// settings keyed by kind, in processing order.
    pub settings: BTreeMap<Kind, Value>,
}

/// caller override defaults, keyed by kind.
pub type OverrideDefaults = BTreeMap<Kind, Value>;

/// load a parameters document from disk.
pub fn load_parameters(path: impl AsRef<Path>) -> Result<ParametersDocument> {
    let path = path.as_ref();
    let raw = read_document(path)?;
    parse_parameters(&raw).with_context(|| format!("load parameters: {}", path.display()))
}

/// load an override defaults file: `{ <kindKey>: {...} }`.
pub fn load_defaults(path: impl AsRef<Path>) -> Result<OverrideDefaults> {
    let path = path.as_ref();
    let raw = read_document(path)?;
    parse_defaults(&raw).with_context(|| format!("load defaults: {}", path.display()))
}

/// read json or yaml by file extension; a leading byte order mark is ignored.
fn read_document(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read file: {}", path.display()))?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::from_str(content).with_context(|| format!("parse json: {}", path.display()))
    } else {
        serde_yaml::from_str(content).with_context(|| format!("parse yaml: {}", path.display()))
    }
}

/// `{ parameters: { buildingBlockSettings: { value }, <kindKey>: { value }... } }`.
pub fn parse_parameters(raw: &Value) -> Result<ParametersDocument, PipelineError> {
    let parameters = raw
        .get("parameters")
        .and_then(Value::as_object)
        .ok_or_else(|| structural("document is missing a parameters object"))?;

    let mut context = None;
    let mut settings = BTreeMap::new();
    for (key, entry) in parameters {
        let value = entry
            .get("value")
            .ok_or_else(|| structural(format!("parameter {key} is missing a value")))?;
        if key == CONTEXT_KEY {
            let parsed: BuildingBlock = serde_json::from_value(value.clone())
                .map_err(|err| structural(format!("invalid {CONTEXT_KEY}: {err}")))?;
            context = Some(parsed);
            continue;
        }
        let kind = Kind::from_key(key)
            .ok_or_else(|| structural(format!("unknown settings key {key}")))?;
        settings.insert(kind, value.clone());
    }

    let context = context.ok_or_else(|| structural(format!("missing {CONTEXT_KEY}")))?;
    if settings.is_empty() {
        return Err(structural("document has no resource settings"));
    }
    Ok(ParametersDocument { context, settings })
}

pub fn parse_defaults(raw: &Value) -> Result<OverrideDefaults, PipelineError> {
    let entries = raw
        .as_object()
        .ok_or_else(|| structural("defaults must be an object keyed by settings key"))?;
    let mut defaults = BTreeMap::new();
    for (key, value) in entries {
        let kind = Kind::from_key(key)
            .ok_or_else(|| structural(format!("unknown settings key {key}")))?;
        if !value.is_object() {
            return Err(structural(format!("defaults for {key} must be an object")));
        }
        defaults.insert(kind, value.clone());
    }
    Ok(defaults)
}

fn structural(message: impl Into<String>) -> PipelineError {
    PipelineError::Structural(message.into())
}
