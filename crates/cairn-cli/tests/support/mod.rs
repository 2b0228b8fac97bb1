use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

pub fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cairn"))
}

/// run the binary and capture its output.
pub fn cairn(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .env_remove("CAIRN_LOG")
        .output()
        .unwrap_or_else(|err| panic!("failed to start cairn: {err}"))
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

/// a parameters document holding one kind's settings.
pub fn parameters(kind_key: &str, settings: Value) -> Value {
    serde_json::json!({
        "$schema": "https://schema.management.azure.com/schemas/2015-01-01/deploymentParameters.json#",
        "contentVersion": "1.0.0.0",
        "parameters": {
            "buildingBlockSettings": {
                "value": {
                    "subscriptionId": "00000000-0000-1000-8000-000000000000",
                    "resourceGroupName": "test-rg",
                    "location": "westus"
                }
            },
            kind_key: { "value": settings }
        }
    })
}
